//! HID device descriptor types
//!
//! [`RawDeviceRecord`] is what the driver's enumeration hands back;
//! [`DeviceDescriptor`] is the immutable public snapshot built from it.

use crate::strings::NativeString;
use serde::{Deserialize, Serialize};

/// One entry of a native enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDeviceRecord {
    /// Platform device path
    pub path: Option<String>,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Serial number string
    pub serial_number: Option<NativeString>,
    /// Device release number (bcdDevice)
    pub release_number: u16,
    /// Manufacturer string
    pub manufacturer_string: Option<NativeString>,
    /// Product string
    pub product_string: Option<NativeString>,
    /// HID usage page, 0 when not applicable
    pub usage_page: u16,
    /// HID usage, 0 when not applicable
    pub usage: u16,
    /// USB interface number, -1 when unknown
    pub interface_number: i32,
}

/// Device information returned by enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    pub release: u16,
    #[serde(rename = "interface")]
    pub interface_number: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_page: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<u16>,
}

impl DeviceDescriptor {
    /// Build the public descriptor from a raw enumeration record
    ///
    /// Usage fields are only present when nonzero; an empty path is treated
    /// as absent.
    pub fn from_record(record: &RawDeviceRecord) -> Self {
        Self {
            vendor_id: record.vendor_id,
            product_id: record.product_id,
            path: record.path.clone().filter(|p| !p.is_empty()),
            serial_number: record.serial_number.as_ref().map(NativeString::to_utf8),
            manufacturer: record
                .manufacturer_string
                .as_ref()
                .map(NativeString::to_utf8),
            product: record.product_string.as_ref().map(NativeString::to_utf8),
            release: record.release_number,
            interface_number: record.interface_number,
            usage_page: nonzero(record.usage_page),
            usage: nonzero(record.usage),
        }
    }

    /// Whether this descriptor passes a vendor/product filter
    ///
    /// A zero id matches anything.
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        (vendor_id == 0 || self.vendor_id == vendor_id)
            && (product_id == 0 || self.product_id == product_id)
    }
}

impl From<&RawDeviceRecord> for DeviceDescriptor {
    fn from(record: &RawDeviceRecord) -> Self {
        Self::from_record(record)
    }
}

fn nonzero(value: u16) -> Option<u16> {
    (value != 0).then_some(value)
}

/// String fields read from an open device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStrings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}
