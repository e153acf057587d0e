//! Shared types for hid-async
//!
//! This crate defines the public data shapes of the HID layer: device
//! descriptors produced by enumeration, the string fields read from an open
//! device, native string transcoding, and the error taxonomy.
//!
//! # Example
//!
//! ```
//! use types::{DeviceDescriptor, NativeString, RawDeviceRecord};
//!
//! let record = RawDeviceRecord {
//!     path: Some("/dev/hidraw0".to_string()),
//!     vendor_id: 0x046d,
//!     product_id: 0xc52b,
//!     serial_number: None,
//!     release_number: 0x1201,
//!     manufacturer_string: Some(NativeString::wide_from_str("Logitech")),
//!     product_string: None,
//!     usage_page: 0,
//!     usage: 0,
//!     interface_number: 2,
//! };
//!
//! let desc = DeviceDescriptor::from_record(&record);
//! assert_eq!(desc.manufacturer.as_deref(), Some("Logitech"));
//! assert_eq!(desc.usage_page, None);
//! ```

pub mod descriptor;
pub mod error;
pub mod strings;

pub use descriptor::{DeviceDescriptor, DeviceStrings, RawDeviceRecord};
pub use error::{ErrorKind, HidError, OpenTarget, Result};
pub use strings::{NativeString, transcode_wide};
