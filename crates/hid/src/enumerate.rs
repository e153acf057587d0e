//! Device discovery and native open
//!
//! Both run under the subsystem's enumerate lock, which serializes them
//! across every context and the blocking API.

use crate::driver::NativeDevice;
use crate::subsystem::Subsystem;
use tracing::{debug, warn};
use types::{DeviceDescriptor, HidError, OpenTarget, Result};

/// List attached devices, optionally filtered by vendor and product id
///
/// A zero id in the filter matches any device.
pub fn enumerate(
    subsystem: &Subsystem,
    filter: Option<(u16, u16)>,
) -> Result<Vec<DeviceDescriptor>> {
    let (vendor_id, product_id) = filter.unwrap_or((0, 0));

    let records = {
        let _guard = subsystem.lock_enumerate();
        subsystem
            .driver()
            .enumerate(vendor_id, product_id)
            .map_err(|e| {
                warn!("Enumeration failed: {}", e);
                HidError::Enumerate {
                    message: e.into_message(),
                }
            })?
    };

    let devices: Vec<DeviceDescriptor> = records
        .iter()
        .map(DeviceDescriptor::from_record)
        .filter(|desc| desc.matches(vendor_id, product_id))
        .collect();

    debug!(
        "Enumerated {} HID devices (filter {:04x}:{:04x})",
        devices.len(),
        vendor_id,
        product_id
    );
    Ok(devices)
}

/// Open a native handle for `target`
pub(crate) fn open_native(
    subsystem: &Subsystem,
    target: &OpenTarget,
) -> Result<Box<dyn NativeDevice>> {
    let _guard = subsystem.lock_enumerate();
    let driver = subsystem.driver();

    let result = match target {
        OpenTarget::Path(path) => driver.open_path(path),
        OpenTarget::Ids {
            vendor_id,
            product_id,
            serial_number,
        } => driver.open(*vendor_id, *product_id, serial_number.as_deref()),
    };

    result.map_err(|e| {
        warn!("Failed to open device with {}: {}", target, e);
        HidError::Open {
            target: target.clone(),
            message: e.into_message(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystem::SubsystemRegistry;
    use crate::test_utils::{FakeDriver, fake_record};

    #[test]
    fn test_filtered_enumeration() {
        let driver = FakeDriver::new();
        driver.add_device(fake_record("/dev/a", 0x1111, 0x0001));
        driver.add_device(fake_record("/dev/b", 0x1111, 0x0002));
        driver.add_device(fake_record("/dev/c", 0x2222, 0x0001));
        let registry = SubsystemRegistry::new(driver.clone());
        let subsystem = registry.acquire().unwrap();

        assert_eq!(enumerate(&subsystem, None).unwrap().len(), 3);

        let only = enumerate(&subsystem, Some((0x1111, 0x0002))).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].path.as_deref(), Some("/dev/b"));

        let by_vendor = enumerate(&subsystem, Some((0x1111, 0))).unwrap();
        assert_eq!(by_vendor.len(), 2);
    }

    #[test]
    fn test_open_failure_names_target() {
        let driver = FakeDriver::new();
        let registry = SubsystemRegistry::new(driver.clone());
        let subsystem = registry.acquire().unwrap();

        let target = OpenTarget::Ids {
            vendor_id: 0xdead,
            product_id: 0xbeef,
            serial_number: None,
        };
        let err = open_native(&subsystem, &target).err().unwrap();
        assert!(matches!(err, HidError::Open { .. }));
        assert!(err.to_string().contains("vendor id 0xdead and product id 0xbeef"));
    }
}
