//! Descriptor wire-shape tests
//!
//! Verifies the serialized field names and the "absent when zero/none"
//! conventions of enumeration and device-info results.
//!
//! Run with: `cargo test -p types --test descriptor_tests`

use serde_json::{Value, json};
use types::{DeviceDescriptor, DeviceStrings, NativeString, RawDeviceRecord};

fn keyboard_record() -> RawDeviceRecord {
    RawDeviceRecord {
        path: Some("/dev/hidraw1".to_string()),
        vendor_id: 0x046d,
        product_id: 0xc31c,
        serial_number: None,
        release_number: 0x6400,
        manufacturer_string: Some(NativeString::wide_from_str("Logitech")),
        product_string: Some(NativeString::wide_from_str("USB Keyboard")),
        usage_page: 0x0001,
        usage: 0x0006,
        interface_number: 0,
    }
}

#[test]
fn test_descriptor_json_field_names() {
    let desc = DeviceDescriptor::from_record(&keyboard_record());
    let value = serde_json::to_value(&desc).unwrap();

    assert_eq!(
        value,
        json!({
            "vendorId": 0x046d,
            "productId": 0xc31c,
            "path": "/dev/hidraw1",
            "manufacturer": "Logitech",
            "product": "USB Keyboard",
            "release": 0x6400,
            "interface": 0,
            "usagePage": 1,
            "usage": 6,
        })
    );
}

#[test]
fn test_zero_usage_is_omitted() {
    let mut raw = keyboard_record();
    raw.usage_page = 0;
    raw.usage = 0;

    let value = serde_json::to_value(DeviceDescriptor::from_record(&raw)).unwrap();
    let obj = value.as_object().unwrap();
    assert!(!obj.contains_key("usagePage"));
    assert!(!obj.contains_key("usage"));
    assert!(!obj.contains_key("serialNumber"));
}

#[test]
fn test_descriptor_deserializes_without_optionals() {
    let desc: DeviceDescriptor = serde_json::from_value(json!({
        "vendorId": 1,
        "productId": 2,
        "release": 3,
        "interface": -1,
    }))
    .unwrap();

    assert_eq!(desc.interface_number, -1);
    assert_eq!(desc.path, None);
    assert_eq!(desc.usage, None);
}

#[test]
fn test_device_strings_shape() {
    let strings = DeviceStrings {
        manufacturer: Some("Teensyduino".to_string()),
        product: None,
        serial_number: Some("123".to_string()),
    };
    let value: Value = serde_json::to_value(&strings).unwrap();
    assert_eq!(
        value,
        json!({ "manufacturer": "Teensyduino", "serialNumber": "123" })
    );
}
