//! Native HID driver abstraction
//!
//! The device layer never talks to a platform library directly. It goes
//! through [`HidDriver`] for process-wide calls (init, exit, enumerate,
//! open) and [`NativeDevice`] for per-device calls. The default backend
//! wraps the `hidapi` crate; tests plug in the fake driver from
//! [`crate::test_utils`].

#[cfg(feature = "hidapi")]
pub mod hidapi_backend;

use thiserror::Error;
use types::{NativeString, RawDeviceRecord};

/// Timeout value that makes a read block until data arrives
pub const BLOCK_FOREVER: i32 = -1;

/// Error reported by a native driver call
///
/// Carries the driver's own message; the device layer wraps it into the
/// matching [`types::HidError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn into_message(self) -> String {
        self.message
    }
}

/// Process-wide driver entry points
///
/// `init` and `exit` are reference counted by
/// [`crate::subsystem::SubsystemRegistry`]; the driver itself may assume
/// they alternate. `enumerate` and the open calls are only issued while the
/// subsystem's enumerate lock is held.
pub trait HidDriver: Send + Sync + 'static {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    fn init(&self) -> Result<(), DriverError>;

    fn exit(&self);

    /// List attached devices; zero ids match anything
    fn enumerate(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<RawDeviceRecord>, DriverError>;

    fn open_path(&self, path: &str) -> Result<Box<dyn NativeDevice>, DriverError>;

    fn open(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<&str>,
    ) -> Result<Box<dyn NativeDevice>, DriverError>;
}

/// An open native device
///
/// Dropping the value closes the device. Implementations must tolerate calls
/// from different threads, but the device layer never issues two calls on
/// the same handle concurrently except for the poll loop's read racing a
/// queued write.
pub trait NativeDevice: Send + Sync {
    /// Read one input report into `buf`
    ///
    /// Returns the number of bytes read, 0 on timeout. A negative
    /// `timeout_ms` blocks until a report arrives.
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, DriverError>;

    /// Write an output report; `data[0]` is the report id
    fn write(&self, data: &[u8]) -> Result<usize, DriverError>;

    /// Read a feature report into `buf`; `buf[0]` holds the report id on entry
    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, DriverError>;

    /// Send a feature report; `data[0]` is the report id
    fn send_feature_report(&self, data: &[u8]) -> Result<usize, DriverError>;

    fn set_nonblocking(&self, nonblocking: bool) -> Result<(), DriverError>;

    fn manufacturer_string(&self) -> Result<Option<NativeString>, DriverError>;

    fn product_string(&self) -> Result<Option<NativeString>, DriverError>;

    fn serial_number_string(&self) -> Result<Option<NativeString>, DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::new("device disconnected");
        assert_eq!(err.to_string(), "device disconnected");
        assert_eq!(err.message(), "device disconnected");
        assert_eq!(err.into_message(), "device disconnected");
    }

    #[test]
    fn test_driver_error_is_std_error() {
        let err: Box<dyn std::error::Error + Send + Sync> =
            Box::new(DriverError::new("pipe error"));
        assert!(err.source().is_none());
        assert_eq!(err.to_string(), "pipe error");
    }
}
