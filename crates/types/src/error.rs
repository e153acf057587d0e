//! HID error taxonomy
//!
//! Every failure surfaced by the device layer maps onto one of these
//! variants. The variant is the stable error kind; the `Display` output is
//! the human-readable message.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identity a caller asked to open, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenTarget {
    /// Open by platform device path
    Path(String),
    /// Open by vendor/product id and optional serial number
    Ids {
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<String>,
    },
}

impl fmt::Display for OpenTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenTarget::Path(path) => write!(f, "path {}", path),
            OpenTarget::Ids {
                vendor_id,
                product_id,
                serial_number,
            } => {
                write!(
                    f,
                    "vendor id {:#x} and product id {:#x}",
                    vendor_id, product_id
                )?;
                if let Some(serial) = serial_number {
                    write!(f, " and serial number {}", serial)?;
                }
                Ok(())
            }
        }
    }
}

/// Errors returned by HID operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HidError {
    /// The driver subsystem failed to initialize
    #[error("could not initialize HID subsystem: {message}")]
    Init { message: String },

    /// Device not found or could not be opened
    #[error("cannot open device with {target}: {message}")]
    Open { target: OpenTarget, message: String },

    /// No live subsystem is available to this context
    #[error("HID subsystem is not initialized")]
    NotInitialized,

    /// `close` was called on a handle that is already closed
    #[error("device is already closed")]
    AlreadyClosed,

    /// Operation attempted on a closed device
    #[error("device has been closed")]
    DeviceClosed,

    /// Caller supplied an argument the driver cannot accept
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Native read failed
    #[error("could not read data from device: {message}")]
    Read { message: String },

    /// Native write failed
    #[error("cannot write to HID device: {message}")]
    Write { message: String },

    /// Native get/send feature report failed
    #[error("feature report failed: {message}")]
    FeatureReport { message: String },

    /// Native set-nonblocking failed
    #[error("error setting non-blocking mode: {message}")]
    Mode { message: String },

    /// One-shot read rejected because a poll loop owns the reader
    #[error("cannot use read while polling is running")]
    PollActive,

    /// Poll loop already running on this device
    #[error("polling is already running on this device")]
    AlreadyRunning,

    /// Native enumeration failed
    #[error("could not enumerate HID devices: {message}")]
    Enumerate { message: String },

    /// A worker panicked or dropped its completion channel
    #[error("worker terminated before completing the operation: {message}")]
    WorkerLost { message: String },
}

/// Stable, payload-free classification of a [`HidError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Init,
    Open,
    NotInitialized,
    AlreadyClosed,
    DeviceClosed,
    InvalidArgument,
    Read,
    Write,
    FeatureReport,
    Mode,
    PollActive,
    AlreadyRunning,
    Enumerate,
    WorkerLost,
}

impl HidError {
    /// Stable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            HidError::Init { .. } => ErrorKind::Init,
            HidError::Open { .. } => ErrorKind::Open,
            HidError::NotInitialized => ErrorKind::NotInitialized,
            HidError::AlreadyClosed => ErrorKind::AlreadyClosed,
            HidError::DeviceClosed => ErrorKind::DeviceClosed,
            HidError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            HidError::Read { .. } => ErrorKind::Read,
            HidError::Write { .. } => ErrorKind::Write,
            HidError::FeatureReport { .. } => ErrorKind::FeatureReport,
            HidError::Mode { .. } => ErrorKind::Mode,
            HidError::PollActive => ErrorKind::PollActive,
            HidError::AlreadyRunning => ErrorKind::AlreadyRunning,
            HidError::Enumerate { .. } => ErrorKind::Enumerate,
            HidError::WorkerLost { .. } => ErrorKind::WorkerLost,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        HidError::InvalidArgument {
            message: message.into(),
        }
    }
}

/// Type alias for HID results
pub type Result<T> = std::result::Result<T, HidError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_includes_hex_ids() {
        let err = HidError::Open {
            target: OpenTarget::Ids {
                vendor_id: 0x046d,
                product_id: 0xc52b,
                serial_number: None,
            },
            message: "not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("vendor id 0x46d"));
        assert!(msg.contains("product id 0xc52b"));
        assert_eq!(err.kind(), ErrorKind::Open);
    }

    #[test]
    fn test_open_error_includes_path() {
        let err = HidError::Open {
            target: OpenTarget::Path("/dev/hidraw3".to_string()),
            message: "no such device".to_string(),
        };
        assert!(err.to_string().contains("/dev/hidraw3"));
    }

    #[test]
    fn test_serial_in_open_target() {
        let target = OpenTarget::Ids {
            vendor_id: 1,
            product_id: 2,
            serial_number: Some("SN01".to_string()),
        };
        assert_eq!(
            target.to_string(),
            "vendor id 0x1 and product id 0x2 and serial number SN01"
        );
    }

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(HidError::PollActive.kind(), ErrorKind::PollActive);
        assert_eq!(HidError::AlreadyClosed.kind(), ErrorKind::AlreadyClosed);
        assert_eq!(
            HidError::invalid_argument("zero length").kind(),
            ErrorKind::InvalidArgument
        );
    }
}
