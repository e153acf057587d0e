//! Synchronous device API
//!
//! [`BlockingDevice`] performs every native call on the caller's thread.
//! Opens and enumerations still take the subsystem's enumerate lock, so
//! blocking and async users can share a subsystem safely.

use crate::config::DeviceSettings;
use crate::driver::{BLOCK_FOREVER, NativeDevice};
use crate::enumerate;
use crate::operation::{
    self, DeviceInfo, GetFeatureReport, Operation, Read, SendFeatureReport, SetNonBlocking, Write,
};
use crate::subsystem::Subsystem;
use std::sync::Arc;
use tracing::{debug, info};
use types::{DeviceDescriptor, DeviceStrings, HidError, OpenTarget, Result};

pub struct BlockingDevice {
    target: OpenTarget,
    native: Option<Box<dyn NativeDevice>>,
    settings: DeviceSettings,
    // Dropped after `native`
    _subsystem: Arc<Subsystem>,
}

impl BlockingDevice {
    /// List attached devices; see [`crate::HidContext::devices`]
    pub fn devices(
        subsystem: &Subsystem,
        filter: Option<(u16, u16)>,
    ) -> Result<Vec<DeviceDescriptor>> {
        enumerate::enumerate(subsystem, filter)
    }

    pub fn open_path(
        subsystem: Arc<Subsystem>,
        path: &str,
        settings: DeviceSettings,
    ) -> Result<Self> {
        Self::open_target(subsystem, OpenTarget::Path(path.to_string()), settings)
    }

    pub fn open(
        subsystem: Arc<Subsystem>,
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<&str>,
        settings: DeviceSettings,
    ) -> Result<Self> {
        let target = OpenTarget::Ids {
            vendor_id,
            product_id,
            serial_number: serial_number.map(str::to_string),
        };
        Self::open_target(subsystem, target, settings)
    }

    fn open_target(
        subsystem: Arc<Subsystem>,
        target: OpenTarget,
        settings: DeviceSettings,
    ) -> Result<Self> {
        let native = enumerate::open_native(&subsystem, &target)?;
        info!("Opened HID device with {} (blocking)", target);
        Ok(Self {
            target,
            native: Some(native),
            settings,
            _subsystem: subsystem,
        })
    }

    pub fn target(&self) -> &OpenTarget {
        &self.target
    }

    pub fn is_closed(&self) -> bool {
        self.native.is_none()
    }

    fn run<O: Operation>(&self, op: O) -> Result<O::Output> {
        let native = self.native.as_deref().ok_or(HidError::DeviceClosed)?;
        operation::run(native, op).map(O::into_output)
    }

    /// Block until an input report arrives
    pub fn read(&self) -> Result<Vec<u8>> {
        self.read_timeout(BLOCK_FOREVER)
    }

    /// Read one input report, empty on timeout
    pub fn read_timeout(&self, timeout_ms: i32) -> Result<Vec<u8>> {
        self.run(Read::new(timeout_ms, self.settings.read_buffer_size))
    }

    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.run(Write::new(data.to_vec()))
    }

    pub fn get_feature_report(&self, report_id: u8, length: usize) -> Result<Vec<u8>> {
        let op = GetFeatureReport::new(report_id, length)?;
        self.run(op)
    }

    pub fn send_feature_report(&self, data: &[u8]) -> Result<usize> {
        let op = SendFeatureReport::new(data.to_vec())?;
        self.run(op)
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.run(SetNonBlocking::new(nonblocking))
    }

    pub fn device_info(&self) -> Result<DeviceStrings> {
        self.run(DeviceInfo::new())
    }

    /// Close the native handle
    pub fn close(&mut self) -> Result<()> {
        match self.native.take() {
            Some(native) => {
                drop(native);
                debug!("Closed HID device with {} (blocking)", self.target);
                Ok(())
            }
            None => Err(HidError::AlreadyClosed),
        }
    }
}
