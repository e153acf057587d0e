//! Per-device operations
//!
//! Each operation issues exactly one native call in [`Operation::execute`]
//! (device info issues one per string) and converts its captured state into
//! a caller-facing value in [`Operation::into_output`]. Execution happens on
//! a blocking thread; the conversion happens in whichever task awaits the
//! result.

use crate::driver::{DriverError, NativeDevice};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;
use types::{DeviceStrings, HidError, NativeString, Result};

use crate::queue::JobFuture;

pub trait Operation: Send + 'static {
    type Output: Send + 'static;

    /// Name used in logs
    const NAME: &'static str;

    /// Perform the native call, recording its result in `self`
    fn execute(&mut self, device: &dyn NativeDevice) -> Result<()>;

    fn into_output(self) -> Self::Output;
}

/// Run an operation against a device and hand back its completed state
pub fn run<O: Operation>(device: &dyn NativeDevice, mut op: O) -> Result<O> {
    op.execute(device)?;
    Ok(op)
}

/// Future over a queued operation that converts on completion
pub struct OperationFuture<O: Operation> {
    job: JobFuture<O>,
}

impl<O: Operation> OperationFuture<O> {
    pub(crate) fn new(job: JobFuture<O>) -> Self {
        Self { job }
    }

    pub(crate) fn failed(error: HidError) -> Self {
        Self {
            job: JobFuture::failed(error),
        }
    }
}

impl<O: Operation> Future for OperationFuture<O> {
    type Output = Result<O::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().job)
            .poll(cx)
            .map(|result| result.map(O::into_output))
    }
}

/// Write an output report
#[derive(Debug)]
pub struct Write {
    data: Vec<u8>,
    written: usize,
}

impl Write {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, written: 0 }
    }
}

impl Operation for Write {
    type Output = usize;
    const NAME: &'static str = "write";

    fn execute(&mut self, device: &dyn NativeDevice) -> Result<()> {
        self.written = device.write(&self.data).map_err(|e| HidError::Write {
            message: e.into_message(),
        })?;
        Ok(())
    }

    fn into_output(self) -> usize {
        self.written
    }
}

/// Read one input report
///
/// The buffer is allocated on execution and handed to the caller trimmed to
/// the bytes read. A timeout yields an empty report.
#[derive(Debug)]
pub struct Read {
    timeout_ms: i32,
    buffer_size: usize,
    report: Vec<u8>,
}

impl Read {
    pub fn new(timeout_ms: i32, buffer_size: usize) -> Self {
        Self {
            timeout_ms,
            buffer_size,
            report: Vec::new(),
        }
    }
}

impl Operation for Read {
    type Output = Vec<u8>;
    const NAME: &'static str = "read";

    fn execute(&mut self, device: &dyn NativeDevice) -> Result<()> {
        let mut buf = vec![0u8; self.buffer_size];
        let n = device
            .read_timeout(&mut buf, self.timeout_ms)
            .map_err(|e| HidError::Read {
                message: e.into_message(),
            })?;
        buf.truncate(n);
        self.report = buf;
        Ok(())
    }

    fn into_output(self) -> Vec<u8> {
        self.report
    }
}

/// Read a feature report
#[derive(Debug)]
pub struct GetFeatureReport {
    buffer: Vec<u8>,
    len: usize,
}

impl GetFeatureReport {
    /// `length` includes the report id byte and must be nonzero
    pub fn new(report_id: u8, length: usize) -> Result<Self> {
        if length == 0 {
            return Err(HidError::invalid_argument(
                "feature report length must be greater than 0",
            ));
        }
        let mut buffer = vec![0u8; length];
        buffer[0] = report_id;
        Ok(Self { buffer, len: 0 })
    }
}

impl Operation for GetFeatureReport {
    type Output = Vec<u8>;
    const NAME: &'static str = "get_feature_report";

    fn execute(&mut self, device: &dyn NativeDevice) -> Result<()> {
        self.len = device
            .get_feature_report(&mut self.buffer)
            .map_err(feature_err)?;
        Ok(())
    }

    fn into_output(mut self) -> Vec<u8> {
        self.buffer.truncate(self.len);
        self.buffer
    }
}

/// Send a feature report
#[derive(Debug)]
pub struct SendFeatureReport {
    data: Vec<u8>,
    written: usize,
}

impl SendFeatureReport {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if data.is_empty() {
            return Err(HidError::invalid_argument(
                "feature report must include a report id",
            ));
        }
        Ok(Self { data, written: 0 })
    }
}

impl Operation for SendFeatureReport {
    type Output = usize;
    const NAME: &'static str = "send_feature_report";

    fn execute(&mut self, device: &dyn NativeDevice) -> Result<()> {
        self.written = device
            .send_feature_report(&self.data)
            .map_err(feature_err)?;
        Ok(())
    }

    fn into_output(self) -> usize {
        self.written
    }
}

fn feature_err(e: DriverError) -> HidError {
    HidError::FeatureReport {
        message: e.into_message(),
    }
}

/// Switch the native handle between blocking and nonblocking reads
#[derive(Debug)]
pub struct SetNonBlocking {
    nonblocking: bool,
}

impl SetNonBlocking {
    pub fn new(nonblocking: bool) -> Self {
        Self { nonblocking }
    }
}

impl Operation for SetNonBlocking {
    type Output = ();
    const NAME: &'static str = "set_nonblocking";

    fn execute(&mut self, device: &dyn NativeDevice) -> Result<()> {
        device
            .set_nonblocking(self.nonblocking)
            .map_err(|e| HidError::Mode {
                message: e.into_message(),
            })
    }

    fn into_output(self) {}
}

/// Query the manufacturer, product and serial number strings
///
/// Each query fails independently; a failed query leaves its field empty.
#[derive(Debug, Default)]
pub struct DeviceInfo {
    strings: DeviceStrings,
}

impl DeviceInfo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Operation for DeviceInfo {
    type Output = DeviceStrings;
    const NAME: &'static str = "device_info";

    fn execute(&mut self, device: &dyn NativeDevice) -> Result<()> {
        self.strings = DeviceStrings {
            manufacturer: query_string("manufacturer", device.manufacturer_string()),
            product: query_string("product", device.product_string()),
            serial_number: query_string("serial number", device.serial_number_string()),
        };
        Ok(())
    }

    fn into_output(self) -> DeviceStrings {
        self.strings
    }
}

fn query_string(
    field: &str,
    result: std::result::Result<Option<NativeString>, DriverError>,
) -> Option<String> {
    match result {
        Ok(value) => value.map(|s| s.to_utf8()),
        Err(e) => {
            debug!("Failed to read {} string: {}", field, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeDevice, FakeDeviceState};
    use std::sync::Arc;

    fn device() -> (FakeDevice, Arc<FakeDeviceState>) {
        let state = FakeDeviceState::loopback();
        (FakeDevice::new(Arc::clone(&state)), state)
    }

    #[test]
    fn test_write_then_read() {
        let (dev, _state) = device();
        let written = run(&dev, Write::new(vec![0x00, 1, 2, 3])).unwrap();
        assert_eq!(written.into_output(), 4);

        let read = run(&dev, Read::new(100, 64)).unwrap();
        assert_eq!(read.into_output(), vec![1, 2, 3]);
    }

    #[test]
    fn test_read_timeout_yields_empty_report() {
        let (dev, _state) = device();
        let read = run(&dev, Read::new(5, 64)).unwrap();
        assert!(read.into_output().is_empty());
    }

    #[test]
    fn test_read_error_maps_to_read_kind() {
        let (dev, state) = device();
        state.fail_reads(true);
        let err = run(&dev, Read::new(5, 64)).unwrap_err();
        assert!(matches!(err, HidError::Read { .. }));
    }

    #[test]
    fn test_feature_report_zero_length_rejected() {
        let err = GetFeatureReport::new(1, 0).unwrap_err();
        assert!(matches!(err, HidError::InvalidArgument { .. }));
    }

    #[test]
    fn test_get_feature_report_truncates() {
        let (dev, state) = device();
        state.set_feature_report(0x02, vec![0x02, 0xaa, 0xbb]);
        let op = run(&dev, GetFeatureReport::new(0x02, 64).unwrap()).unwrap();
        assert_eq!(op.into_output(), vec![0x02, 0xaa, 0xbb]);
    }

    #[test]
    fn test_send_feature_report_requires_id() {
        assert!(SendFeatureReport::new(Vec::new()).is_err());

        let (dev, state) = device();
        let op = run(&dev, SendFeatureReport::new(vec![0x05, 9, 9]).unwrap()).unwrap();
        assert_eq!(op.into_output(), 3);
        assert_eq!(state.feature_report(0x05), Some(vec![0x05, 9, 9]));
    }

    #[test]
    fn test_set_nonblocking_records_mode() {
        let (dev, state) = device();
        run(&dev, SetNonBlocking::new(true)).unwrap();
        assert!(state.is_nonblocking());
    }

    #[test]
    fn test_device_info_partial_failure() {
        let (dev, state) = device();
        state.set_strings(Some("Acme"), Some("Widget"), Some("0001"));
        state.fail_product_string(true);

        let strings = run(&dev, DeviceInfo::new()).unwrap().into_output();
        assert_eq!(strings.manufacturer.as_deref(), Some("Acme"));
        assert_eq!(strings.product, None);
        assert_eq!(strings.serial_number.as_deref(), Some("0001"));
    }
}
