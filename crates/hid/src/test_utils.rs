//! Test utilities for hid-async
//!
//! Provides an in-memory [`FakeDriver`] that stands in for the platform HID
//! library, plus async test helpers.
//!
//! # Example
//!
//! ```
//! use hid_async::subsystem::SubsystemRegistry;
//! use hid_async::test_utils::{FakeDriver, fake_record};
//!
//! let driver = FakeDriver::new();
//! driver.add_device(fake_record("/dev/fake0", 0x1234, 0x5678));
//!
//! let registry = SubsystemRegistry::new(driver.clone());
//! let subsystem = registry.acquire().unwrap();
//! assert_eq!(driver.init_calls(), 1);
//! drop(subsystem);
//! assert_eq!(driver.exit_calls(), 1);
//! ```

use crate::driver::{DriverError, HidDriver, NativeDevice};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use types::{NativeString, RawDeviceRecord};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a raw enumeration record for a fake device
pub fn fake_record(path: &str, vendor_id: u16, product_id: u16) -> RawDeviceRecord {
    RawDeviceRecord {
        path: Some(path.to_string()),
        vendor_id,
        product_id,
        serial_number: Some(NativeString::wide_from_str(&format!(
            "SN{:04x}{:04x}",
            vendor_id, product_id
        ))),
        release_number: 0x0100,
        manufacturer_string: Some(NativeString::wide_from_str("Fake Manufacturer")),
        product_string: Some(NativeString::wide_from_str("Fake Product")),
        usage_page: 0xff00,
        usage: 0x01,
        interface_number: 0,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct FakeEntry {
    record: RawDeviceRecord,
    state: Arc<FakeDeviceState>,
}

/// In-memory HID driver
#[derive(Default)]
pub struct FakeDriver {
    devices: Mutex<Vec<FakeEntry>>,
    initialized: AtomicBool,
    double_init: AtomicBool,
    fail_init: AtomicBool,
    init_calls: AtomicUsize,
    exit_calls: AtomicUsize,
    open_calls: AtomicUsize,
    enumerate_calls: AtomicUsize,
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a loopback device and return its inspectable state
    pub fn add_device(&self, record: RawDeviceRecord) -> Arc<FakeDeviceState> {
        let state = FakeDeviceState::loopback();
        lock(&self.devices).push(FakeEntry {
            record,
            state: Arc::clone(&state),
        });
        state
    }

    pub fn fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn exit_calls(&self) -> usize {
        self.exit_calls.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn enumerate_calls(&self) -> usize {
        self.enumerate_calls.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Whether `init` was ever called while already initialized
    pub fn saw_double_init(&self) -> bool {
        self.double_init.load(Ordering::SeqCst)
    }

    fn ensure_initialized(&self) -> Result<(), DriverError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(DriverError::new("fake driver is not initialized"))
        }
    }

    fn open_entry<P>(&self, predicate: P) -> Result<Box<dyn NativeDevice>, DriverError>
    where
        P: Fn(&RawDeviceRecord) -> bool,
    {
        self.ensure_initialized()?;
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let devices = lock(&self.devices);
        let entry = devices
            .iter()
            .find(|entry| predicate(&entry.record))
            .ok_or_else(|| DriverError::new("no matching device"))?;
        Ok(Box::new(FakeDevice::new(Arc::clone(&entry.state))))
    }
}

impl HidDriver for FakeDriver {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn init(&self) -> Result<(), DriverError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(DriverError::new("fake init failure"));
        }
        if self.initialized.swap(true, Ordering::SeqCst) {
            self.double_init.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn exit(&self) {
        self.exit_calls.fetch_add(1, Ordering::SeqCst);
        self.initialized.store(false, Ordering::SeqCst);
    }

    fn enumerate(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<RawDeviceRecord>, DriverError> {
        self.ensure_initialized()?;
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        // Filtering is left to the caller, like drivers that ignore the ids
        let _ = (vendor_id, product_id);
        Ok(lock(&self.devices)
            .iter()
            .map(|entry| entry.record.clone())
            .collect())
    }

    fn open_path(&self, path: &str) -> Result<Box<dyn NativeDevice>, DriverError> {
        self.open_entry(|record| record.path.as_deref() == Some(path))
    }

    fn open(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<&str>,
    ) -> Result<Box<dyn NativeDevice>, DriverError> {
        self.open_entry(|record| {
            record.vendor_id == vendor_id
                && record.product_id == product_id
                && serial_number.is_none_or(|serial| {
                    record
                        .serial_number
                        .as_ref()
                        .is_some_and(|s| s.to_utf8() == serial)
                })
        })
    }
}

#[derive(Default)]
struct FakeStrings {
    manufacturer: Option<String>,
    product: Option<String>,
    serial_number: Option<String>,
}

/// Shared state behind a fake device, inspectable from tests
#[derive(Default)]
pub struct FakeDeviceState {
    loopback: bool,
    reports: Mutex<VecDeque<Vec<u8>>>,
    report_arrived: Condvar,
    writes: Mutex<Vec<Vec<u8>>>,
    feature_reports: Mutex<HashMap<u8, Vec<u8>>>,
    strings: Mutex<FakeStrings>,
    nonblocking: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_product_string: AtomicBool,
    op_delay_ms: AtomicUsize,
    active_ops: AtomicUsize,
    max_active_ops: AtomicUsize,
    reads: AtomicUsize,
    closes: AtomicUsize,
}

impl FakeDeviceState {
    /// A device that echoes every written report back as an input report
    pub fn loopback() -> Arc<Self> {
        Arc::new(Self {
            loopback: true,
            strings: Mutex::new(FakeStrings {
                manufacturer: Some("Fake Manufacturer".to_string()),
                product: Some("Fake Product".to_string()),
                serial_number: Some("FAKE0001".to_string()),
            }),
            ..Self::default()
        })
    }

    /// Queue an input report
    pub fn push_report(&self, report: Vec<u8>) {
        lock(&self.reports).push_back(report);
        self.report_arrived.notify_all();
    }

    /// Reports written so far, in order, as received by the device
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.writes).clone()
    }

    pub fn set_feature_report(&self, report_id: u8, report: Vec<u8>) {
        lock(&self.feature_reports).insert(report_id, report);
    }

    pub fn feature_report(&self, report_id: u8) -> Option<Vec<u8>> {
        lock(&self.feature_reports).get(&report_id).cloned()
    }

    pub fn set_strings(
        &self,
        manufacturer: Option<&str>,
        product: Option<&str>,
        serial_number: Option<&str>,
    ) {
        *lock(&self.strings) = FakeStrings {
            manufacturer: manufacturer.map(str::to_string),
            product: product.map(str::to_string),
            serial_number: serial_number.map(str::to_string),
        };
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_product_string(&self, fail: bool) {
        self.fail_product_string.store(fail, Ordering::SeqCst);
    }

    /// Make every non-read call sleep, to widen race windows
    pub fn set_op_delay(&self, delay: Duration) {
        self.op_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking.load(Ordering::SeqCst)
    }

    /// Highest number of non-read calls ever executing at once
    pub fn max_concurrent_ops(&self) -> usize {
        self.max_active_ops.load(Ordering::SeqCst)
    }

    /// Number of `read_timeout` calls issued
    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of native handles to this device that have been closed
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn track<T>(&self, call: impl FnOnce() -> T) -> T {
        let now = self.active_ops.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_ops.fetch_max(now, Ordering::SeqCst);
        let delay = self.op_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay as u64));
        }
        let result = call();
        self.active_ops.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// An open handle to a fake device
pub struct FakeDevice {
    state: Arc<FakeDeviceState>,
}

impl FakeDevice {
    pub fn new(state: Arc<FakeDeviceState>) -> Self {
        Self { state }
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl NativeDevice for FakeDevice {
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, DriverError> {
        let state = &self.state;
        state.reads.fetch_add(1, Ordering::SeqCst);
        if state.fail_reads.load(Ordering::SeqCst) {
            return Err(DriverError::new("fake read failure"));
        }

        let mut reports = lock(&state.reports);
        if reports.is_empty() && !state.is_nonblocking() && timeout_ms != 0 {
            reports = if timeout_ms < 0 {
                state
                    .report_arrived
                    .wait_while(reports, |r| r.is_empty())
                    .unwrap_or_else(|e| e.into_inner())
            } else {
                state
                    .report_arrived
                    .wait_timeout_while(
                        reports,
                        Duration::from_millis(timeout_ms as u64),
                        |r| r.is_empty(),
                    )
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|e| e.into_inner().0)
            };
        }

        match reports.pop_front() {
            Some(report) => {
                let n = report.len().min(buf.len());
                buf[..n].copy_from_slice(&report[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    fn write(&self, data: &[u8]) -> Result<usize, DriverError> {
        self.state.track(|| {
            if self.state.fail_writes.load(Ordering::SeqCst) {
                return Err(DriverError::new("fake write failure"));
            }
            // Report id 0 means the device uses unnumbered reports
            let payload = match data.split_first() {
                Some((&0, rest)) => rest,
                _ => data,
            };
            lock(&self.state.writes).push(payload.to_vec());
            if self.state.loopback {
                self.state.push_report(payload.to_vec());
            }
            Ok(data.len())
        })
    }

    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, DriverError> {
        self.state.track(|| {
            let report_id = buf.first().copied().unwrap_or(0);
            let reports = lock(&self.state.feature_reports);
            let report = reports
                .get(&report_id)
                .ok_or_else(|| DriverError::new("unknown feature report"))?;
            let n = report.len().min(buf.len());
            buf[..n].copy_from_slice(&report[..n]);
            Ok(n)
        })
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<usize, DriverError> {
        self.state.track(|| {
            let report_id = data
                .first()
                .copied()
                .ok_or_else(|| DriverError::new("empty feature report"))?;
            self.state.set_feature_report(report_id, data.to_vec());
            Ok(data.len())
        })
    }

    fn set_nonblocking(&self, nonblocking: bool) -> Result<(), DriverError> {
        self.state.track(|| {
            self.state.nonblocking.store(nonblocking, Ordering::SeqCst);
            Ok(())
        })
    }

    fn manufacturer_string(&self) -> Result<Option<NativeString>, DriverError> {
        self.state.track(|| {
            Ok(lock(&self.state.strings)
                .manufacturer
                .as_deref()
                .map(NativeString::wide_from_str))
        })
    }

    fn product_string(&self) -> Result<Option<NativeString>, DriverError> {
        self.state.track(|| {
            if self.state.fail_product_string.load(Ordering::SeqCst) {
                return Err(DriverError::new("fake string failure"));
            }
            Ok(lock(&self.state.strings)
                .product
                .as_deref()
                .map(NativeString::wide_from_str))
        })
    }

    fn serial_number_string(&self) -> Result<Option<NativeString>, DriverError> {
        self.state.track(|| {
            Ok(lock(&self.state.strings)
                .serial_number
                .as_deref()
                .map(NativeString::wide_from_str))
        })
    }
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
///
/// # Example
/// ```ignore
/// use hid_async::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let n = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
///     assert_eq!(n, 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// A test future outlived its deadline
#[derive(Debug, thiserror::Error)]
#[error("timed out after {duration:?}")]
pub struct TimeoutError {
    pub duration: Duration,
}
