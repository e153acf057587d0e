//! Open device handle
//!
//! A [`DeviceHandle`] owns one native device session. Every operation is
//! queued on the device's own [`JobQueue`], so at most one native call runs
//! against the device at a time and results arrive in submission order.
//! Operation methods enqueue immediately and return a future; awaiting it
//! is only needed to observe the result.
//!
//! A poll loop can run alongside the queue. While it does, one-shot reads
//! are rejected with [`HidError::PollActive`], and a loop cannot start while
//! a one-shot read is queued or running.

use crate::config::DeviceSettings;
use crate::driver::NativeDevice;
use crate::enumerate;
use crate::operation::{
    self, DeviceInfo, GetFeatureReport, Operation, OperationFuture, Read, SendFeatureReport,
    SetNonBlocking, Write,
};
use crate::poll::{PollEvent, PollSettings, PollStatus, Poller};
use crate::queue::JobQueue;
use crate::subsystem::Subsystem;
use common::ReportStream;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tracing::{debug, info, trace};
use types::{HidError, OpenTarget, Result};

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

struct DeviceInner {
    id: u64,
    target: OpenTarget,
    native: Mutex<Option<Arc<dyn NativeDevice>>>,
    closed: AtomicBool,
    // One-shot reads submitted and not yet finished or aborted
    reads: AtomicUsize,
    queue: JobQueue,
    poller: Poller,
    settings: DeviceSettings,
    // Dropped last so the driver outlives the native handle
    _subsystem: Arc<Subsystem>,
}

impl DeviceInner {
    fn slot(&self) -> MutexGuard<'_, Option<Arc<dyn NativeDevice>>> {
        self.native.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The native handle, unless the device has been closed
    fn native(&self) -> Result<Arc<dyn NativeDevice>> {
        if self.is_closed() {
            return Err(HidError::DeviceClosed);
        }
        self.slot().clone().ok_or(HidError::DeviceClosed)
    }

    fn release_native(&self) {
        if self.slot().take().is_some() {
            trace!("Device #{}: native handle released", self.id);
        }
    }
}

/// Counts one outstanding one-shot read
///
/// Travels with the read job, so an aborted job releases it too.
struct ReadTicket(Arc<DeviceInner>);

impl ReadTicket {
    fn new(inner: &Arc<DeviceInner>) -> Self {
        inner.reads.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(inner))
    }
}

impl Drop for ReadTicket {
    fn drop(&mut self) {
        self.0.reads.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An open HID device
pub struct DeviceHandle {
    inner: Arc<DeviceInner>,
}

impl DeviceHandle {
    /// Open `target` through `subsystem`, blocking the calling thread
    pub(crate) fn open(
        subsystem: Arc<Subsystem>,
        target: OpenTarget,
        settings: DeviceSettings,
    ) -> Result<Self> {
        let native: Arc<dyn NativeDevice> = enumerate::open_native(&subsystem, &target)?.into();
        let id = NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed);
        info!("Opened HID device #{} with {}", id, target);

        Ok(Self {
            inner: Arc::new(DeviceInner {
                id,
                queue: JobQueue::new(format!("hid-device-{}", id)),
                target,
                native: Mutex::new(Some(native)),
                closed: AtomicBool::new(false),
                reads: AtomicUsize::new(0),
                poller: Poller::new(),
                settings,
                _subsystem: subsystem,
            }),
        })
    }

    /// Process-unique id used in logs and thread names
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// What this device was opened with
    pub fn target(&self) -> &OpenTarget {
        &self.inner.target
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn poll_status(&self) -> PollStatus {
        self.inner.poller.status()
    }

    /// Number of operations waiting behind the one in flight
    pub fn pending_operations(&self) -> usize {
        self.inner.queue.pending()
    }

    fn submit<O: Operation>(&self, op: O) -> OperationFuture<O> {
        self.submit_with(op, ())
    }

    /// Queue `op` together with `ticket`, which is dropped when the job ends
    ///
    /// The native handle is taken now, so a job that has started keeps it
    /// even if the device is closed before the job reaches the driver.
    fn submit_with<O, T>(&self, op: O, ticket: T) -> OperationFuture<O>
    where
        O: Operation,
        T: Send + 'static,
    {
        let native = match self.inner.native() {
            Ok(native) => native,
            Err(e) => return OperationFuture::failed(e),
        };
        let inner = Arc::clone(&self.inner);
        OperationFuture::new(self.inner.queue.submit(move || {
            trace!("Device #{}: {}", inner.id, O::NAME);
            let result = operation::run(native.as_ref(), op).inspect_err(|e| {
                debug!("Device #{}: {} failed: {}", inner.id, O::NAME, e);
            });
            // Before `inner`, which holds the subsystem
            drop(native);
            drop(ticket);
            result
        }))
    }

    /// Write an output report
    ///
    /// The first byte is the report id (0 for devices without numbered
    /// reports). Resolves to the number of bytes written.
    pub fn write(&self, data: impl Into<Vec<u8>>) -> OperationFuture<Write> {
        self.submit(Write::new(data.into()))
    }

    /// Read one input report
    ///
    /// `None` uses the configured default timeout (blocking unless
    /// configured otherwise); `Some(-1)` blocks until a report arrives. An
    /// empty report means the read timed out or the device is in
    /// nonblocking mode with nothing pending.
    pub fn read(&self, timeout_ms: Option<i32>) -> OperationFuture<Read> {
        if self.is_closed() {
            return OperationFuture::failed(HidError::DeviceClosed);
        }
        let ticket = match self
            .inner
            .poller
            .while_idle(|| ReadTicket::new(&self.inner))
        {
            Ok(ticket) => ticket,
            Err(e) => return OperationFuture::failed(e),
        };
        let settings = &self.inner.settings;
        let timeout_ms = timeout_ms.unwrap_or(settings.default_read_timeout_ms);
        self.submit_with(Read::new(timeout_ms, settings.read_buffer_size), ticket)
    }

    /// Read feature report `report_id`
    ///
    /// `length` counts the report id byte. The result is trimmed to the
    /// bytes the device returned.
    pub fn get_feature_report(
        &self,
        report_id: u8,
        length: usize,
    ) -> OperationFuture<GetFeatureReport> {
        if self.is_closed() {
            return OperationFuture::failed(HidError::DeviceClosed);
        }
        match GetFeatureReport::new(report_id, length) {
            Ok(op) => self.submit(op),
            Err(e) => OperationFuture::failed(e),
        }
    }

    /// Send a feature report whose first byte is the report id
    pub fn send_feature_report(
        &self,
        data: impl Into<Vec<u8>>,
    ) -> OperationFuture<SendFeatureReport> {
        if self.is_closed() {
            return OperationFuture::failed(HidError::DeviceClosed);
        }
        match SendFeatureReport::new(data.into()) {
            Ok(op) => self.submit(op),
            Err(e) => OperationFuture::failed(e),
        }
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> OperationFuture<SetNonBlocking> {
        self.submit(SetNonBlocking::new(nonblocking))
    }

    /// Manufacturer, product and serial number strings
    pub fn device_info(&self) -> OperationFuture<DeviceInfo> {
        self.submit(DeviceInfo::new())
    }

    /// Start the background poll loop
    ///
    /// Reports and the terminal error, if any, arrive on the returned
    /// stream. The loop stops on [`stop_polling`](Self::stop_polling), on
    /// close, after a read error, or once the stream is dropped and the next
    /// report cannot be delivered.
    ///
    /// Fails with [`HidError::PollActive`] while a one-shot read is queued or
    /// running.
    pub fn start_polling(&self) -> Result<ReportStream<PollEvent>> {
        let inner = &self.inner;
        let settings = PollSettings {
            timeout_ms: inner.settings.poll_timeout_ms(),
            buffer_size: inner.settings.read_buffer_size,
        };
        inner
            .poller
            .start(format!("hid-poll-{}", inner.id), settings, || {
                if inner.reads.load(Ordering::Acquire) > 0 {
                    return Err(HidError::PollActive);
                }
                inner.native()
            })
    }

    /// Start the poll loop and feed every event to `consumer`
    ///
    /// The consumer runs on a task spawned on the current tokio runtime,
    /// never on the poll thread.
    pub fn start_polling_with<F>(&self, mut consumer: F) -> Result<()>
    where
        F: FnMut(PollEvent) + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|e| HidError::WorkerLost {
            message: e.to_string(),
        })?;
        let stream = self.start_polling()?;
        drop(runtime.spawn(async move {
            while let Some(event) = stream.recv().await {
                consumer(event);
            }
        }));
        Ok(())
    }

    /// Stop the poll loop and wait until its thread has exited
    ///
    /// Does nothing if no loop is running.
    pub async fn stop_polling(&self) {
        self.inner.poller.stop().await;
    }

    /// Close the device
    ///
    /// Stops the poll loop, fails queued operations with
    /// [`HidError::DeviceClosed`], waits for the one in flight and then
    /// releases the native handle. A blocking read in flight delays this
    /// until it returns.
    pub async fn close(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return Err(HidError::AlreadyClosed);
        }
        debug!("Closing HID device #{}", inner.id);

        inner.poller.stop().await;
        let aborted = inner.queue.shutdown(HidError::DeviceClosed);
        if aborted > 0 {
            debug!("Device #{}: {} queued operations aborted", inner.id, aborted);
        }
        inner.queue.wait_idle().await;
        inner.release_native();

        info!("Closed HID device #{}", inner.id);
        Ok(())
    }
}

impl Drop for DeviceHandle {
    /// Implicit close
    ///
    /// Waits for the poll thread (at most one poll interval) but not for an
    /// operation in flight; that operation keeps the native handle alive
    /// until it finishes.
    fn drop(&mut self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        inner.poller.stop_blocking();
        inner.queue.shutdown(HidError::DeviceClosed);
        inner.release_native();
        debug!("HID device #{} dropped without close", inner.id);
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("id", &self.inner.id)
            .field("target", &self.inner.target)
            .field("closed", &self.is_closed())
            .finish()
    }
}
