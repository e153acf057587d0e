//! Per-owner entry point
//!
//! A [`HidContext`] holds one reference to the driver subsystem plus the
//! queue that serializes its opens and enumerations. Several contexts can
//! share one subsystem; the driver is initialized once for all of them and
//! torn down after the last context and the last device are gone.

use crate::config::{DeviceSettings, HidConfig};
use crate::device::DeviceHandle;
use crate::enumerate;
use crate::queue::{JobFuture, JobQueue};
use crate::subsystem::{Subsystem, SubsystemRegistry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use types::{DeviceDescriptor, HidError, OpenTarget, Result};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

pub struct HidContext {
    id: u64,
    subsystem: Mutex<Option<Arc<Subsystem>>>,
    queue: JobQueue,
    settings: DeviceSettings,
}

impl HidContext {
    /// Create a context on the process-wide hidapi subsystem
    ///
    /// Device settings come from the user's config file when one exists.
    #[cfg(feature = "hidapi")]
    pub fn new() -> Result<Self> {
        Self::with_config(&HidConfig::load_or_default())
    }

    /// Create a context on the process-wide hidapi subsystem
    #[cfg(feature = "hidapi")]
    pub fn with_config(config: &HidConfig) -> Result<Self> {
        Self::with_registry(crate::subsystem::global_registry(), config)
    }

    /// Create a context on a specific registry
    pub fn with_registry(registry: &SubsystemRegistry, config: &HidConfig) -> Result<Self> {
        Ok(Self::from_subsystem(registry.acquire()?, config))
    }

    pub fn from_subsystem(subsystem: Arc<Subsystem>, config: &HidConfig) -> Self {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!("HID context #{} created", id);
        Self {
            id,
            subsystem: Mutex::new(Some(subsystem)),
            queue: JobQueue::new(format!("hid-context-{}", id)),
            settings: config.device.clone(),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<Subsystem>>> {
        self.subsystem.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The context's subsystem, unless it has been shut down
    pub fn subsystem(&self) -> Result<Arc<Subsystem>> {
        self.slot().clone().ok_or(HidError::NotInitialized)
    }

    pub fn is_active(&self) -> bool {
        self.slot().is_some()
    }

    /// List attached devices
    ///
    /// With `Some((vendor_id, product_id))` only matching devices are
    /// returned; a zero id matches anything.
    pub fn devices(&self, filter: Option<(u16, u16)>) -> JobFuture<Vec<DeviceDescriptor>> {
        match self.subsystem() {
            Ok(subsystem) => self
                .queue
                .submit(move || enumerate::enumerate(&subsystem, filter)),
            Err(e) => JobFuture::failed(e),
        }
    }

    /// Open a device by platform path
    pub fn open_path(&self, path: &str) -> JobFuture<DeviceHandle> {
        self.open_target(OpenTarget::Path(path.to_string()))
    }

    /// Open the first device matching the ids and, if given, serial number
    pub fn open(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<&str>,
    ) -> JobFuture<DeviceHandle> {
        self.open_target(OpenTarget::Ids {
            vendor_id,
            product_id,
            serial_number: serial_number.map(str::to_string),
        })
    }

    fn open_target(&self, target: OpenTarget) -> JobFuture<DeviceHandle> {
        let subsystem = match self.subsystem() {
            Ok(subsystem) => subsystem,
            Err(e) => return JobFuture::failed(e),
        };
        let settings = self.settings.clone();
        self.queue
            .submit(move || DeviceHandle::open(subsystem, target, settings))
    }

    /// Release this context's subsystem reference
    ///
    /// Devices already open keep working. Later opens and enumerations,
    /// including ones still queued, fail with [`HidError::NotInitialized`].
    pub fn shutdown(&self) {
        let released = self.slot().take();
        self.queue.shutdown(HidError::NotInitialized);
        if released.is_some() {
            info!("HID context #{} shut down", self.id);
        }
    }
}

impl Drop for HidContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
