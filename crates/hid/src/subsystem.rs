//! Reference-counted driver subsystem
//!
//! The native driver is initialized when the first [`Subsystem`] handle is
//! acquired and torn down when the last one is dropped. Every open device
//! keeps a handle, so the driver outlives all devices opened through it.
//!
//! A handle dropping to zero and a new acquire racing it is resolved by the
//! registry: the acquirer waits until teardown has finished and then
//! initializes a fresh subsystem. Init and exit therefore strictly
//! alternate.

use crate::driver::HidDriver;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info};
use types::{HidError, Result};

#[cfg(feature = "hidapi")]
use std::sync::OnceLock;

/// Owner of the (at most one) live subsystem for a driver
pub struct SubsystemRegistry {
    driver: Arc<dyn HidDriver>,
    shared: Arc<RegistryShared>,
}

struct RegistryShared {
    slot: Mutex<Slot>,
    torn_down: Condvar,
}

struct Slot {
    current: Weak<Subsystem>,
    /// True from successful init until exit has returned
    live: bool,
}

impl RegistryShared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SubsystemRegistry {
    pub fn new(driver: Arc<dyn HidDriver>) -> Self {
        Self {
            driver,
            shared: Arc::new(RegistryShared {
                slot: Mutex::new(Slot {
                    current: Weak::new(),
                    live: false,
                }),
                torn_down: Condvar::new(),
            }),
        }
    }

    /// Get a handle to the live subsystem, initializing the driver if needed
    pub fn acquire(&self) -> Result<Arc<Subsystem>> {
        let mut slot = self.shared.lock();

        loop {
            if let Some(existing) = slot.current.upgrade() {
                return Ok(existing);
            }
            if !slot.live {
                break;
            }
            // Last handle is gone but exit has not run yet
            slot = self
                .shared
                .torn_down
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }

        self.driver.init().map_err(|e| {
            debug!("{} init failed: {}", self.driver.name(), e);
            HidError::Init {
                message: e.into_message(),
            }
        })?;

        let subsystem = Arc::new(Subsystem {
            driver: Arc::clone(&self.driver),
            shared: Arc::clone(&self.shared),
            enumerate_lock: Mutex::new(()),
        });
        slot.current = Arc::downgrade(&subsystem);
        slot.live = true;

        info!("HID subsystem initialized ({})", self.driver.name());
        Ok(subsystem)
    }

    /// Whether the driver is currently initialized
    pub fn is_live(&self) -> bool {
        self.shared.lock().live
    }

    pub fn driver(&self) -> &Arc<dyn HidDriver> {
        &self.driver
    }
}

/// Process-wide registry backed by hidapi
#[cfg(feature = "hidapi")]
pub fn global_registry() -> &'static SubsystemRegistry {
    static GLOBAL: OnceLock<SubsystemRegistry> = OnceLock::new();
    GLOBAL.get_or_init(|| {
        SubsystemRegistry::new(Arc::new(crate::driver::hidapi_backend::HidApiDriver::new()))
    })
}

/// A live, initialized driver
///
/// Also owns the enumerate lock that serializes enumeration against device
/// opens.
pub struct Subsystem {
    driver: Arc<dyn HidDriver>,
    shared: Arc<RegistryShared>,
    enumerate_lock: Mutex<()>,
}

impl Subsystem {
    pub fn driver(&self) -> &dyn HidDriver {
        self.driver.as_ref()
    }

    /// Hold while enumerating or opening
    pub fn lock_enumerate(&self) -> MutexGuard<'_, ()> {
        self.enumerate_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Subsystem {
    fn drop(&mut self) {
        let mut slot = self.shared.lock();
        self.driver.exit();
        slot.live = false;
        slot.current = Weak::new();
        self.shared.torn_down.notify_all();
        info!("HID subsystem released ({})", self.driver.name());
    }
}

impl std::fmt::Debug for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subsystem")
            .field("driver", &self.driver.name())
            .finish()
    }
}
