//! Background poll loop
//!
//! A poll loop owns a dedicated OS thread that issues short-timeout reads
//! and forwards every non-empty report to the consumer through a channel
//! bridge. A read error is forwarded once and ends the loop. The thread
//! never runs consumer code.
//!
//! ```text
//! Idle ──start──► Running ──abort / error / consumer gone──► Stopping ──► Idle
//! ```
//!
//! The abort flag is checked before and after every read, so a stop request
//! is honoured within one poll interval.

use crate::driver::NativeDevice;
use common::{ReportSink, ReportStream, create_report_bridge};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};
use types::{HidError, Result};

/// What a poll consumer receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// One input report, owned by the consumer
    Report(Vec<u8>),
    /// Terminal read error; no further events follow
    Error(HidError),
}

/// Observable state of a device's poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Idle,
    Running,
    /// Abort requested, thread not yet exited
    Stopping,
}

/// Read parameters of one poll loop
#[derive(Debug, Clone, Copy)]
pub(crate) struct PollSettings {
    pub timeout_ms: i32,
    pub buffer_size: usize,
}

/// State shared between a poll thread and whoever stops it
struct PollState {
    abort: AtomicBool,
    running: Mutex<bool>,
    exited: Condvar,
}

impl PollState {
    fn new() -> Self {
        Self {
            abort: AtomicBool::new(false),
            running: Mutex::new(true),
            exited: Condvar::new(),
        }
    }

    fn running(&self) -> MutexGuard<'_, bool> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        *self.running()
    }

    fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    fn request_abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    /// Block until the thread has released its resources
    fn wait(&self) {
        let running = self.running();
        let _exited = self
            .exited
            .wait_while(running, |running| *running)
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn release(&self) {
        *self.running() = false;
        self.exited.notify_all();
    }
}

/// Marks the loop as exited once the thread body has dropped everything else
struct ReleaseOnExit(Arc<PollState>);

impl Drop for ReleaseOnExit {
    fn drop(&mut self) {
        self.0.release();
    }
}

struct PollSession {
    state: Arc<PollState>,
    thread: Option<JoinHandle<()>>,
}

/// Per-device poll loop slot
#[derive(Default)]
pub(crate) struct Poller {
    session: Mutex<Option<PollSession>>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self) -> MutexGuard<'_, Option<PollSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> PollStatus {
        match self.session().as_ref() {
            Some(session) if session.state.is_running() => {
                if session.state.is_aborted() {
                    PollStatus::Stopping
                } else {
                    PollStatus::Running
                }
            }
            _ => PollStatus::Idle,
        }
    }

    /// Run `f` while holding the slot, unless a loop is running
    ///
    /// No loop can start until `f` returns.
    pub fn while_idle<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let slot = self.session();
        if slot.as_ref().is_some_and(|s| s.state.is_running()) {
            return Err(HidError::PollActive);
        }
        Ok(f())
    }

    /// Start a poll thread
    ///
    /// `acquire` runs under the slot lock and supplies the device to read
    /// from; a stop racing this call either sees the new session or makes
    /// `acquire` fail.
    pub fn start<F>(
        &self,
        name: String,
        settings: PollSettings,
        acquire: F,
    ) -> Result<ReportStream<PollEvent>>
    where
        F: FnOnce() -> Result<Arc<dyn NativeDevice>>,
    {
        let mut slot = self.session();
        if let Some(session) = slot.as_ref()
            && session.state.is_running()
        {
            return Err(HidError::AlreadyRunning);
        }
        // A loop that ended by itself leaves a finished thread behind
        if let Some(finished) = slot.take() {
            finished.join();
        }

        let native = acquire()?;
        let state = Arc::new(PollState::new());
        let (sink, stream) = create_report_bridge();

        let thread_state = Arc::clone(&state);
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _release = ReleaseOnExit(Arc::clone(&thread_state));
                run_poll_loop(native, &thread_state, sink, settings);
            })
            .map_err(|e| HidError::WorkerLost {
                message: format!("failed to spawn poll thread: {}", e),
            })?;

        debug!("Poll loop started on {}", name);
        *slot = Some(PollSession {
            state,
            thread: Some(thread),
        });
        Ok(stream)
    }

    /// Ask the current loop to stop and return a handle to wait on
    fn request_stop(&self) -> Option<Arc<PollState>> {
        let slot = self.session();
        let session = slot.as_ref()?;
        session.state.request_abort();
        Some(Arc::clone(&session.state))
    }

    /// Join a loop that has exited
    fn reap(&self) {
        let mut slot = self.session();
        if slot.as_ref().is_some_and(|s| !s.state.is_running())
            && let Some(finished) = slot.take()
        {
            finished.join();
        }
    }

    /// Stop the loop and wait for its thread, blocking the caller
    pub fn stop_blocking(&self) {
        if let Some(state) = self.request_stop() {
            state.wait();
            self.reap();
        }
    }

    /// Stop the loop, waiting on the blocking pool
    ///
    /// Returns immediately if no loop is running.
    pub async fn stop(&self) {
        let Some(state) = self.request_stop() else {
            return;
        };
        let waiter = Arc::clone(&state);
        if let Err(e) = tokio::task::spawn_blocking(move || waiter.wait()).await {
            warn!("Poll stop waiter failed: {}", e);
            state.wait();
        }
        self.reap();
    }
}

impl PollSession {
    fn join(mut self) {
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Poll thread panicked");
        }
    }
}

fn run_poll_loop(
    native: Arc<dyn NativeDevice>,
    state: &PollState,
    sink: ReportSink<PollEvent>,
    settings: PollSettings,
) {
    let mut buf = vec![0u8; settings.buffer_size];
    let mut delivered: u64 = 0;

    while !state.is_aborted() {
        let result = native.read_timeout(&mut buf, settings.timeout_ms);
        if state.is_aborted() {
            break;
        }

        match result {
            Err(e) => {
                warn!("Poll read failed: {}", e);
                let _ = sink.send(PollEvent::Error(HidError::Read {
                    message: e.into_message(),
                }));
                break;
            }
            Ok(0) => continue,
            Ok(n) => {
                // Hand the filled buffer over and read into a fresh one
                let mut report = std::mem::replace(&mut buf, vec![0u8; settings.buffer_size]);
                report.truncate(n);
                if sink.send(PollEvent::Report(report)).is_err() {
                    debug!("Poll consumer dropped, stopping");
                    break;
                }
                delivered += 1;
                trace!("Poll delivered report #{} ({} bytes)", delivered, n);
            }
        }
    }

    debug!("Poll loop exiting after {} reports", delivered);
}
