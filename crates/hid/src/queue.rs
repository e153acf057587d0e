//! Serialized job queue
//!
//! Each open device owns one queue. Jobs run one at a time on tokio's
//! blocking pool, in submission order. A job's result is delivered before
//! the next job is started, so callers observe completions in the order
//! they submitted.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, trace, warn};
use types::{HidError, Result};

/// A queued unit of blocking work
trait Job: Send {
    fn run(self: Box<Self>);
    fn abort(self: Box<Self>, error: HidError);
}

struct QueuedJob<T, F> {
    work: F,
    tx: oneshot::Sender<Result<T>>,
}

impl<T, F> Job for QueuedJob<T, F>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    fn run(self: Box<Self>) {
        let QueuedJob { work, tx } = *self;
        let result = catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            warn!("Job panicked: {}", message);
            Err(HidError::WorkerLost { message })
        });
        // Receiver may have been dropped by a caller that stopped waiting
        let _ = tx.send(result);
    }

    fn abort(self: Box<Self>, error: HidError) {
        let _ = self.tx.send(Err(error));
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

struct Entry {
    job: Box<dyn Job>,
    runtime: Handle,
}

#[derive(Default)]
struct QueueState {
    running: bool,
    shut_down: Option<HidError>,
    pending: VecDeque<Entry>,
}

struct QueueInner {
    name: String,
    state: Mutex<QueueState>,
    idle: Notify,
}

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// FIFO queue that runs at most one job at a time
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl JobQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Enqueue `work` and return a future for its result
    ///
    /// The job is ordered at the time of this call, not when the returned
    /// future is first polled. Must be called from within a tokio runtime.
    pub fn submit<T, F>(&self, work: F) -> JobFuture<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                return JobFuture::failed(HidError::WorkerLost {
                    message: e.to_string(),
                });
            }
        };

        let (tx, rx) = oneshot::channel();
        let entry = Entry {
            job: Box::new(QueuedJob { work, tx }),
            runtime,
        };

        let start_now = {
            let mut state = self.inner.lock();
            if let Some(error) = state.shut_down.clone() {
                drop(state);
                entry.job.abort(error);
                return JobFuture::pending(rx);
            }
            if state.running {
                state.pending.push_back(entry);
                trace!("{}: job queued ({} pending)", self.inner.name, state.pending.len());
                None
            } else {
                state.running = true;
                Some(entry)
            }
        };

        if let Some(entry) = start_now {
            start(Arc::clone(&self.inner), entry);
        }
        JobFuture::pending(rx)
    }

    /// Resolve every job that has not started with `error`
    ///
    /// The in-flight job, if any, is left to finish. Returns the number of
    /// jobs aborted.
    pub fn abort_pending(&self, error: HidError) -> usize {
        let drained: Vec<Entry> = self.inner.lock().pending.drain(..).collect();
        let count = drained.len();
        for entry in drained {
            entry.job.abort(error.clone());
        }
        if count > 0 {
            debug!("{}: aborted {} pending jobs", self.inner.name, count);
        }
        count
    }

    /// Refuse new jobs with `error` and abort those still pending
    pub fn shutdown(&self, error: HidError) -> usize {
        self.inner.lock().shut_down = Some(error.clone());
        self.abort_pending(error)
    }

    /// Whether a job is executing
    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// Number of jobs waiting behind the in-flight one
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Wait until no job is executing
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}

/// Runs on completion of a job, or when the runtime drops it unstarted
struct Advance(Arc<QueueInner>);

impl Drop for Advance {
    fn drop(&mut self) {
        let next = {
            let mut state = self.0.lock();
            match state.pending.pop_front() {
                Some(entry) => Some(entry),
                None => {
                    state.running = false;
                    None
                }
            }
        };

        match next {
            Some(entry) => start(Arc::clone(&self.0), entry),
            None => self.0.idle.notify_waiters(),
        }
    }
}

fn start(inner: Arc<QueueInner>, entry: Entry) {
    let Entry { job, runtime } = entry;
    let advance = Advance(inner);
    // The spawned task is detached; completion flows through the job's channel
    drop(runtime.spawn_blocking(move || {
        job.run();
        drop(advance);
    }));
}

/// Future resolving to a job's result
pub struct JobFuture<T> {
    state: FutureState<T>,
}

enum FutureState<T> {
    Waiting(oneshot::Receiver<Result<T>>),
    Failed(Option<HidError>),
}

impl<T> JobFuture<T> {
    fn pending(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            state: FutureState::Waiting(rx),
        }
    }

    /// A future that resolves immediately with `error`
    pub fn failed(error: HidError) -> Self {
        Self {
            state: FutureState::Failed(Some(error)),
        }
    }
}

impl<T> Unpin for JobFuture<T> {}

impl<T> Future for JobFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            FutureState::Waiting(rx) => Pin::new(rx).poll(cx).map(|result| {
                result.unwrap_or_else(|_| {
                    Err(HidError::WorkerLost {
                        message: "job dropped before completing".to_string(),
                    })
                })
            }),
            FutureState::Failed(error) => Poll::Ready(Err(error.take().unwrap_or(
                HidError::WorkerLost {
                    message: "future polled after completion".to_string(),
                },
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_jobs_run_in_order() {
        let queue = JobQueue::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));

        let futures: Vec<_> = (0..10)
            .map(|i| {
                let log = Arc::clone(&log);
                queue.submit(move || {
                    log.lock().unwrap().push(i);
                    Ok(i)
                })
            })
            .collect();

        for (i, fut) in futures.into_iter().enumerate() {
            assert_eq!(fut.await.unwrap(), i);
        }
        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_one_job_at_a_time() {
        let queue = JobQueue::new("test");
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let futures: Vec<_> = (0..8)
            .map(|_| {
                let active = Arc::clone(&active);
                let max_active = Arc::clone(&max_active);
                queue.submit(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        for fut in futures {
            fut.await.unwrap();
        }
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_job_reports_worker_lost() {
        let queue = JobQueue::new("test");
        let first = queue.submit::<(), _>(|| panic!("boom"));
        let second = queue.submit(|| Ok(7));

        let err = first.await.unwrap_err();
        assert_eq!(
            err,
            HidError::WorkerLost {
                message: "boom".to_string()
            }
        );
        assert_eq!(second.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_pending() {
        let queue = JobQueue::new("test");
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let blocker = queue.submit(move || {
            let _ = release_rx.recv();
            Ok(1)
        });
        let queued = queue.submit(|| Ok(2));
        assert_eq!(queue.pending(), 1);

        assert_eq!(queue.shutdown(HidError::DeviceClosed), 1);
        assert_eq!(queued.await.unwrap_err(), HidError::DeviceClosed);

        let late = queue.submit(|| Ok(3));
        assert_eq!(late.await.unwrap_err(), HidError::DeviceClosed);

        release_tx.send(()).unwrap();
        assert_eq!(blocker.await.unwrap(), 1);
        queue.wait_idle().await;
        assert!(!queue.is_running());
    }

    #[tokio::test]
    async fn test_wait_idle_when_idle() {
        let queue = JobQueue::new("test");
        queue.wait_idle().await;
        assert!(!queue.is_running());
    }

    #[test]
    fn test_submit_outside_runtime_fails() {
        let queue = JobQueue::new("test");
        let fut = queue.submit(|| Ok(()));
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let err = runtime.block_on(fut).unwrap_err();
        assert!(matches!(err, HidError::WorkerLost { .. }));
    }
}
