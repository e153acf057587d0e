//! Async channel bridge between a reader thread and the async consumer
//!
//! The poll loop runs on a dedicated OS thread and must never call consumer
//! code directly. It pushes events into a [`ReportSink`] (blocking side);
//! the consumer drains the paired [`ReportStream`] from its own task.
//! The channel is unbounded so a slow consumer never stalls the reader
//! thread and delays its abort check.

use async_channel::{Receiver, Sender, TryRecvError, unbounded};

/// Reader-thread side of the bridge (blocking)
#[derive(Debug)]
pub struct ReportSink<T> {
    tx: Sender<T>,
}

impl<T> ReportSink<T> {
    /// Hand an event to the consumer
    ///
    /// Fails only once the consumer side has been dropped.
    pub fn send(&self, event: T) -> crate::Result<()> {
        self.tx
            .send_blocking(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Whether the consumer side is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the bridge (async)
#[derive(Debug, Clone)]
pub struct ReportStream<T> {
    rx: Receiver<T>,
}

impl<T> ReportStream<T> {
    /// Receive the next event
    ///
    /// Returns `None` once the reader thread has exited and every buffered
    /// event has been consumed.
    pub async fn recv(&self) -> Option<T> {
        self.rx.recv().await.ok()
    }

    /// Receive without waiting
    pub fn try_recv(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Receive from a non-async context
    pub fn recv_blocking(&self) -> Option<T> {
        self.rx.recv_blocking().ok()
    }

    /// Whether the reader side is gone
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }

    /// Number of events waiting to be consumed
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create the channel bridge between a reader thread and its consumer
///
/// Returns (ReportSink for the thread, ReportStream for the consumer)
pub fn create_report_bridge<T>() -> (ReportSink<T>, ReportStream<T>) {
    let (tx, rx) = unbounded();
    (ReportSink { tx }, ReportStream { rx })
}
