//! Ordered, non-blocking hand-off of persistence work to a dedicated
//! worker thread.
//!
//! The frame loop only ever calls [`SinkHandle::submit`], which never blocks:
//! a full or closed queue drops the task with a log line. Delivery is
//! at-most-once and strictly FIFO. The worker opens the store itself, so a
//! store that cannot be opened disables persistence without touching the
//! frame loop.

use crate::store::{Store, StoreError};
use cafewatch_core::PersistOp;
use chrono::{DateTime, Utc};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// A queued operation with the time it was submitted.
#[derive(Debug, Clone)]
struct SinkTask {
    op: PersistOp,
    submitted_at: DateTime<Utc>,
}

enum SinkMessage {
    Task(SinkTask),
    /// Stop after everything queued before it has been applied.
    Shutdown,
}

/// Clone-safe submission handle for other threads.
#[derive(Clone)]
pub struct SinkHandle {
    tx: mpsc::Sender<SinkMessage>,
}

impl SinkHandle {
    /// Queue an operation without blocking. Returns false if it was dropped.
    pub fn submit(&self, op: PersistOp) -> bool {
        let task = SinkTask {
            op,
            submitted_at: Utc::now(),
        };
        match self.tx.try_send(SinkMessage::Task(task)) {
            Ok(()) => true,
            Err(TrySendError::Full(SinkMessage::Task(task))) => {
                tracing::warn!(op = ?task.op, "event sink queue full, task dropped");
                false
            }
            Err(_) => {
                tracing::debug!("event sink closed, task dropped");
                false
            }
        }
    }
}

pub struct EventSink {
    handle: Option<SinkHandle>,
    done: std_mpsc::Receiver<()>,
    worker: Option<JoinHandle<()>>,
}

impl EventSink {
    /// Start the worker thread. `open` runs on the worker.
    pub fn spawn<S, F>(open: F, capacity: usize) -> Self
    where
        S: Store,
        F: FnOnce() -> Result<S, StoreError> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<SinkMessage>(capacity.max(1));
        let (done_tx, done) = std_mpsc::channel();

        let worker = std::thread::Builder::new()
            .name("cafewatch-sink".into())
            .spawn(move || {
                let mut store = match open() {
                    Ok(store) => store,
                    Err(e) => {
                        tracing::error!(error = %e, "store unavailable, persistence disabled");
                        let _ = done_tx.send(());
                        return;
                    }
                };
                tracing::info!("event sink worker started");

                let mut applied = 0u64;
                let mut failed = 0u64;
                while let Some(msg) = rx.blocking_recv() {
                    let task = match msg {
                        SinkMessage::Task(task) => task,
                        SinkMessage::Shutdown => break,
                    };
                    match store.apply(&task.op, task.submitted_at) {
                        Ok(()) => applied += 1,
                        Err(e) => {
                            failed += 1;
                            tracing::warn!(error = %e, op = ?task.op, "persistence task dropped");
                        }
                    }
                }

                tracing::info!(applied, failed, "event sink worker exiting");
                let _ = done_tx.send(());
            })
            .expect("failed to spawn event sink thread");

        Self {
            handle: Some(SinkHandle { tx }),
            done,
            worker: Some(worker),
        }
    }

    pub fn handle(&self) -> Option<SinkHandle> {
        self.handle.clone()
    }

    pub fn submit(&self, op: PersistOp) -> bool {
        self.handle.as_ref().is_some_and(|h| h.submit(op))
    }

    /// Signal the worker to drain and stop, waiting at most `timeout`.
    ///
    /// Tasks submitted through any handle before this call are applied
    /// first. Returns true if the worker finished in time; otherwise the
    /// thread is left detached and tasks still queued are lost.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        if let Some(handle) = self.handle.take() {
            // With no other handles alive, closing the channel stops the
            // worker even when the sentinel does not fit.
            let _ = handle.tx.try_send(SinkMessage::Shutdown);
        }

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if let Some(worker) = self.worker.take() {
                    if worker.join().is_err() {
                        tracing::error!("event sink worker panicked");
                    }
                }
                true
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "event sink did not drain in time");
                false
            }
        }
    }
}
