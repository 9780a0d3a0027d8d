//! Serial operation queue.
//!
//! A single worker thread owns the queue state and runs submitted tasks one at
//! a time, strictly in submission order. Every task runs to completion before
//! the next one starts. Errors and panics inside a task are routed to that
//! task's [`Pending`] result; the worker keeps going.

use crate::error::{Error, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

type Task<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Submission side of the queue. Cheap to clone; all clones feed the same
/// worker.
pub struct SerialQueue<S> {
    tx: mpsc::Sender<Task<S>>,
    next_seq: Arc<AtomicU64>,
}

impl<S> Clone for SerialQueue<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            next_seq: Arc::clone(&self.next_seq),
        }
    }
}

impl<S: Send + 'static> SerialQueue<S> {
    /// Spawn the worker thread, handing it ownership of `state`.
    ///
    /// The worker exits once every [`SerialQueue`] clone is dropped and the
    /// remaining tasks have run.
    pub fn start(name: &str, state: S) -> Result<(Self, QueueWorker)> {
        let (tx, rx) = mpsc::channel::<Task<S>>();
        let join_handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let mut state = state;
                while let Ok(task) = rx.recv() {
                    task(&mut state);
                }
                tracing::debug!("operation queue drained, worker exiting");
            })
            .map_err(|e| Error::Io(format!("failed to spawn queue worker: {e}")))?;

        let queue = Self {
            tx,
            next_seq: Arc::new(AtomicU64::new(0)),
        };
        let worker = QueueWorker {
            join_handle: Some(join_handle),
        };
        Ok((queue, worker))
    }

    /// Queue `work` behind everything already submitted. Never blocks; the
    /// outcome arrives through the returned [`Pending`].
    pub fn submit<T, F>(&self, work: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> Result<T> + Send + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = mpsc::sync_channel(1);
        let task: Task<S> = Box::new(move |state| {
            tracing::trace!(seq, "running queued task");
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(state)))
                .unwrap_or_else(|payload| {
                    let msg = panic_message(payload.as_ref());
                    tracing::error!(seq, panic = %msg, "queued task panicked");
                    Err(Error::TaskPanicked(msg))
                });
            // The caller may have dropped its Pending; nobody to tell then.
            let _ = done_tx.send(outcome);
        });
        // A closed queue drops the task, and with it `done_tx`, so the
        // Pending resolves to QueueClosed.
        let _ = self.tx.send(task);
        Pending { rx: done_rx }
    }
}

/// Result of a queued task that may not have run yet.
#[must_use = "a Pending does nothing unless waited on"]
pub struct Pending<T> {
    rx: mpsc::Receiver<Result<T>>,
}

impl<T> Pending<T> {
    /// Block until the task has run and return its outcome.
    pub fn wait(self) -> Result<T> {
        self.rx.recv().map_err(|_| Error::QueueClosed)?
    }
}

impl<T> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending").finish_non_exhaustive()
    }
}

/// Owns the worker thread. Joins it on drop, after the queue has drained.
///
/// Drop every [`SerialQueue`] handle first, or the join never returns.
pub struct QueueWorker {
    join_handle: Option<thread::JoinHandle<()>>,
}

impl Drop for QueueWorker {
    fn drop(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.join();
        }
    }
}

impl std::fmt::Debug for QueueWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueWorker")
            .field("running", &self.join_handle.is_some())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
