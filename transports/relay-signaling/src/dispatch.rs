//! Cross-thread dispatch queue
//!
//! Work items are enqueued from any thread and executed in FIFO order by the
//! single processing context that owns the target state.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::trace;

/// Unit of work executed against the processing context's state
pub type WorkItem<T> = Box<dyn FnOnce(&mut T) + Send + 'static>;

struct QueueState<T> {
    items: VecDeque<WorkItem<T>>,
    closed: bool,
}

/// Thread-safe FIFO of work items for a single consumer
///
/// The closed flag lives under the same lock as the items, so an item is
/// either queued before `close()` (and dropped by it) or rejected.
pub struct DispatchQueue<T> {
    state: Mutex<QueueState<T>>,
}

impl<T> Default for DispatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DispatchQueue<T> {
    /// Create an empty, open queue
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
        }
    }

    /// Append a work item
    ///
    /// Returns false if the queue is closed; the item is dropped immediately,
    /// which resolves any completion it captured with `Error::Shutdown`.
    pub fn enqueue<F>(&self, item: F) -> bool
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        let item: WorkItem<T> = Box::new(item);
        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            // Dropped outside the lock
            drop(item);
            return false;
        }
        state.items.push_back(item);
        true
    }

    /// Execute every item queued at the time of the call, in order
    ///
    /// Must only be called from the processing context. Items enqueued while
    /// the batch runs are left for the next drain.
    pub fn drain_and_execute(&self, target: &mut T) -> usize {
        let batch = std::mem::take(&mut self.state.lock().items);
        let count = batch.len();
        for item in batch {
            item(target);
        }
        if count > 0 {
            trace!("Executed {} dispatched work items", count);
        }
        count
    }

    /// Run `f` on the processing context and block the calling thread until it returns
    ///
    /// Blocks only on a per-call one-shot. Must not be called from the processing
    /// context itself or from inside an async runtime.
    pub fn call_blocking<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut T) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue(move |target| {
            let _ = tx.send(f(target));
        });
        rx.blocking_recv().map_err(|_| Error::Shutdown)
    }

    /// Async variant of [`call_blocking`](Self::call_blocking)
    pub async fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut T) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue(move |target| {
            let _ = tx.send(f(target));
        });
        rx.await.map_err(|_| Error::Shutdown)
    }

    /// Reject further work and drop everything still queued
    pub fn close(&self) {
        let dropped = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.items)
        };
        drop(dropped);
    }

    /// Whether the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}
