//! Bounded per-worker queues with round-robin dispatch.
//!
//! Each worker owns exactly one queue. The [`Dispatcher`] is the only
//! producer and assigns items by a rotating cursor that lives for the
//! whole run, so page boundaries never skew the distribution.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

use crate::completion::RunState;
use crate::error::PipelineError;

/// Default queue capacity, large enough that normal runs never block
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Build `workers` queues of `capacity` items each.
///
/// Returns the single producer handle and one consumer per queue, in
/// queue order.
pub fn work_queues<T>(workers: usize, capacity: usize) -> (Dispatcher<T>, Vec<QueueReceiver<T>>) {
    let workers = workers.max(1);
    let capacity = capacity.max(1);
    let state = Arc::new(RunState::new(workers));

    let (senders, receivers): (Vec<_>, Vec<_>) = (0..workers)
        .map(|index| {
            let (tx, rx) = sync_channel(capacity);
            let receiver = QueueReceiver {
                index,
                rx,
                state: state.clone(),
            };
            (tx, receiver)
        })
        .unzip();

    let dispatcher = Dispatcher {
        senders,
        cursor: 0,
        dispatched: 0,
        state,
    };
    (dispatcher, receivers)
}

/// Producer side: owns every queue's sender and the rotation cursor
pub struct Dispatcher<T> {
    senders: Vec<SyncSender<T>>,
    cursor: usize,
    dispatched: u64,
    state: Arc<RunState>,
}

impl<T> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("queues", &self.senders.len())
            .field("cursor", &self.cursor)
            .field("dispatched", &self.dispatched)
            .finish_non_exhaustive()
    }
}

impl<T> Dispatcher<T> {
    /// Send `item` to the queue under the cursor, then advance it.
    ///
    /// Blocks while that queue is full. Returns the queue index used.
    pub fn dispatch(&mut self, item: T) -> Result<usize, PipelineError> {
        let target = self.cursor;
        self.state.enqueued(target);
        if self.senders[target].send(item).is_err() {
            self.state.completed(target);
            return Err(PipelineError::QueueClosed { queue: target });
        }
        self.cursor = (target + 1) % self.senders.len();
        self.dispatched += 1;
        Ok(target)
    }

    /// Number of queues
    pub fn queues(&self) -> usize {
        self.senders.len()
    }

    /// Total items dispatched so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    /// Close every queue. Workers exit once their queue is drained.
    pub fn close(self) {
        log::debug!("closing {} queues", self.senders.len());
    }
}

/// Consumer side of one queue
pub struct QueueReceiver<T> {
    index: usize,
    rx: Receiver<T>,
    state: Arc<RunState>,
}

impl<T> QueueReceiver<T> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Block for the next item; `None` once closed and drained
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Mark one received item as fully processed
    pub fn done(&self) {
        self.state.completed(self.index);
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }
}
