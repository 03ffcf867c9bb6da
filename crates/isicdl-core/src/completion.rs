//! Outstanding-work accounting and drain detection.
//!
//! [`RunState`] counts, per queue, the items that have been enqueued but
//! not yet fully processed (in-flight items included). The dispatcher
//! increments before sending, a worker decrements only after the item's
//! side effects are done. A zero total after the producer has stopped
//! therefore means every dispatched record has been handled.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Default interval between drain samples
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Run-wide counters shared by dispatcher, workers and detector
#[derive(Debug)]
pub struct RunState {
    outstanding: Box<[AtomicUsize]>,
    producing: AtomicBool,
    aborted: AtomicBool,
}

/// One sample of [`RunState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub outstanding: usize,
    pub producing: bool,
    pub aborted: bool,
}

impl RunState {
    pub fn new(queues: usize) -> Self {
        Self {
            outstanding: (0..queues).map(|_| AtomicUsize::new(0)).collect(),
            producing: AtomicBool::new(true),
            aborted: AtomicBool::new(false),
        }
    }

    pub fn queues(&self) -> usize {
        self.outstanding.len()
    }

    pub(crate) fn enqueued(&self, queue: usize) {
        self.outstanding[queue].fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn completed(&self, queue: usize) {
        self.outstanding[queue].fetch_sub(1, Ordering::AcqRel);
    }

    /// Items enqueued to `queue` and not yet fully processed
    pub fn outstanding(&self, queue: usize) -> usize {
        self.outstanding[queue].load(Ordering::Acquire)
    }

    /// Sum over all queues
    pub fn total_outstanding(&self) -> usize {
        self.outstanding
            .iter()
            .map(|c| c.load(Ordering::Acquire))
            .sum()
    }

    /// Producer has discovered its last record
    pub fn finish_producing(&self) {
        self.producing.store(false, Ordering::Release);
    }

    pub fn is_producing(&self) -> bool {
        self.producing.load(Ordering::Acquire)
    }

    /// Raise the run-wide abort flag (fatal record failure)
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn observe(&self) -> Observation {
        Observation {
            outstanding: self.total_outstanding(),
            producing: self.is_producing(),
            aborted: self.is_aborted(),
        }
    }
}

/// How the wait ended, with the number of samples taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Drained { polls: u64 },
    Aborted { polls: u64 },
}

/// Polls outstanding work until it reaches zero after the producer stopped
#[derive(Debug, Clone, Copy)]
pub struct CompletionDetector {
    interval: Duration,
}

impl CompletionDetector {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Block until `state` is drained or aborted
    pub fn wait(&self, state: &RunState) -> Completion {
        self.wait_with(|| state.observe())
    }

    /// Sample, sleep one interval, then decide on that sample.
    ///
    /// Completion is declared only on a sample that reads zero across all
    /// queues while the producer is exhausted.
    pub fn wait_with(&self, mut sample: impl FnMut() -> Observation) -> Completion {
        let mut polls = 0u64;
        loop {
            let obs = sample();
            polls += 1;
            if obs.aborted {
                return Completion::Aborted { polls };
            }
            log::debug!(
                "drain poll {polls}: {} outstanding{}",
                obs.outstanding,
                if obs.producing { " (still producing)" } else { "" }
            );
            std::thread::sleep(self.interval);
            if !obs.producing && obs.outstanding == 0 {
                return Completion::Drained { polls };
            }
        }
    }
}

impl Default for CompletionDetector {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}
