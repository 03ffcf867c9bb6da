//! Fixed pool of workers, one dedicated thread per queue

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::PipelineError;
use crate::work_queue::QueueReceiver;

/// Unit of work carried through the queues
pub trait WorkItem: Send + 'static {
    /// Identifier used in logs and dead-letter entries
    fn id(&self) -> &str;
}

/// Per-item processing, shared by every worker
pub trait Handler<T>: Send + Sync + 'static {
    fn handle(&self, worker: usize, item: &T) -> Result<(), PipelineError>;
}

impl<T, F> Handler<T> for F
where
    F: Fn(usize, &T) -> Result<(), PipelineError> + Send + Sync + 'static,
{
    fn handle(&self, worker: usize, item: &T) -> Result<(), PipelineError> {
        self(worker, item)
    }
}

/// What a worker does when an item fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// First failure aborts the whole run
    #[default]
    Abort,
    /// Log, dead-letter the item, keep going
    Skip,
}

impl FailurePolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "abort" => Some(Self::Abort),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Skip => "skip",
        }
    }
}

/// Dead-letter entry for an item that failed under [`FailurePolicy::Skip`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRecord {
    pub id: String,
    pub error: String,
}

/// Aggregated outcome of all workers
#[derive(Debug, Default)]
pub struct PoolReport {
    pub processed: usize,
    pub failed: Vec<FailedRecord>,
    /// First fatal error observed (abort policy or panic)
    pub fatal: Option<PipelineError>,
}

impl PoolReport {
    fn merge(&mut self, other: PoolReport) {
        self.processed += other.processed;
        self.failed.extend(other.failed);
        if let Some(e) = other.fatal {
            if self.fatal.is_none() {
                self.fatal = Some(e);
            } else {
                log::debug!("additional fatal error: {e}");
            }
        }
    }
}

/// Running workers
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<PoolReport>>,
}

impl WorkerPool {
    /// Spawn one thread per queue. Each thread consumes only its own queue.
    pub fn spawn<T, H>(
        queues: Vec<QueueReceiver<T>>,
        handler: Arc<H>,
        policy: FailurePolicy,
    ) -> std::io::Result<Self>
    where
        T: WorkItem,
        H: Handler<T>,
    {
        let handles = queues
            .into_iter()
            .map(|queue| {
                let handler = handler.clone();
                std::thread::Builder::new()
                    .name(format!("worker-{}", queue.index()))
                    .spawn(move || run_worker(queue, handler.as_ref(), policy))
            })
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit. Queues must be closed first.
    pub fn join(self) -> PoolReport {
        let mut report = PoolReport::default();
        for (worker, handle) in self.handles.into_iter().enumerate() {
            match handle.join() {
                Ok(r) => report.merge(r),
                Err(_) => {
                    log::error!("worker {worker} panicked");
                    report.merge(PoolReport {
                        fatal: Some(PipelineError::WorkerPanicked { worker }),
                        ..PoolReport::default()
                    });
                }
            }
        }
        report
    }
}

fn run_worker<T: WorkItem, H: Handler<T>>(
    queue: QueueReceiver<T>,
    handler: &H,
    policy: FailurePolicy,
) -> PoolReport {
    let worker = queue.index();
    let mut report = PoolReport::default();

    while let Some(item) = queue.recv() {
        if queue.state().is_aborted() {
            break;
        }
        let result = catch_unwind(AssertUnwindSafe(|| handler.handle(worker, &item)));
        queue.done();

        let result = match result {
            Ok(result) => result,
            Err(payload) => {
                log::error!(
                    "{}: worker {worker} panicked: {}",
                    item.id(),
                    panic_message(&*payload)
                );
                queue.state().abort();
                report.fatal = Some(PipelineError::WorkerPanicked { worker });
                break;
            }
        };

        match result {
            Ok(()) => report.processed += 1,
            Err(e) => match policy {
                FailurePolicy::Skip => {
                    log::error!("{}: skipped: {e}", item.id());
                    report.failed.push(FailedRecord {
                        id: item.id().to_string(),
                        error: e.to_string(),
                    });
                }
                FailurePolicy::Abort => {
                    log::error!("{}: aborting run: {e}", item.id());
                    queue.state().abort();
                    report.fatal = Some(e);
                    break;
                }
            },
        }
    }

    log::debug!(
        "worker {worker} exiting: {} processed, {} failed",
        report.processed,
        report.failed.len()
    );
    report
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamError;
    use crate::work_queue::work_queues;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Job(String);

    impl WorkItem for Job {
        fn id(&self) -> &str {
            &self.0
        }
    }

    fn job(id: &str) -> Job {
        Job(id.to_string())
    }

    fn exhausted(id: &str) -> PipelineError {
        PipelineError::RetriesExhausted {
            id: id.to_string(),
            attempts: 1,
            last: StreamError::status(500, None),
        }
    }

    #[test]
    fn each_queue_consumed_by_its_own_worker() {
        let (mut dispatcher, queues) = work_queues::<Job>(3, 16);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handler = {
            let seen = seen.clone();
            move |worker: usize, item: &Job| -> Result<(), PipelineError> {
                seen.lock().unwrap().push((worker, item.0.clone()));
                Ok(())
            }
        };
        let pool = WorkerPool::spawn(queues, Arc::new(handler), FailurePolicy::Abort).unwrap();
        assert_eq!(pool.len(), 3);

        for i in 0..9 {
            dispatcher.dispatch(job(&i.to_string())).unwrap();
        }
        dispatcher.close();
        let report = pool.join();

        assert_eq!(report.processed, 9);
        assert!(report.failed.is_empty());
        assert!(report.fatal.is_none());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 9);
        for (worker, id) in seen.iter() {
            let n: usize = id.parse().unwrap();
            assert_eq!(n % 3, *worker);
        }
        // FIFO per worker
        for worker in 0..3 {
            let ids: Vec<usize> = seen
                .iter()
                .filter(|(w, _)| *w == worker)
                .map(|(_, id)| id.parse().unwrap())
                .collect();
            let mut sorted = ids.clone();
            sorted.sort_unstable();
            assert_eq!(ids, sorted);
        }
    }

    #[test]
    fn skip_policy_dead_letters_and_continues() {
        let (mut dispatcher, queues) = work_queues::<Job>(2, 16);
        let handler = |_: usize, item: &Job| {
            if item.0 == "bad" {
                Err(exhausted("bad"))
            } else {
                Ok(())
            }
        };
        let pool = WorkerPool::spawn(queues, Arc::new(handler), FailurePolicy::Skip).unwrap();

        for id in ["a", "bad", "b", "c"] {
            dispatcher.dispatch(job(id)).unwrap();
        }
        let state = dispatcher.state().clone();
        dispatcher.close();
        let report = pool.join();

        assert_eq!(report.processed, 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, "bad");
        assert!(report.failed[0].error.contains("download failed"));
        assert!(report.fatal.is_none());
        assert!(!state.is_aborted());
        assert_eq!(state.total_outstanding(), 0);
    }

    #[test]
    fn abort_policy_raises_flag_and_stops() {
        let (mut dispatcher, queues) = work_queues::<Job>(1, 16);
        let handler = |_: usize, item: &Job| {
            if item.0 == "bad" {
                Err(exhausted("bad"))
            } else {
                Ok(())
            }
        };
        for id in ["a", "bad", "never"] {
            dispatcher.dispatch(job(id)).unwrap();
        }
        let state = dispatcher.state().clone();
        let pool = WorkerPool::spawn(queues, Arc::new(handler), FailurePolicy::Abort).unwrap();

        // worker exits on failure and drops its queue
        let report = pool.join();
        assert!(state.is_aborted());
        assert_eq!(report.processed, 1);
        assert!(matches!(
            report.fatal,
            Some(PipelineError::RetriesExhausted { .. })
        ));
        assert!(matches!(
            dispatcher.dispatch(job("late")),
            Err(PipelineError::QueueClosed { queue: 0 })
        ));
    }

    #[test]
    fn panicking_worker_reported() {
        let (mut dispatcher, queues) = work_queues::<Job>(1, 4);
        let handler = |_: usize, _: &Job| -> Result<(), PipelineError> { panic!("boom") };
        dispatcher.dispatch(job("x")).unwrap();
        let pool = WorkerPool::spawn(queues, Arc::new(handler), FailurePolicy::Abort).unwrap();
        let state = dispatcher.state().clone();
        dispatcher.close();
        let report = pool.join();
        assert!(matches!(
            report.fatal,
            Some(PipelineError::WorkerPanicked { worker: 0 })
        ));
        // a panicking item still counts as done, so the drain can finish
        assert!(state.is_aborted());
        assert_eq!(state.total_outstanding(), 0);
    }

    #[test]
    fn panic_aborts_even_under_skip_policy() {
        let (mut dispatcher, queues) = work_queues::<Job>(2, 16);
        let handler = |_: usize, item: &Job| -> Result<(), PipelineError> {
            if item.0 == "boom" {
                panic!("handler exploded on {}", item.0);
            }
            Ok(())
        };
        dispatcher.dispatch(job("boom")).unwrap();
        let state = dispatcher.state().clone();
        let pool = WorkerPool::spawn(queues, Arc::new(handler), FailurePolicy::Skip).unwrap();

        // queue 0 worker panics and exits, dropping its queue
        while !state.is_aborted() {
            std::thread::yield_now();
        }
        dispatcher.close();
        let report = pool.join();

        assert!(matches!(
            report.fatal,
            Some(PipelineError::WorkerPanicked { worker: 0 })
        ));
        assert_eq!(report.processed, 0);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn failure_policy_names() {
        assert_eq!(FailurePolicy::from_name("skip"), Some(FailurePolicy::Skip));
        assert_eq!(FailurePolicy::from_name("abort"), Some(FailurePolicy::Abort));
        assert_eq!(FailurePolicy::from_name("retry"), None);
        assert_eq!(FailurePolicy::default().name(), "abort");
    }
}
