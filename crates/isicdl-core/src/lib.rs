//! isicdl core - concurrent download pipeline infrastructure
//!
//! Source-agnostic building blocks: a sync HTTP transport, fixed-budget
//! retry, bounded per-worker queues with round-robin dispatch, a worker
//! pool, drain detection and an append-only CSV index.

pub mod completion;
pub mod error;
pub mod logging;
pub mod pool;
pub mod progress;
pub mod retry;
pub mod sink;
pub mod stream;
pub mod work_queue;

// Re-exports for convenience
pub use completion::{Completion, CompletionDetector, DEFAULT_POLL_INTERVAL, RunState};
pub use error::PipelineError;
pub use logging::{IndicatifLogger, Verbosity, init_logging};
pub use pool::{FailedRecord, FailurePolicy, Handler, PoolReport, WorkItem, WorkerPool};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy, retry};
pub use sink::{IndexEntry, IndexSink, write_failed};
pub use stream::{DEFAULT_REQUEST_TIMEOUT, Fetch, HttpFetcher, SHARED_RUNTIME, StreamError};
pub use work_queue::{DEFAULT_QUEUE_CAPACITY, Dispatcher, QueueReceiver, work_queues};
