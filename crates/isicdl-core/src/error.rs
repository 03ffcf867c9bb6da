//! Error type shared by every pipeline stage

use std::path::PathBuf;

use crate::stream::StreamError;

/// Error from any stage of a download run.
///
/// Page-level variants (`Transport`, `Decode`) are always fatal since a
/// broken page breaks the cursor chain. Record-level variants
/// (`RetriesExhausted`, `Storage`) are fatal or isolated depending on the
/// pool's [`FailurePolicy`](crate::pool::FailurePolicy).
#[derive(Debug)]
pub enum PipelineError {
    /// Request could not be completed
    Transport { url: String, source: StreamError },
    /// Response body is not a well-formed catalog page
    Decode { url: String, message: String },
    /// Filesystem create/write failure
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Every download attempt for one record failed
    RetriesExhausted {
        id: String,
        attempts: u32,
        last: StreamError,
    },
    /// Dispatch target queue has no consumer left
    QueueClosed { queue: usize },
    /// Index row could not be written
    Index(csv::Error),
    /// Append after the index was closed
    SinkClosed,
    /// Worker thread panicked
    WorkerPanicked { worker: usize },
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport { url, source } => write!(f, "transport: {url}: {source}"),
            Self::Decode { url, message } => write!(f, "decode: {url}: {message}"),
            Self::Storage { path, source } => write!(f, "storage: {}: {source}", path.display()),
            Self::RetriesExhausted { id, attempts, last } => {
                write!(f, "{id}: download failed after {attempts} attempts: {last}")
            }
            Self::QueueClosed { queue } => write!(f, "queue {queue} is closed"),
            Self::Index(e) => write!(f, "index: {e}"),
            Self::SinkClosed => write!(f, "index already closed"),
            Self::WorkerPanicked { worker } => write!(f, "worker {worker} panicked"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport { source, .. } => Some(source),
            Self::Storage { source, .. } => Some(source),
            Self::RetriesExhausted { last, .. } => Some(last),
            Self::Index(e) => Some(e),
            _ => None,
        }
    }
}

impl PipelineError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Whether the error concerns a single record rather than the whole run
    pub fn is_record_level(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. } | Self::Storage { .. })
    }
}
