//! Download run configuration

use std::path::PathBuf;
use std::time::Duration;

use isicdl_core::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_CAPACITY, DEFAULT_REQUEST_TIMEOUT,
    FailurePolicy, RetryPolicy,
};

use crate::schema::ImageVariant;
use crate::source::{DEFAULT_BASE_URL, DEFAULT_PAGE_DELAY, DEFAULT_PAGE_SIZE, seed_url};

/// Index file name inside the output root
pub const INDEX_FILE: &str = "dataset.csv";

/// Dead-letter file name inside the output root
pub const FAILED_FILE: &str = "failed.csv";

/// Default number of parallel download workers
pub const DEFAULT_WORKERS: usize = 30;

/// Runtime configuration for a download run
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the label tree and index
    pub output_dir: PathBuf,
    /// Number of workers (and queues)
    pub workers: usize,
    /// Capacity of each worker queue
    pub queue_capacity: usize,
    /// Download attempts per image
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts, `None` = retry immediately
    pub backoff: Option<Duration>,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Catalog listing endpoint
    pub base_url: String,
    /// Records per page
    pub page_size: usize,
    /// Pause between page requests
    pub page_delay: Duration,
    /// Stop after this many pages (for testing)
    pub max_pages: Option<usize>,
    /// Drain detector sampling interval
    pub poll_interval: Duration,
    /// Behaviour when a single image fails
    pub on_error: FailurePolicy,
    /// Which file of each image to download
    pub variant: ImageVariant,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data"),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: DEFAULT_PAGE_DELAY,
            max_pages: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            on_error: FailurePolicy::Abort,
            variant: ImageVariant::Thumbnail,
        }
    }
}

impl Config {
    pub fn seed_url(&self) -> String {
        seed_url(&self.base_url, self.page_size)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::fixed(self.max_attempts);
        match self.backoff {
            Some(base) if !base.is_zero() => policy.with_backoff(base),
            _ => policy,
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.output_dir.join(INDEX_FILE)
    }

    pub fn failed_path(&self) -> PathBuf {
        self.output_dir.join(FAILED_FILE)
    }
}
