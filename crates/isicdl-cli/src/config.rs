//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use isicdl_archive::ImageVariant;
use isicdl_archive::config::DEFAULT_WORKERS;
use isicdl_archive::source::{DEFAULT_BASE_URL, DEFAULT_PAGE_DELAY, DEFAULT_PAGE_SIZE};
use isicdl_core::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_CAPACITY, DEFAULT_REQUEST_TIMEOUT,
    FailurePolicy,
};
use serde::Deserialize;

/// Global configuration for isicdl
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub workers: WorkersConfig,
    pub http: HttpConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub count: usize,
    pub queue_capacity: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub page_size: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// 0 = retry immediately
    pub backoff_ms: u64,
    pub page_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            max_retries: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: 0,
            page_delay_ms: DEFAULT_PAGE_DELAY.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub poll_interval_ms: u64,
    /// "abort" or "skip"
    pub on_error: String,
    /// "thumbnail" or "full"
    pub variant: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            on_error: FailurePolicy::default().name().to_string(),
            variant: ImageVariant::default().name().to_string(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./isicdl.toml (current directory)
    /// 2. ~/.config/isicdl/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("isicdl.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "isicdl") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Download settings as given by the file, before command-line overrides
    pub fn download_config(&self) -> Result<isicdl_archive::Config> {
        let on_error = FailurePolicy::from_name(&self.run.on_error).with_context(|| {
            format!(
                "Invalid run.on_error {:?} (expected \"abort\" or \"skip\")",
                self.run.on_error
            )
        })?;
        let variant = ImageVariant::from_name(&self.run.variant).with_context(|| {
            format!(
                "Invalid run.variant {:?} (expected \"thumbnail\" or \"full\")",
                self.run.variant
            )
        })?;

        Ok(isicdl_archive::Config {
            output_dir: self.output.dir.clone(),
            workers: self.workers.count,
            queue_capacity: self.workers.queue_capacity,
            max_attempts: self.http.max_retries,
            backoff: millis(self.http.backoff_ms),
            request_timeout: Duration::from_secs(self.http.timeout_secs),
            base_url: self.http.base_url.clone(),
            page_size: self.http.page_size,
            page_delay: Duration::from_millis(self.http.page_delay_ms),
            max_pages: None,
            poll_interval: Duration::from_millis(self.run.poll_interval_ms),
            on_error,
            variant,
        })
    }
}

/// `0` disables backoff
pub fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
