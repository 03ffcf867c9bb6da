//! Fetch subcommand - download the ISIC image catalog

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, ValueEnum};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use isicdl_archive::{ImageVariant, Summary};
use isicdl_core::{FailurePolicy, SharedProgress, fmt_num};

use crate::config::{Config, millis};

#[derive(Args, Debug, Default)]
pub struct FetchArgs {
    /// Output directory for label folders and dataset.csv
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Number of parallel download workers
    #[arg(short = 'n', long)]
    pub workers: Option<usize>,

    /// Download attempts per image
    #[arg(short, long)]
    pub retries: Option<u32>,

    /// Records requested per catalog page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Stop after this many catalog pages
    #[arg(short = 'l', long)]
    pub max_pages: Option<usize>,

    /// What to do when an image cannot be downloaded
    #[arg(long, value_enum)]
    pub on_error: Option<OnError>,

    /// Which file of each image to download
    #[arg(long, value_enum)]
    pub variant: Option<Variant>,

    /// Base backoff between attempts in milliseconds (0 = none)
    #[arg(long)]
    pub backoff_ms: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Capacity of each worker queue
    #[arg(long)]
    pub queue_capacity: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum OnError {
    /// Stop the whole run on the first failed image
    Abort,
    /// Record the image in failed.csv and continue
    Skip,
}

impl From<OnError> for FailurePolicy {
    fn from(e: OnError) -> Self {
        match e {
            OnError::Abort => FailurePolicy::Abort,
            OnError::Skip => FailurePolicy::Skip,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum Variant {
    /// 256px thumbnails
    Thumbnail,
    /// Full-resolution originals
    Full,
}

impl From<Variant> for ImageVariant {
    fn from(v: Variant) -> Self {
        match v {
            Variant::Thumbnail => ImageVariant::Thumbnail,
            Variant::Full => ImageVariant::Full,
        }
    }
}

/// Merge command-line flags over the file configuration
pub fn resolve(args: FetchArgs, config: &Config) -> Result<isicdl_archive::Config> {
    let mut download = config.download_config()?;

    if let Some(path) = args.path {
        download.output_dir = path;
    }
    if let Some(workers) = args.workers {
        download.workers = workers;
    }
    if let Some(retries) = args.retries {
        download.max_attempts = retries;
    }
    if let Some(page_size) = args.page_size {
        download.page_size = page_size;
    }
    if let Some(on_error) = args.on_error {
        download.on_error = on_error.into();
    }
    if let Some(variant) = args.variant {
        download.variant = variant.into();
    }
    if let Some(backoff_ms) = args.backoff_ms {
        download.backoff = millis(backoff_ms);
    }
    if let Some(timeout) = args.timeout {
        download.request_timeout = Duration::from_secs(timeout);
    }
    if let Some(capacity) = args.queue_capacity {
        download.queue_capacity = capacity;
    }
    download.max_pages = args.max_pages;

    if download.workers == 0 {
        anyhow::bail!("--workers must be at least 1");
    }
    if download.page_size == 0 {
        anyhow::bail!("--page-size must be at least 1");
    }
    if download.max_attempts == 0 {
        log::warn!("--retries 0 treated as a single attempt");
    }
    Ok(download)
}

pub fn run(args: FetchArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let download = resolve(args, config)?;

    log::info!("Fetching ISIC archive ({} images)", download.variant.name());
    log::info!("  Output: {}", download.output_dir.display());
    log::info!("  Workers: {}", download.workers);

    let summary = isicdl_archive::run(&download, progress)?;

    if progress.is_tty() {
        print_summary(&summary);
    } else {
        summary.log();
    }

    if !summary.failed.is_empty() {
        anyhow::bail!(
            "{} images failed (see {})",
            summary.failed.len(),
            download.failed_path().display()
        );
    }

    Ok(())
}

/// Print a key-value summary table on stderr
fn print_summary(summary: &Summary) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("ISIC").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let rows = [
        (
            "Pages",
            format!(
                "{} ({} of {} records)",
                summary.pages,
                fmt_num(summary.dispatched),
                fmt_num(summary.catalog_count)
            ),
        ),
        (
            "Images",
            format!(
                "{} ({} failed)",
                fmt_num(summary.downloaded as u64),
                summary.failed.len()
            ),
        ),
        ("Index rows", fmt_num(summary.index_rows as u64)),
        ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}
