//! Main runner: page loop, dispatch, drain, shutdown

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use isicdl_core::{
    Completion, CompletionDetector, Dispatcher, FailedRecord, Fetch, HttpFetcher, IndexSink,
    PipelineError, ProgressContext, WorkerPool, fmt_num, work_queues, write_failed,
};

use crate::config::Config;
use crate::schema::{CatalogPage, CatalogRecord};
use crate::source::PageSource;
use crate::store::ImageStore;

/// Pipeline execution summary
#[derive(Debug)]
pub struct Summary {
    /// Total reported by the first page
    pub catalog_count: u64,
    pub pages: usize,
    pub dispatched: u64,
    pub downloaded: usize,
    pub index_rows: usize,
    pub failed: Vec<FailedRecord>,
    pub elapsed: Duration,
}

impl Summary {
    /// Log summary for non-TTY output
    pub fn log(&self) {
        log::info!("=== Download Summary ===");
        log::info!(
            "Pages: {} ({} records of {} reported)",
            self.pages,
            fmt_num(self.dispatched),
            fmt_num(self.catalog_count)
        );
        log::info!(
            "Images: {} downloaded, {} failed",
            fmt_num(self.downloaded as u64),
            self.failed.len()
        );
        log::info!("Index rows: {}", fmt_num(self.index_rows as u64));
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());

        if self.downloaded > 0 {
            let rate = self.downloaded as f64 / self.elapsed.as_secs_f64();
            log::info!("Throughput: {rate:.1} images/sec");
        }
    }
}

/// Run a download against the live API
pub fn run(config: &Config, progress: &ProgressContext) -> Result<Summary> {
    let fetcher =
        HttpFetcher::new(config.request_timeout).context("Failed to build HTTP client")?;
    run_with(config, progress, fetcher)
}

/// Run a download with the given transport for pages and images
pub fn run_with<F: Fetch + 'static>(
    config: &Config,
    progress: &ProgressContext,
    fetcher: F,
) -> Result<Summary> {
    let start = Instant::now();
    let fetcher = Arc::new(fetcher);

    let seed = config.seed_url();
    log::info!("Fetching catalog from {seed}");
    let stage = progress.stage_line("catalog");
    stage.set_message("fetching first page...");

    let mut source = PageSource::new(fetcher.clone(), seed, config.variant, config.page_delay);
    let Some(first) = source
        .next_page()
        .context("Failed to fetch first catalog page")?
    else {
        anyhow::bail!("Catalog returned no first page");
    };
    let catalog_count = first.count;
    log::info!("Catalog reports {} images", fmt_num(catalog_count));

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.output_dir.display()
        )
    })?;
    let index = Arc::new(
        IndexSink::create(&config.index_path()).context("Failed to create index file")?,
    );

    let bar = progress.count_bar("images", catalog_count);
    let (mut dispatcher, queues) = work_queues(config.workers, config.queue_capacity);
    let state = dispatcher.state().clone();
    let store = ImageStore::new(
        config.output_dir.clone(),
        fetcher,
        config.retry_policy(),
        index.clone(),
        bar.clone(),
    );
    let pool = WorkerPool::spawn(queues, Arc::new(store), config.on_error)
        .context("Failed to spawn workers")?;
    log::info!(
        "Downloading with {} workers, {} attempts per image, on error: {}",
        pool.len(),
        config.retry_policy().max_attempts(),
        config.on_error.name()
    );

    let produced = produce(&mut source, first, &mut dispatcher, config.max_pages, &stage);
    state.finish_producing();
    stage.finish_and_clear();

    let completion = match &produced {
        Ok(_) => CompletionDetector::new(config.poll_interval).wait(&state),
        Err(_) => {
            state.abort();
            Completion::Aborted { polls: 0 }
        }
    };
    log::debug!("pipeline finished: {completion:?}");

    let dispatched = dispatcher.dispatched();
    dispatcher.close();
    let report = pool.join();
    let index_rows = index.flush_and_close().context("Failed to close index")?;

    if !report.failed.is_empty() {
        let path = config.failed_path();
        write_failed(&path, &report.failed).context("Failed to write dead-letter list")?;
        log::warn!(
            "{} images failed, see {}",
            report.failed.len(),
            path.display()
        );
    }

    if let Some(fatal) = report.fatal {
        bar.abandon();
        return Err(anyhow::Error::new(fatal).context("Download aborted"));
    }
    let pages = match produced {
        Ok(pages) => pages,
        Err(e) => {
            bar.abandon();
            return Err(anyhow::Error::new(e).context("Catalog pagination failed"));
        }
    };
    bar.finish();

    Ok(Summary {
        catalog_count,
        pages,
        dispatched,
        downloaded: report.processed,
        index_rows,
        failed: report.failed,
        elapsed: start.elapsed(),
    })
}

/// Drive the page loop, dispatching every record. Returns pages fetched.
///
/// Stops early, without error, once a worker has aborted the run.
fn produce<F: Fetch>(
    source: &mut PageSource<F>,
    first: CatalogPage,
    dispatcher: &mut Dispatcher<CatalogRecord>,
    max_pages: Option<usize>,
    stage: &ProgressBar,
) -> Result<usize, PipelineError> {
    let mut page = first;
    loop {
        let records = page.results.len();
        for record in page.results {
            if dispatcher.state().is_aborted() {
                log::warn!("Run aborted, stopping page loop");
                return Ok(source.pages_fetched());
            }
            dispatcher.dispatch(record)?;
        }

        let pages = source.pages_fetched();
        let total = fmt_num(dispatcher.dispatched());
        stage.set_message(format!("page {pages}: {total} records queued"));
        log::info!("page {pages}: {records} records ({total} queued)");

        if max_pages.is_some_and(|max| pages >= max) {
            log::info!("Stopping after {pages} pages (page limit)");
            break;
        }
        match source.next_page()? {
            Some(next) => page = next,
            None => break,
        }
    }
    Ok(source.pages_fetched())
}
