//! Per-record work: download with retries, file under the label, index it

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::ProgressBar;
use isicdl_core::{Fetch, Handler, IndexEntry, IndexSink, PipelineError, RetryPolicy, retry};

use crate::schema::CatalogRecord;

/// Extension of every stored image
pub const IMAGE_EXTENSION: &str = "jpg";

/// Map an arbitrary label or id to a single path component.
///
/// `%`, separators and NUL are percent-escaped, and so are the dots of
/// `.`/`..`. The mapping is injective, so distinct labels never share a
/// directory.
pub fn path_component(raw: &str) -> Cow<'_, str> {
    if raw == "." || raw == ".." {
        return Cow::Owned(raw.replace('.', "%2E"));
    }
    if !raw.contains(['%', '/', '\\', '\0']) {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            '\0' => out.push_str("%00"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Create `dir` and parents; concurrent creation by other workers is fine.
pub fn ensure_dir(dir: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::storage(dir, e))
}

/// Worker-side handler storing images under `<root>/<label>/<id>.jpg`
pub struct ImageStore<F> {
    root: PathBuf,
    fetcher: F,
    retry: RetryPolicy,
    index: Arc<IndexSink>,
    progress: ProgressBar,
}

impl<F: Fetch> ImageStore<F> {
    pub fn new(
        root: PathBuf,
        fetcher: F,
        retry: RetryPolicy,
        index: Arc<IndexSink>,
        progress: ProgressBar,
    ) -> Self {
        Self {
            root,
            fetcher,
            retry,
            index,
            progress,
        }
    }

    /// Destination of `record` on disk; an empty label files it at the root
    pub fn image_path(&self, record: &CatalogRecord) -> PathBuf {
        let file = format!("{}.{IMAGE_EXTENSION}", path_component(&record.id));
        if record.label.is_empty() {
            self.root.join(file)
        } else {
            self.root.join(path_component(&record.label).as_ref()).join(file)
        }
    }

    /// Download, write, index and tick progress for one record.
    ///
    /// The index row is appended only after the file is on disk.
    pub fn store(&self, record: &CatalogRecord) -> Result<PathBuf, PipelineError> {
        let bytes = retry(&record.id, &self.retry, |_| self.fetcher.get(&record.url))?;

        let path = self.image_path(record);
        if let Some(dir) = path.parent() {
            ensure_dir(dir)?;
        }
        std::fs::write(&path, &bytes).map_err(|e| PipelineError::storage(&path, e))?;

        self.index.append(IndexEntry {
            id: &record.id,
            label: &record.label,
        })?;
        self.progress.inc(1);
        log::debug!("{}: {} bytes -> {}", record.id, bytes.len(), path.display());
        Ok(path)
    }
}

impl<F: Fetch + 'static> Handler<CatalogRecord> for ImageStore<F> {
    fn handle(&self, _worker: usize, item: &CatalogRecord) -> Result<(), PipelineError> {
        self.store(item).map(|_| ())
    }
}
