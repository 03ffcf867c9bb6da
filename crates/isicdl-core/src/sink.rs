//! Label index sink: append-only CSV shared by all workers

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::error::PipelineError;
use crate::pool::FailedRecord;

/// One `(id, label)` row of the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry<'a> {
    pub id: &'a str,
    pub label: &'a str,
}

struct SinkState<W: Write> {
    writer: Option<csv::Writer<W>>,
    rows: usize,
}

/// Serialized CSV writer, no header row.
///
/// Each append is flushed so an aborted run leaves every accepted row on
/// disk. Row order across workers is unspecified.
pub struct IndexSink<W: Write = File> {
    state: Mutex<SinkState<W>>,
}

impl<W: Write> std::fmt::Debug for IndexSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSink")
            .field("rows", &self.rows())
            .finish_non_exhaustive()
    }
}

impl IndexSink<File> {
    /// Create (or truncate) the index file at `path`
    pub fn create(path: &Path) -> Result<Self, PipelineError> {
        let file = File::create(path).map_err(|e| PipelineError::storage(path, e))?;
        Ok(Self::from_writer(file))
    }
}

impl<W: Write> IndexSink<W> {
    pub fn from_writer(writer: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        Self {
            state: Mutex::new(SinkState {
                writer: Some(writer),
                rows: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState<W>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write one row. Fails once the sink has been closed.
    pub fn append(&self, entry: IndexEntry<'_>) -> Result<(), PipelineError> {
        let mut state = self.lock();
        let writer = state.writer.as_mut().ok_or(PipelineError::SinkClosed)?;
        writer
            .write_record([entry.id, entry.label])
            .map_err(PipelineError::Index)?;
        writer
            .flush()
            .map_err(|e| PipelineError::Index(e.into()))?;
        state.rows += 1;
        Ok(())
    }

    /// Rows written so far
    pub fn rows(&self) -> usize {
        self.lock().rows
    }

    /// Flush and release the underlying writer; later appends fail.
    ///
    /// Returns the total row count. Closing twice is a no-op.
    pub fn flush_and_close(&self) -> Result<usize, PipelineError> {
        let mut state = self.lock();
        if let Some(mut writer) = state.writer.take() {
            writer
                .flush()
                .map_err(|e| PipelineError::Index(e.into()))?;
        }
        Ok(state.rows)
    }
}

/// Write dead-letter entries as `(id, error)` rows
pub fn write_failed(path: &Path, failed: &[FailedRecord]) -> Result<(), PipelineError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(PipelineError::Index)?;
    for record in failed {
        writer
            .write_record([record.id.as_str(), record.error.as_str()])
            .map_err(PipelineError::Index)?;
    }
    writer.flush().map_err(|e| PipelineError::storage(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn entry<'a>(id: &'a str, label: &'a str) -> IndexEntry<'a> {
        IndexEntry { id, label }
    }

    #[test]
    fn rows_without_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.csv");
        let sink = IndexSink::create(&path).unwrap();

        sink.append(entry("a", "mel")).unwrap();
        sink.append(entry("b", "nv")).unwrap();
        assert_eq!(sink.flush_and_close().unwrap(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a,mel\nb,nv\n");
    }

    #[test]
    fn quotes_special_characters() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.csv");
        let sink = IndexSink::create(&path).unwrap();

        sink.append(entry("c", "seborrheic keratosis, irritated"))
            .unwrap();
        sink.append(entry("d", "")).unwrap();
        sink.flush_and_close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "c,\"seborrheic keratosis, irritated\"\nd,\n");
    }

    #[test]
    fn rows_visible_before_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.csv");
        let sink = IndexSink::create(&path).unwrap();
        sink.append(entry("a", "mel")).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,mel\n");
    }

    #[test]
    fn append_after_close_fails() {
        let sink = IndexSink::from_writer(Vec::new());
        sink.append(entry("a", "mel")).unwrap();
        assert_eq!(sink.flush_and_close().unwrap(), 1);
        assert!(matches!(
            sink.append(entry("b", "nv")),
            Err(PipelineError::SinkClosed)
        ));
        // second close is a no-op
        assert_eq!(sink.flush_and_close().unwrap(), 1);
    }

    #[test]
    fn concurrent_appends_each_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.csv");
        let sink = Arc::new(IndexSink::create(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("{t}-{i}");
                        sink.append(entry(&id, "nv")).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sink.flush_and_close().unwrap(), 400);

        let content = std::fs::read_to_string(&path).unwrap();
        let mut ids: Vec<&str> = content
            .lines()
            .map(|l| l.split(',').next().unwrap())
            .collect();
        assert_eq!(ids.len(), 400);
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 400);
    }

    #[test]
    fn dead_letters_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failed.csv");
        let failed = vec![FailedRecord {
            id: "x".to_string(),
            error: "x: download failed after 5 attempts: HTTP 404: Not Found".to_string(),
        }];
        write_failed(&path, &failed).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "x,x: download failed after 5 attempts: HTTP 404: Not Found\n"
        );
    }
}
