//! isicdl archive - ISIC catalog downloader
//!
//! Walks the paginated image listing of the ISIC archive, spreads records
//! round-robin over a fixed pool of download workers, and files every
//! image under `<root>/<diagnosis>/<isic_id>.jpg` with a `dataset.csv`
//! index of `(id, label)` rows.
//!
//! # Example
//!
//! ```no_run
//! use isicdl_archive::{Config, run};
//! use isicdl_core::ProgressContext;
//!
//! let config = Config {
//!     workers: 8,
//!     max_pages: Some(1),
//!     ..Default::default()
//! };
//!
//! let summary = run(&config, &ProgressContext::hidden()).expect("Download failed");
//! println!("Downloaded {} images", summary.downloaded);
//! ```

pub mod config;
pub mod runner;
pub mod schema;
pub mod source;
pub mod store;

// Re-exports for convenience
pub use config::Config;
pub use runner::{Summary, run, run_with};
pub use schema::{CatalogPage, CatalogRecord, ImageVariant};
pub use source::PageSource;
pub use store::ImageStore;
