//! Sequential page source following the catalog cursor

use std::time::Duration;

use isicdl_core::{Fetch, PipelineError};

use crate::schema::{CatalogPage, ImageVariant, decode_page};

/// Public ISIC archive image listing
pub const DEFAULT_BASE_URL: &str = "https://api.isic-archive.com/api/v2/images/";

/// Records requested per page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Courtesy pause between page requests
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(40);

/// First page URL: `base_url` with the page size appended
pub fn seed_url(base_url: &str, page_size: usize) -> String {
    let sep = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{sep}limit={page_size}")
}

/// Fetches one page at a time, never more than one request in flight.
///
/// Any transport or decode failure ends pagination; there is no way to
/// skip a broken page since the cursor lives inside it.
#[derive(Debug)]
pub struct PageSource<F> {
    fetcher: F,
    variant: ImageVariant,
    delay: Duration,
    pending: Option<String>,
    pages: usize,
}

impl<F: Fetch> PageSource<F> {
    pub fn new(fetcher: F, seed: String, variant: ImageVariant, delay: Duration) -> Self {
        Self {
            fetcher,
            variant,
            delay,
            pending: Some(seed),
            pages: 0,
        }
    }

    /// GET and decode a single page
    pub fn fetch(&self, url: &str) -> Result<CatalogPage, PipelineError> {
        let body = self
            .fetcher
            .get(url)
            .map_err(|source| PipelineError::Transport {
                url: url.to_string(),
                source,
            })?;
        decode_page(url, &body, self.variant)
    }

    /// Fetch the page under the cursor; `Ok(None)` once the catalog is exhausted
    pub fn next_page(&mut self) -> Result<Option<CatalogPage>, PipelineError> {
        let Some(url) = self.pending.take() else {
            return Ok(None);
        };
        if self.pages > 0 && !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        log::debug!("fetching page {}: {url}", self.pages + 1);
        let page = self.fetch(&url)?;
        self.pages += 1;
        self.pending.clone_from(&page.next);
        Ok(Some(page))
    }

    /// Pages successfully fetched so far
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isicdl_core::StreamError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct Pages {
        bodies: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl Pages {
        fn new(bodies: &[(&str, &str)]) -> Self {
            Self {
                bodies: bodies
                    .iter()
                    .map(|(u, b)| (u.to_string(), b.to_string()))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl Fetch for Pages {
        fn get(&self, url: &str) -> Result<Vec<u8>, StreamError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.bodies
                .get(url)
                .map(|b| b.clone().into_bytes())
                .ok_or_else(|| StreamError::status(404, Some("Not Found")))
        }
    }

    const PAGE_1: &str = r#"{"count": 3, "next": "p2", "results": [
        {"isic_id": "a", "metadata": {"clinical": {"diagnosis": "mel"}}, "files": {"thumbnail_256": {"url": "ia"}}},
        {"isic_id": "b", "metadata": {"clinical": {"diagnosis": "nv"}}, "files": {"thumbnail_256": {"url": "ib"}}}
    ]}"#;
    const PAGE_2: &str = r#"{"count": 3, "next": null, "results": [
        {"isic_id": "c", "metadata": {"clinical": {"diagnosis": "bkl"}}, "files": {"thumbnail_256": {"url": "ic"}}}
    ]}"#;

    #[test]
    fn seed_url_appends_limit() {
        assert_eq!(
            seed_url("https://api.isic-archive.com/api/v2/images/", 100),
            "https://api.isic-archive.com/api/v2/images/?limit=100"
        );
        assert_eq!(seed_url("http://x/?q=1", 5), "http://x/?q=1&limit=5");
    }

    #[test]
    fn follows_cursor_until_exhausted() {
        let fetcher = Pages::new(&[("seed", PAGE_1), ("p2", PAGE_2)]);
        let mut source = PageSource::new(
            &fetcher,
            "seed".to_string(),
            ImageVariant::Thumbnail,
            Duration::ZERO,
        );

        let first = source.next_page().unwrap().unwrap();
        assert_eq!(first.count, 3);
        assert_eq!(first.results.len(), 2);
        assert!(!source.is_exhausted());

        let second = source.next_page().unwrap().unwrap();
        assert_eq!(second.results[0].id, "c");
        assert!(source.is_exhausted());
        assert!(source.next_page().unwrap().is_none());
        assert_eq!(source.pages_fetched(), 2);

        assert_eq!(*fetcher.requests.lock().unwrap(), vec!["seed", "p2"]);
    }

    #[test]
    fn transport_failure_is_fatal() {
        let fetcher = Pages::new(&[("seed", PAGE_1)]);
        let mut source = PageSource::new(
            &fetcher,
            "seed".to_string(),
            ImageVariant::Thumbnail,
            Duration::ZERO,
        );
        source.next_page().unwrap();
        match source.next_page() {
            Err(PipelineError::Transport { url, source }) => {
                assert_eq!(url, "p2");
                assert_eq!(source.http_status(), Some(404));
            }
            other => panic!("expected Transport, got {other:?}"),
        }
        assert!(source.is_exhausted());
    }

    #[test]
    fn decode_failure_is_fatal() {
        let fetcher = Pages::new(&[("seed", "{\"results\": 7}")]);
        let mut source = PageSource::new(
            &fetcher,
            "seed".to_string(),
            ImageVariant::Thumbnail,
            Duration::ZERO,
        );
        assert!(matches!(
            source.next_page(),
            Err(PipelineError::Decode { .. })
        ));
    }
}
