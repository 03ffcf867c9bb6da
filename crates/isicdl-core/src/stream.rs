//! HTTP transport for catalog pages and image bodies.
//!
//! Uses async reqwest on a shared tokio runtime, but presents a sync
//! [`Fetch`] interface so plain worker threads can block on it.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Default per-request timeout (whole request, body included)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connect timeout, capped by the request timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error types for transport operations
#[derive(Debug)]
pub enum StreamError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Http { .. } => None,
        }
    }
}

impl StreamError {
    /// Create HTTP error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            "request timed out".to_string()
        } else if e.is_connect() {
            "connection failed".to_string()
        } else {
            e.to_string()
        };
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message,
        }
    }

    /// Error for a response that arrived with a non-success status
    pub fn status(status: u16, reason: Option<&str>) -> Self {
        Self::Http {
            status: Some(status),
            message: reason.unwrap_or("unexpected status").to_string(),
        }
    }

    /// HTTP status code, if the server answered at all
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => *status,
            Self::Io(_) => None,
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Blocking GET of a whole response body.
///
/// Implementations must treat any non-2xx status as an error.
pub trait Fetch: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, StreamError>;
}

impl<F: Fetch + ?Sized> Fetch for Arc<F> {
    fn get(&self, url: &str) -> Result<Vec<u8>, StreamError> {
        (**self).get(url)
    }
}

impl<F: Fetch + ?Sized> Fetch for &F {
    fn get(&self, url: &str) -> Result<Vec<u8>, StreamError> {
        (**self).get(url)
    }
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// [`Fetch`] over a pooled reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client whose requests are bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .pool_max_idle_per_host(32)
            .build()
            .map_err(|e| StreamError::from_reqwest(&e))?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn get(&self, url: &str) -> Result<Vec<u8>, StreamError> {
        SHARED_RUNTIME.handle().block_on(async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| StreamError::from_reqwest(&e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(StreamError::status(
                    status.as_u16(),
                    status.canonical_reason(),
                ));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| StreamError::from_reqwest(&e))?;
            Ok(body.to_vec())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn display_http_with_status() {
        let err = StreamError::status(404, Some("Not Found"));
        assert_eq!(format!("{err}"), "HTTP 404: Not Found");
    }

    #[test]
    fn display_http_without_status() {
        let err = StreamError::Http {
            status: None,
            message: "request timed out".to_string(),
        };
        assert_eq!(format!("{err}"), "HTTP error: request timed out");
    }

    #[test]
    fn display_io_error() {
        let err = StreamError::Io(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        assert!(format!("{err}").contains("IO error"));
    }

    #[test]
    fn status_without_reason() {
        let err = StreamError::status(599, None);
        assert_eq!(err.http_status(), Some(599));
        assert_eq!(format!("{err}"), "HTTP 599: unexpected status");
    }

    #[test]
    fn io_error_has_no_status() {
        let err: StreamError = io::Error::other("boom").into();
        assert_eq!(err.http_status(), None);
    }

    #[test]
    fn fetch_through_arc() {
        struct Fixed;
        impl Fetch for Fixed {
            fn get(&self, url: &str) -> Result<Vec<u8>, StreamError> {
                Ok(url.as_bytes().to_vec())
            }
        }

        let shared: Arc<dyn Fetch> = Arc::new(Fixed);
        assert_eq!(shared.get("abc").unwrap(), b"abc");
    }

    #[test]
    fn http_fetcher_builds() {
        assert!(HttpFetcher::new(Duration::from_secs(5)).is_ok());
    }
}
