//! Digit Fetchers
//!
//! TigerStyle: Providers that produce the raw digit resource body.
//!
//! A fetcher performs exactly one read of the configured resource per call.
//! Caching and deduplication live in [`crate::source::DigitSource`]; a
//! fetcher never retries on its own.

use crate::config::{Config, ResourceLocation};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Trait
// =============================================================================

/// Something that can produce the raw (un-normalized) digit resource body
#[async_trait]
pub trait DigitFetcher: Send + Sync {
    /// Read the resource once
    async fn fetch(&self) -> Result<String, FetchError>;

    /// Where this fetcher reads from, for logs
    fn describe(&self) -> String;
}

// =============================================================================
// HTTP
// =============================================================================

/// Fetches the resource with a single plain GET
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFetcher {
    /// Create a fetcher for `url` with an optional request timeout
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(FetchError::Transport)?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl DigitFetcher for HttpFetcher {
    async fn fetch(&self) -> Result<String, FetchError> {
        tracing::debug!(url = %self.url, "GET digit resource");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(FetchError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(FetchError::Transport)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

// =============================================================================
// File
// =============================================================================

/// Reads the resource from the local filesystem
#[derive(Debug, Clone)]
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    /// Create a fetcher for `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DigitFetcher for FileFetcher {
    async fn fetch(&self) -> Result<String, FetchError> {
        tracing::debug!(path = %self.path.display(), "reading digit resource");

        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| FetchError::Io {
                path: self.path.clone(),
                source,
            })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Build the fetcher matching the configured resource location
pub fn fetcher_for(config: &Config) -> Result<Arc<dyn DigitFetcher>, FetchError> {
    let fetcher: Arc<dyn DigitFetcher> = match &config.resource {
        ResourceLocation::Url(url) => Arc::new(HttpFetcher::new(url.clone(), config.fetch_timeout)?),
        ResourceLocation::Path(path) => Arc::new(FileFetcher::new(path.clone())),
    };
    Ok(fetcher)
}

// =============================================================================
// Errors
// =============================================================================

/// A single fetch attempt failed
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("resource contains no digits")]
    Empty,

    #[error("resource is not a digit string: {0}")]
    Malformed(#[from] crate::source::InvalidDigit),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_file_fetcher_reads_body() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "2718\n2818\n").unwrap();

        let fetcher = FileFetcher::new(file.path());
        let body = fetcher.fetch().await.unwrap();
        assert_eq!(body, "2718\n2818\n");
    }

    #[tokio::test]
    async fn test_file_fetcher_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FileFetcher::new(dir.path().join("missing.txt"));

        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
        assert!(err.to_string().contains("missing.txt"));
    }

    #[test]
    fn test_fetcher_for_picks_by_location() {
        let config = Config::default().with_resource("https://example.org/e-digits.txt");
        let fetcher = fetcher_for(&config).unwrap();
        assert_eq!(fetcher.describe(), "https://example.org/e-digits.txt");

        let config = Config::default().with_resource("/srv/e-digits.txt");
        let fetcher = fetcher_for(&config).unwrap();
        assert_eq!(fetcher.describe(), "/srv/e-digits.txt");
    }
}
