//! Fetching and persisting individual documents.
//!
//! The `Downloader` consults the ledger before every fetch: a satisfied
//! document is never requested again. Bytes land in `<name>.part` first and
//! are renamed into place before the ledger entry is committed.

mod http;
mod runner;

pub use http::HttpFetcher;
pub use runner::{DownloadError, DownloadOutcome, Downloader};

use async_trait::async_trait;
use thiserror::Error;

use crate::discovery::RemoteDocumentRecord;

/// Errors that can occur while retrieving document bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request timed out.
    #[error("Download timed out")]
    Timeout,

    /// Could not connect.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    /// Server answered with no bytes.
    #[error("Empty response body for {0}")]
    EmptyBody(String),

    /// Any other request failure.
    #[error("Request failed: {0}")]
    Request(String),

    /// Client could not be constructed.
    #[error("Fetcher not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() {
            FetchError::ConnectionFailed(e.to_string())
        } else {
            FetchError::Request(e.to_string())
        }
    }
}

/// Source of document bytes.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Retrieve the raw bytes of one document.
    async fn fetch(&self, record: &RemoteDocumentRecord) -> Result<Vec<u8>, FetchError>;
}
