//! Discovery of remote documents through the agency document-search API.
//!
//! A `DiscoverySource` lists agencies, then the documents each agency has
//! published, in API order. Everything the pipeline learns during one run is
//! gathered into a `DiscoverySnapshot` that is flushed once at the end of the
//! run and reused by the next run's backfill as a metadata index.

mod http;
mod snapshot;
mod types;

pub use http::HttpDiscoverySource;
pub use snapshot::{DiscoverySnapshot, MetadataIndex, SNAPSHOT_FILENAME};
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while talking to the discovery API.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Request timed out.
    #[error("Discovery request timed out")]
    Timeout,

    /// Could not connect.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// API returned a non-success status.
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Client could not be constructed.
    #[error("Client not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DiscoveryError::Timeout
        } else if e.is_connect() {
            DiscoveryError::ConnectionFailed(e.to_string())
        } else if e.is_decode() {
            DiscoveryError::ParseError(e.to_string())
        } else {
            DiscoveryError::ApiError {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                message: e.to_string(),
            }
        }
    }
}

/// Source of remote document records.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Name of this source, for logging.
    fn name(&self) -> &str;

    /// List all agencies, in API order.
    async fn agencies(&self) -> Result<Vec<Agency>, DiscoveryError>;

    /// List the documents published for one agency, in API order.
    async fn documents(
        &self,
        agency: &Agency,
    ) -> Result<Vec<RemoteDocumentRecord>, DiscoveryError>;
}
