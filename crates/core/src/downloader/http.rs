//! HTTP document fetcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::DownloadConfig;
use crate::discovery::RemoteDocumentRecord;

use super::{DocumentFetcher, FetchError};

/// Fetches document bytes from the configured URL template.
pub struct HttpFetcher {
    client: Client,
    url_template: String,
}

impl HttpFetcher {
    pub fn new(config: &DownloadConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| FetchError::NotConfigured(e.to_string()))?;

        Ok(Self {
            client,
            url_template: config.url_template.clone(),
        })
    }

    /// Resolve the download URL for a record.
    pub fn url_for(&self, record: &RemoteDocumentRecord) -> String {
        self.url_template
            .replace("{remote_id}", &urlencoding::encode(&record.remote_id))
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, record: &RemoteDocumentRecord) -> Result<Vec<u8>, FetchError> {
        let url = self.url_for(record);
        debug!(remote_id = %record.remote_id, url = %url, "Fetching document");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody(url));
        }
        Ok(bytes.to_vec())
    }
}
