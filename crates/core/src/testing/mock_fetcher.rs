//! Mock document fetcher for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::discovery::RemoteDocumentRecord;
use crate::downloader::{DocumentFetcher, FetchError};

/// Mock implementation of the DocumentFetcher trait.
///
/// Serves `%PDF-1.4 <remote_id>` unless other bytes were configured, and
/// records every fetch attempt.
#[derive(Debug, Default)]
pub struct MockFetcher {
    bodies: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    failing: Arc<RwLock<HashSet<String>>>,
    fetched: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes the mock serves for a remote id when none were configured.
    pub fn default_body(remote_id: &str) -> Vec<u8> {
        format!("%PDF-1.4 {}", remote_id).into_bytes()
    }

    pub async fn set_body(&self, remote_id: &str, bytes: Vec<u8>) {
        self.bodies.write().await.insert(remote_id.to_string(), bytes);
    }

    /// Make every fetch of this remote id fail.
    pub async fn fail_for(&self, remote_id: &str) {
        self.failing.write().await.insert(remote_id.to_string());
    }

    /// Undo [`fail_for`](Self::fail_for).
    pub async fn succeed_for(&self, remote_id: &str) {
        self.failing.write().await.remove(remote_id);
    }

    /// Remote ids requested so far, one entry per attempt.
    pub async fn fetched(&self) -> Vec<String> {
        self.fetched.read().await.clone()
    }

    pub async fn fetch_count(&self) -> usize {
        self.fetched.read().await.len()
    }

    pub async fn clear_fetched(&self) {
        self.fetched.write().await.clear();
    }
}

#[async_trait]
impl DocumentFetcher for MockFetcher {
    async fn fetch(&self, record: &RemoteDocumentRecord) -> Result<Vec<u8>, FetchError> {
        self.fetched.write().await.push(record.remote_id.clone());

        if self.failing.read().await.contains(&record.remote_id) {
            return Err(FetchError::Http {
                status: 503,
                url: format!("mock://{}", record.remote_id),
            });
        }
        Ok(self
            .bodies
            .read()
            .await
            .get(&record.remote_id)
            .cloned()
            .unwrap_or_else(|| Self::default_body(&record.remote_id)))
    }
}
