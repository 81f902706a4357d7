//! Per-document download step.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::backfill::ChecksumConflict;
use crate::checksum::sha256_hex;
use crate::config::DownloadConfig;
use crate::delta::DeltaItem;
use crate::discovery::RemoteDocumentRecord;
use crate::inventory::{document_filename, PARTIAL_SUFFIX};
use crate::ledger::{
    DocumentMetadata, LedgerEntry, LedgerError, LedgerStatus, LedgerStore, UpsertOutcome,
};

use super::{DocumentFetcher, FetchError};

/// Errors that abort the run. Fetch and file failures are outcomes instead.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// What happened to one discovered record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Already downloaded or backfilled; nothing was fetched.
    AlreadySatisfied {
        /// Whether missing metadata was filled in from the record.
        metadata_filled: bool,
    },
    /// Fetched, written and recorded.
    Downloaded(DeltaItem),
    /// Fetch or write failed. No file and no ledger entry were left behind.
    Failed { error: String },
    /// The ledger refused the checksum.
    Conflict(ChecksumConflict),
}

/// Downloads documents that the ledger does not yet consider satisfied.
pub struct Downloader {
    ledger: Arc<dyn LedgerStore>,
    fetcher: Arc<dyn DocumentFetcher>,
    download_dir: PathBuf,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl Downloader {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        fetcher: Arc<dyn DocumentFetcher>,
        download_dir: impl Into<PathBuf>,
        config: &DownloadConfig,
    ) -> Self {
        Self {
            ledger,
            fetcher,
            download_dir: download_dir.into(),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Final location of a record's file.
    pub fn target_path(&self, record: &RemoteDocumentRecord) -> PathBuf {
        self.download_dir.join(document_filename(record))
    }

    /// Bring one record into the ledger, fetching it only when needed.
    pub async fn download(
        &self,
        record: &RemoteDocumentRecord,
    ) -> Result<DownloadOutcome, DownloadError> {
        let metadata = DocumentMetadata::from(record);

        if let Some(existing) = self.ledger.get(&record.remote_id)? {
            if existing.is_satisfied() {
                let metadata_filled = self.fill_metadata(&existing, metadata)?;
                debug!(remote_id = %record.remote_id, "Already satisfied, skipping");
                return Ok(DownloadOutcome::AlreadySatisfied { metadata_filled });
            }
        }

        let bytes = match self.fetch_with_retry(record).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(remote_id = %record.remote_id, error = %e, "Download failed");
                return Ok(DownloadOutcome::Failed {
                    error: e.to_string(),
                });
            }
        };

        let checksum = sha256_hex(&bytes);
        let path = self.target_path(record);
        if let Err(e) = write_atomically(&path, &bytes).await {
            warn!(
                remote_id = %record.remote_id,
                path = %path.display(),
                error = %e,
                "Failed to write downloaded file"
            );
            return Ok(DownloadOutcome::Failed {
                error: e.to_string(),
            });
        }

        let entry = LedgerEntry::downloaded(&record.remote_id, &checksum, &path).with_metadata(metadata);
        match self.ledger.upsert(&entry) {
            Ok(_) => {
                info!(
                    remote_id = %record.remote_id,
                    path = %path.display(),
                    bytes = bytes.len(),
                    "Downloaded"
                );
                Ok(DownloadOutcome::Downloaded(DeltaItem {
                    remote_id: record.remote_id.clone(),
                    status: LedgerStatus::Downloaded,
                    local_path: path,
                    checksum,
                }))
            }
            Err(LedgerError::IntegrityConflict {
                remote_id,
                recorded,
                computed,
            }) => {
                error!(
                    remote_id = %remote_id,
                    recorded = %recorded,
                    computed = %computed,
                    "Downloaded bytes do not match the recorded checksum"
                );
                Ok(DownloadOutcome::Conflict(ChecksumConflict {
                    remote_id,
                    path,
                    recorded,
                    computed,
                }))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn fill_metadata(
        &self,
        existing: &LedgerEntry,
        metadata: DocumentMetadata,
    ) -> Result<bool, LedgerError> {
        let mut merged = existing.metadata.clone();
        merged.fill_missing(&metadata);
        if merged == existing.metadata {
            return Ok(false);
        }

        let patch = LedgerEntry::pending(&existing.remote_id).with_metadata(metadata);
        let outcome = self.ledger.upsert(&patch)?;
        Ok(outcome == UpsertOutcome::Updated)
    }

    async fn fetch_with_retry(&self, record: &RemoteDocumentRecord) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 1;
        loop {
            match self.fetcher.fetch(record).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < self.max_attempts => {
                    debug!(
                        remote_id = %record.remote_id,
                        attempt,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Write `bytes` to `<path>.part`, then rename it to `path`.
///
/// On failure the partial file is removed.
async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let partial = partial_path(path);

    let result = async {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = File::create(&partial).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&partial, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&partial).await;
    }
    result
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}
