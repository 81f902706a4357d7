//! Types for the provenance ledger.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::delta::RunDelta;

/// Download status of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    /// Known but not yet verified on disk.
    Pending,
    /// Fetched over the network by this pipeline.
    Downloaded,
    /// Found on disk and checksummed without re-downloading.
    BackfilledFromDisk,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "pending",
            LedgerStatus::Downloaded => "downloaded",
            LedgerStatus::BackfilledFromDisk => "backfilled_from_disk",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(LedgerStatus::Pending),
            "downloaded" => Some(LedgerStatus::Downloaded),
            "backfilled_from_disk" => Some(LedgerStatus::BackfilledFromDisk),
            _ => None,
        }
    }

    /// Whether a document in this status must never be fetched again.
    pub fn is_satisfied(&self) -> bool {
        !matches!(self, LedgerStatus::Pending)
    }
}

impl std::fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote metadata carried alongside an entry for provenance.
///
/// Every field is optional: backfilled entries may be recorded before the
/// discovery API has ever described them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_body_id: Option<String>,
}

impl DocumentMetadata {
    pub fn is_empty(&self) -> bool {
        self == &DocumentMetadata::default()
    }

    /// Fill fields that are `None` here from `other`. Present values are kept.
    pub fn fill_missing(&mut self, other: &DocumentMetadata) {
        fill(&mut self.agency_id, &other.agency_id);
        fill(&mut self.agency_name, &other.agency_name);
        fill(&mut self.title, &other.title);
        fill(&mut self.created_date, &other.created_date);
        fill(&mut self.file_extension, &other.file_extension);
        fill(&mut self.content_body_id, &other.content_body_id);
    }
}

fn fill(slot: &mut Option<String>, value: &Option<String>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

/// One row of the ledger, keyed by `remote_id`.
///
/// `checksum` is present exactly when `status` is not `Pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub remote_id: String,
    pub checksum: Option<String>,
    pub local_path: Option<PathBuf>,
    pub status: LedgerStatus,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, flatten)]
    pub metadata: DocumentMetadata,
}

impl LedgerEntry {
    pub fn pending(remote_id: impl Into<String>) -> Self {
        Self {
            remote_id: remote_id.into(),
            checksum: None,
            local_path: None,
            status: LedgerStatus::Pending,
            recorded_at: Utc::now(),
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn downloaded(
        remote_id: impl Into<String>,
        checksum: impl Into<String>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self::satisfied(remote_id, checksum, local_path, LedgerStatus::Downloaded)
    }

    pub fn backfilled(
        remote_id: impl Into<String>,
        checksum: impl Into<String>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self::satisfied(
            remote_id,
            checksum,
            local_path,
            LedgerStatus::BackfilledFromDisk,
        )
    }

    fn satisfied(
        remote_id: impl Into<String>,
        checksum: impl Into<String>,
        local_path: impl Into<PathBuf>,
        status: LedgerStatus,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            checksum: Some(checksum.into()),
            local_path: Some(local_path.into()),
            status,
            recorded_at: Utc::now(),
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_local_path(mut self, local_path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(local_path.into());
        self
    }

    pub fn is_satisfied(&self) -> bool {
        self.status.is_satisfied()
    }

    /// Check the checksum/status invariant.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.remote_id.trim().is_empty() {
            return Err(LedgerError::InvalidEntry(
                "remote_id cannot be empty".to_string(),
            ));
        }
        match (self.status.is_satisfied(), self.checksum.is_some()) {
            (true, false) => Err(LedgerError::InvalidEntry(format!(
                "{} is {} but has no checksum",
                self.remote_id, self.status
            ))),
            (false, true) => Err(LedgerError::InvalidEntry(format!(
                "{} is pending but carries a checksum",
                self.remote_id
            ))),
            _ => Ok(()),
        }
    }
}

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed; the entry was inserted.
    Inserted,
    /// Null fields were filled or the status advanced.
    Updated,
    /// The stored row already held everything the entry carried.
    Unchanged,
}

/// Counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total: u64,
    pub pending: u64,
    pub downloaded: u64,
    pub backfilled: u64,
}

/// A finished run as persisted next to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_limit: Option<u32>,
    pub failed_downloads: u32,
    pub delta: RunDelta,
}

/// Errors for ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Ledger is corrupt: {0}")]
    Corrupt(String),

    #[error("Invalid ledger entry: {0}")]
    InvalidEntry(String),

    #[error(
        "Integrity conflict for {remote_id}: recorded checksum {recorded}, new checksum {computed}"
    )]
    IntegrityConflict {
        remote_id: String,
        recorded: String,
        computed: String,
    },
}

impl LedgerError {
    /// Integrity conflicts concern a single document; every other ledger
    /// error concerns the shared store.
    pub fn is_integrity_conflict(&self) -> bool {
        matches!(self, LedgerError::IntegrityConflict { .. })
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}
