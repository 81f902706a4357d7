//! Types for the run orchestrator.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::backfill::BackfillError;
use crate::delta::RunDelta;
use crate::discovery::DiscoveryError;
use crate::downloader::DownloadError;
use crate::inventory::InventoryError;
use crate::ledger::LedgerError;

/// Errors that abort a run. Per-document failures never end up here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A working directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Ledger unavailable or corrupt.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The agency listing failed, so nothing could be discovered. The
    /// backfill and the run outputs were still written.
    #[error("agency listing failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// The download directory could not be scanned.
    #[error("inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// A run artifact could not be written.
    #[error("failed to write {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<BackfillError> for PipelineError {
    fn from(e: BackfillError) -> Self {
        match e {
            BackfillError::Ledger(e) => PipelineError::Ledger(e),
        }
    }
}

impl From<DownloadError> for PipelineError {
    fn from(e: DownloadError) -> Self {
        match e {
            DownloadError::Ledger(e) => PipelineError::Ledger(e),
        }
    }
}

/// Phases of a run, in the only order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    PreflightBackfill,
    Discovering,
    Downloading,
    Done,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunPhase::PreflightBackfill => "preflight_backfill",
            RunPhase::Discovering => "discovering",
            RunPhase::Downloading => "downloading",
            RunPhase::Done => "done",
        };
        f.write_str(s)
    }
}

/// What happened to the extraction trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum ExtractionStatus {
    Skipped,
    Completed,
    Failed(String),
}

/// Counters and outputs of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub phase: RunPhase,
    /// Local files recorded during preflight backfill.
    pub backfilled: usize,
    /// Records that needed a fetch.
    pub attempted: usize,
    pub downloaded: usize,
    pub failed: usize,
    /// Records already satisfied when discovered.
    pub already_satisfied: usize,
    /// Satisfied entries whose missing metadata was filled in.
    pub metadata_filled: usize,
    pub integrity_conflicts: usize,
    pub agencies_listed: usize,
    pub agency_failures: usize,
    pub limit_reached: bool,
    pub missing: usize,
    pub unmatched_files: usize,
    pub extraction: ExtractionStatus,
    pub delta: RunDelta,
}
