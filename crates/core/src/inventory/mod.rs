//! Local inventory of the download directory.
//!
//! Documents are stored flat in the download directory under a
//! self-describing name whose trailing token is the remote id. The scanner
//! maps files back to remote ids and reports which of them the ledger has not
//! verified yet.

mod naming;
mod scanner;

pub use naming::{
    document_filename, infer_remote_id, parse_created_date, slugify, Confidence, InferredId,
    PARTIAL_SUFFIX,
};
pub use scanner::{
    BackfillCandidate, CandidateSource, InventoryScan, InventoryScanner, RecordedCopy,
    UnmatchedFile, UnmatchedReason,
};

use std::path::PathBuf;

use thiserror::Error;

use crate::ledger::LedgerError;

/// Errors that abort an inventory scan.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The download directory could not be listed.
    #[error("Failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The ledger could not be read.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
