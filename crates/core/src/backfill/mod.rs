//! Backfill of local files into the ledger.
//!
//! Runs before any download: every file the inventory scanner flagged is
//! checksummed and recorded as `BackfilledFromDisk`, so documents already on
//! disk are never fetched again.

mod reconciler;
mod types;

pub use reconciler::BackfillReconciler;
pub use types::*;

use thiserror::Error;

use crate::ledger::LedgerError;

/// Errors that abort a backfill pass.
///
/// Per-file problems (unreadable files, integrity conflicts) are collected in
/// the `BackfillReport` instead.
#[derive(Debug, Error)]
pub enum BackfillError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
