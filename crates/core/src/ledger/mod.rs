//! Provenance ledger - the single source of truth for which documents are
//! already satisfied on disk.
//!
//! Entries are keyed by remote document id and only ever move forward
//! (`Pending` to `Downloaded` or `BackfilledFromDisk`). A recorded checksum is
//! never replaced; a write carrying a different one is rejected as an
//! integrity conflict.

mod sqlite;
mod types;

pub use sqlite::SqliteLedgerStore;
pub use types::*;

/// Trait for ledger storage backends.
///
/// Implementations serialize writers: `upsert` is a compare-and-set on
/// `remote_id` and must never leave two rows for the same id.
pub trait LedgerStore: Send + Sync {
    /// Look up one entry.
    fn get(&self, remote_id: &str) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Insert or merge an entry.
    ///
    /// Null `checksum`, `local_path` and metadata fields may be filled; status
    /// may advance from `Pending`. A differing non-null checksum yields
    /// `LedgerError::IntegrityConflict` and leaves the row untouched.
    fn upsert(&self, entry: &LedgerEntry) -> Result<UpsertOutcome, LedgerError>;

    /// Read the whole table, ordered by `remote_id`.
    fn all(&self) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Count entries per status.
    fn stats(&self) -> Result<LedgerStats, LedgerError>;

    /// Persist a finished run and its delta.
    fn record_run(&self, run: &RunRecord) -> Result<(), LedgerError>;

    /// The most recently finished run, if any.
    fn latest_run(&self) -> Result<Option<RunRecord>, LedgerError>;
}
