//! Types reported by a backfill pass.

use std::path::PathBuf;

use serde::Serialize;

use crate::delta::DeltaItem;

/// A second file inferring a remote id that an earlier file already claimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateFile {
    pub remote_id: String,
    pub kept: PathBuf,
    pub duplicate: PathBuf,
}

/// Two files with identical bytes recorded under different remote ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentDuplicate {
    pub checksum: String,
    pub first_remote_id: String,
    pub first_path: PathBuf,
    pub remote_id: String,
    pub path: PathBuf,
}

/// A file that could not be read for hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashFailure {
    pub remote_id: String,
    pub path: PathBuf,
    pub error: String,
}

/// A document whose local bytes disagree with the recorded checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumConflict {
    pub remote_id: String,
    pub path: PathBuf,
    pub recorded: String,
    pub computed: String,
}

/// Outcome of one backfill pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    /// Newly satisfied entries, in the order they were recorded.
    pub recorded: Vec<DeltaItem>,
    pub duplicates: Vec<DuplicateFile>,
    pub content_duplicates: Vec<ContentDuplicate>,
    pub hash_failures: Vec<HashFailure>,
    pub conflicts: Vec<ChecksumConflict>,
}

impl BackfillReport {
    pub fn recorded_count(&self) -> usize {
        self.recorded.len()
    }
}
