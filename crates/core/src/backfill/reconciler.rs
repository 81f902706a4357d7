//! Records unverified local files in the ledger.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::checksum::sha256_file;
use crate::delta::DeltaItem;
use crate::discovery::MetadataIndex;
use crate::inventory::InventoryScan;
use crate::ledger::{
    DocumentMetadata, LedgerEntry, LedgerError, LedgerStatus, LedgerStore, UpsertOutcome,
};

use super::{
    BackfillError, BackfillReport, ChecksumConflict, ContentDuplicate, DuplicateFile, HashFailure,
};

/// Hashes flagged files and records them as `BackfilledFromDisk`.
pub struct BackfillReconciler<'a> {
    ledger: &'a dyn LedgerStore,
    metadata: &'a MetadataIndex,
}

impl<'a> BackfillReconciler<'a> {
    pub fn new(ledger: &'a dyn LedgerStore, metadata: &'a MetadataIndex) -> Self {
        Self { ledger, metadata }
    }

    /// Backfill every candidate of a scan, in scan order.
    ///
    /// When two files claim the same remote id the first one wins and the
    /// other is listed as a duplicate. Only ledger failures abort.
    pub async fn reconcile(&self, scan: &InventoryScan) -> Result<BackfillReport, BackfillError> {
        let mut report = BackfillReport::default();
        let mut claimed: HashMap<&str, &PathBuf> = HashMap::new();
        let mut by_checksum: HashMap<String, (String, PathBuf)> = HashMap::new();

        for candidate in &scan.candidates {
            if let Some(kept) = claimed.get(candidate.remote_id.as_str()) {
                warn!(
                    remote_id = %candidate.remote_id,
                    kept = %kept.display(),
                    duplicate = %candidate.path.display(),
                    "Two local files claim the same remote id, keeping the first"
                );
                report.duplicates.push(DuplicateFile {
                    remote_id: candidate.remote_id.clone(),
                    kept: (*kept).clone(),
                    duplicate: candidate.path.clone(),
                });
                continue;
            }
            claimed.insert(candidate.remote_id.as_str(), &candidate.path);

            let checksum = match sha256_file(&candidate.path).await {
                Ok(checksum) => checksum,
                Err(e) => {
                    warn!(
                        remote_id = %candidate.remote_id,
                        path = %candidate.path.display(),
                        error = %e,
                        "Failed to hash local file"
                    );
                    report.hash_failures.push(HashFailure {
                        remote_id: candidate.remote_id.clone(),
                        path: candidate.path.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            match by_checksum.get(&checksum) {
                Some((first_id, first_path)) if first_id != &candidate.remote_id => {
                    warn!(
                        remote_id = %candidate.remote_id,
                        first_remote_id = %first_id,
                        checksum = %checksum,
                        "Identical content under different remote ids"
                    );
                    report.content_duplicates.push(ContentDuplicate {
                        checksum: checksum.clone(),
                        first_remote_id: first_id.clone(),
                        first_path: first_path.clone(),
                        remote_id: candidate.remote_id.clone(),
                        path: candidate.path.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    by_checksum.insert(
                        checksum.clone(),
                        (candidate.remote_id.clone(), candidate.path.clone()),
                    );
                }
            }

            let metadata = self
                .metadata
                .get(&candidate.remote_id)
                .map(DocumentMetadata::from)
                .unwrap_or_default();
            let entry = LedgerEntry::backfilled(&candidate.remote_id, &checksum, &candidate.path)
                .with_metadata(metadata);

            match self.ledger.upsert(&entry) {
                Ok(UpsertOutcome::Unchanged) => {
                    debug!(remote_id = %candidate.remote_id, "Ledger already held this file");
                }
                Ok(_) => {
                    info!(
                        remote_id = %candidate.remote_id,
                        path = %candidate.path.display(),
                        "Backfilled from disk"
                    );
                    report.recorded.push(DeltaItem {
                        remote_id: candidate.remote_id.clone(),
                        status: LedgerStatus::BackfilledFromDisk,
                        local_path: candidate.path.clone(),
                        checksum,
                    });
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
                        path = %candidate.path.display(),
                        "Local file does not match the recorded checksum"
                    );
                    report.conflicts.push(ChecksumConflict {
                        remote_id,
                        path: candidate.path.clone(),
                        recorded,
                        computed,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            recorded = report.recorded.len(),
            duplicates = report.duplicates.len(),
            hash_failures = report.hash_failures.len(),
            conflicts = report.conflicts.len(),
            "Backfill finished"
        );
        Ok(report)
    }
}
