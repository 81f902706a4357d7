//! Run artifacts written to the output directory, and ledger verification.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::{error, info, warn};

use crate::backfill::{ChecksumConflict, ContentDuplicate, DuplicateFile, HashFailure};
use crate::checksum::sha256_file;
use crate::delta::RunDelta;
use crate::inventory::UnmatchedFile;
use crate::ledger::{LedgerError, LedgerStore};

/// Run-scoped delta output: only this run's newly satisfied documents.
pub const DELTA_FILENAME: &str = "latest_run_delta.json";

/// Local inventory mismatch report.
pub const INVENTORY_REPORT_FILENAME: &str = "inventory_report.json";

/// Contents of `latest_run_delta.json`.
#[derive(Debug, Clone, Serialize)]
pub struct DeltaFile<'a> {
    pub run_id: &'a str,
    pub finished_at: DateTime<Utc>,
    pub documents: &'a RunDelta,
}

/// A record discovered this run that has neither a local file nor a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingRecord {
    pub remote_id: String,
    pub agency_id: String,
    pub title: String,
}

/// A download attempt that failed this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDownload {
    pub remote_id: String,
    pub error: String,
}

/// Contents of `inventory_report.json`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InventoryReport {
    pub run_id: String,
    pub unmatched: Vec<UnmatchedFile>,
    pub stale_partials: Vec<PathBuf>,
    pub missing: Vec<MissingRecord>,
    pub duplicates: Vec<DuplicateFile>,
    pub content_duplicates: Vec<ContentDuplicate>,
    pub hash_failures: Vec<HashFailure>,
    pub failed_downloads: Vec<FailedDownload>,
    pub conflicts: Vec<ChecksumConflict>,
}

/// Serialize `value` as pretty JSON into `<dir>/<file_name>`, replacing any
/// previous file atomically.
pub async fn write_json<T: Serialize>(
    dir: &Path,
    file_name: &str,
    value: &T,
) -> std::io::Result<PathBuf> {
    let path = dir.join(file_name);
    let tmp = dir.join(format!("{}.tmp", file_name));
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    fs::create_dir_all(dir).await?;
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, &path).await?;
    Ok(path)
}

/// A satisfied entry whose file is no longer where the ledger says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingFile {
    pub remote_id: String,
    pub path: Option<PathBuf>,
}

/// Result of re-hashing every satisfied ledger entry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub checked: usize,
    pub verified: usize,
    pub mismatched: Vec<ChecksumConflict>,
    pub missing: Vec<MissingFile>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.mismatched.is_empty() && self.missing.is_empty()
    }
}

/// Recompute the checksum of every satisfied entry and compare it with the
/// recorded one. The ledger itself is never modified.
pub async fn verify_ledger(ledger: &dyn LedgerStore) -> Result<VerifyReport, LedgerError> {
    let mut report = VerifyReport::default();

    for entry in ledger.all()?.into_iter().filter(|e| e.is_satisfied()) {
        report.checked += 1;

        let (Some(path), Some(recorded)) = (entry.local_path, entry.checksum) else {
            report.missing.push(MissingFile {
                remote_id: entry.remote_id,
                path: None,
            });
            continue;
        };

        match sha256_file(&path).await {
            Ok(computed) if computed == recorded => report.verified += 1,
            Ok(computed) => {
                error!(
                    remote_id = %entry.remote_id,
                    path = %path.display(),
                    recorded = %recorded,
                    computed = %computed,
                    "Checksum mismatch"
                );
                report.mismatched.push(ChecksumConflict {
                    remote_id: entry.remote_id,
                    path,
                    recorded,
                    computed,
                });
            }
            Err(e) => {
                warn!(remote_id = %entry.remote_id, path = %path.display(), error = %e, "Recorded file unreadable");
                report.missing.push(MissingFile {
                    remote_id: entry.remote_id,
                    path: Some(path),
                });
            }
        }
    }

    info!(
        checked = report.checked,
        verified = report.verified,
        mismatched = report.mismatched.len(),
        missing = report.missing.len(),
        "Verification finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::sha256_hex;
    use crate::ledger::{LedgerEntry, SqliteLedgerStore};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_verify_detects_mismatch_and_missing() {
        let temp = TempDir::new().unwrap();
        let ledger = SqliteLedgerStore::in_memory().unwrap();

        let good = temp.path().join("good.pdf");
        fs::write(&good, b"good").await.unwrap();
        let tampered = temp.path().join("tampered.pdf");
        fs::write(&tampered, b"changed").await.unwrap();

        ledger
            .upsert(&LedgerEntry::downloaded("069A", sha256_hex(b"good"), &good))
            .unwrap();
        ledger
            .upsert(&LedgerEntry::backfilled("069B", sha256_hex(b"original"), &tampered))
            .unwrap();
        ledger
            .upsert(&LedgerEntry::downloaded(
                "069C",
                sha256_hex(b"gone"),
                temp.path().join("gone.pdf"),
            ))
            .unwrap();
        ledger.upsert(&LedgerEntry::pending("069D")).unwrap();

        let report = verify_ledger(&ledger).await.unwrap();

        assert_eq!(report.checked, 3);
        assert_eq!(report.verified, 1);
        assert_eq!(report.mismatched.len(), 1);
        assert_eq!(report.mismatched[0].remote_id, "069B");
        assert_eq!(report.mismatched[0].computed, sha256_hex(b"changed"));
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].remote_id, "069C");
        assert!(!report.is_clean());
        // verification never rewrites the ledger
        assert_eq!(
            ledger.get("069B").unwrap().unwrap().checksum,
            Some(sha256_hex(b"original"))
        );
    }

    #[tokio::test]
    async fn test_write_json_replaces_file() {
        let temp = TempDir::new().unwrap();
        let delta = RunDelta::new();

        let file = DeltaFile {
            run_id: "r1",
            finished_at: Utc::now(),
            documents: &delta,
        };
        let path = write_json(temp.path(), DELTA_FILENAME, &file).await.unwrap();
        write_json(temp.path(), DELTA_FILENAME, &file).await.unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(value["run_id"], "r1");
        assert_eq!(value["documents"], serde_json::json!([]));
        assert!(!temp.path().join(format!("{}.tmp", DELTA_FILENAME)).exists());
    }
}
