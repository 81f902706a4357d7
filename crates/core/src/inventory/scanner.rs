//! Scanner for local files the ledger has not verified yet.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::ledger::{LedgerEntry, LedgerStore};

use super::naming::{infer_remote_id, Confidence, PARTIAL_SUFFIX};
use super::InventoryError;

/// How a backfill candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// The remote id was read from the file name.
    Filename(Confidence),
    /// A pending ledger entry already points at this file.
    LedgerPath,
}

/// A local file that needs a checksum recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillCandidate {
    pub remote_id: String,
    pub path: PathBuf,
    pub source: CandidateSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// No identifier-like token in the file name.
    NoIdentifier,
    /// A token was found but below the configured confidence.
    LowConfidence { token: String },
}

/// A local file that could not be tied to a remote id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedFile {
    pub path: PathBuf,
    #[serde(flatten)]
    pub reason: UnmatchedReason,
}

/// A second local file for a remote id whose checksum is already recorded
/// against another path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedCopy {
    pub remote_id: String,
    pub recorded: PathBuf,
    pub path: PathBuf,
}

/// Result of one scan of the download directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InventoryScan {
    /// Files needing backfill, in filename order, then ledger-path candidates.
    pub candidates: Vec<BackfillCandidate>,
    /// Files whose remote id cannot be inferred.
    pub unmatched: Vec<UnmatchedFile>,
    /// Files whose remote id already has a checksum.
    pub already_recorded: usize,
    /// Files for recorded ids that are not the recorded file.
    pub recorded_copies: Vec<RecordedCopy>,
    /// Leftover `*.part` files from interrupted downloads.
    pub stale_partials: Vec<PathBuf>,
}

impl InventoryScan {
    /// Every file in the directory that maps to a remote id, recorded or not.
    pub fn matched_count(&self) -> usize {
        self.already_recorded
            + self
                .candidates
                .iter()
                .filter(|c| matches!(c.source, CandidateSource::Filename(_)))
                .count()
    }
}

/// Scans the flat download directory against the ledger.
#[derive(Debug, Clone)]
pub struct InventoryScanner {
    download_dir: PathBuf,
    min_confidence: Confidence,
}

impl InventoryScanner {
    pub fn new(download_dir: impl Into<PathBuf>, min_confidence: Confidence) -> Self {
        Self {
            download_dir: download_dir.into(),
            min_confidence,
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// List files lacking a recorded checksum.
    ///
    /// A missing download directory scans as empty.
    pub async fn scan(&self, ledger: &dyn LedgerStore) -> Result<InventoryScan, InventoryError> {
        let entries: HashMap<String, LedgerEntry> = ledger
            .all()?
            .into_iter()
            .map(|e| (e.remote_id.clone(), e))
            .collect();

        let mut scan = InventoryScan::default();
        let mut seen_ids = HashSet::new();

        for (file_name, path) in self.list_files().await? {
            if file_name.ends_with(&format!(".{}", PARTIAL_SUFFIX)) {
                warn!(path = %path.display(), "Ignoring partial file from an interrupted download");
                scan.stale_partials.push(path);
                continue;
            }

            let inferred = match infer_remote_id(&file_name) {
                Some(inferred) if inferred.confidence >= self.min_confidence => inferred,
                Some(inferred) => {
                    scan.unmatched.push(UnmatchedFile {
                        path,
                        reason: UnmatchedReason::LowConfidence {
                            token: inferred.remote_id,
                        },
                    });
                    continue;
                }
                None => {
                    scan.unmatched.push(UnmatchedFile {
                        path,
                        reason: UnmatchedReason::NoIdentifier,
                    });
                    continue;
                }
            };

            if let Some(entry) = entries
                .get(&inferred.remote_id)
                .filter(|e| e.is_satisfied())
            {
                scan.already_recorded += 1;
                if let Some(recorded) = entry.local_path.as_deref() {
                    let recorded = self.resolve(recorded);
                    if recorded != path {
                        warn!(
                            remote_id = %inferred.remote_id,
                            recorded = %recorded.display(),
                            duplicate = %path.display(),
                            "Local copy of an already recorded document"
                        );
                        scan.recorded_copies.push(RecordedCopy {
                            remote_id: inferred.remote_id,
                            recorded,
                            path,
                        });
                    }
                }
                continue;
            }

            debug!(remote_id = %inferred.remote_id, path = %path.display(), "Unverified local file");
            seen_ids.insert(inferred.remote_id.clone());
            scan.candidates.push(BackfillCandidate {
                remote_id: inferred.remote_id,
                path,
                source: CandidateSource::Filename(inferred.confidence),
            });
        }

        // Pending entries that already name a file, whatever it is called.
        let mut from_ledger = Vec::new();
        for entry in entries.values() {
            if entry.is_satisfied() || seen_ids.contains(&entry.remote_id) {
                continue;
            }
            let Some(recorded) = entry.local_path.as_deref() else {
                continue;
            };
            if let Some(path) = self.locate(recorded).await {
                from_ledger.push(BackfillCandidate {
                    remote_id: entry.remote_id.clone(),
                    path,
                    source: CandidateSource::LedgerPath,
                });
            }
        }
        from_ledger.sort_by(|a, b| a.remote_id.cmp(&b.remote_id));

        // a file the ledger points at is accounted for, whatever its name
        let known: HashSet<PathBuf> = entries
            .values()
            .filter_map(|e| e.local_path.as_deref())
            .map(|p| self.resolve(p))
            .chain(from_ledger.iter().map(|c| c.path.clone()))
            .collect();
        scan.unmatched.retain(|u| !known.contains(&u.path));
        scan.candidates.extend(from_ledger);

        Ok(scan)
    }

    /// Regular, non-hidden files of the download directory, sorted by name.
    async fn list_files(&self) -> Result<Vec<(String, PathBuf)>, InventoryError> {
        let io_err = |source: std::io::Error| InventoryError::Io {
            path: self.download_dir.clone(),
            source,
        };

        let mut dir = match fs::read_dir(&self.download_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(io_err)? {
            let file_type = entry.file_type().await.map_err(io_err)?;
            if !file_type.is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "Skipping file with non UTF-8 name");
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            files.push((file_name, entry.path()));
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    /// Absolute form of a recorded path; relative paths are taken to be
    /// relative to the download directory.
    fn resolve(&self, recorded: &Path) -> PathBuf {
        if recorded.is_absolute() {
            recorded.to_path_buf()
        } else {
            self.download_dir.join(recorded)
        }
    }

    /// Find the file a recorded path refers to: the path itself, or a file
    /// of the same name in the download directory.
    async fn locate(&self, recorded: &Path) -> Option<PathBuf> {
        let mut candidates = vec![self.resolve(recorded)];
        if let Some(name) = recorded.file_name() {
            candidates.push(self.download_dir.join(name));
        }

        for candidate in candidates {
            if is_file(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}
