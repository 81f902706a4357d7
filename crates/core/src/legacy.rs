//! Seeding the ledger from the legacy metadata CSV.
//!
//! Older tooling kept one CSV row per document: the `ContentDocumentId`, the
//! remote metadata, and where the file was saved. Importing it writes
//! `Pending` entries that carry the file location and metadata. The next
//! run's preflight backfill then hashes those files instead of downloading
//! them again.
//!
//! Checksums found in the CSV are not carried over; every checksum in the
//! ledger is computed from the bytes on disk.

use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ledger::{DocumentMetadata, LedgerEntry, LedgerError, LedgerStore, UpsertOutcome};

/// Where the legacy tooling left its CSV, inside the download directory.
pub const LEGACY_METADATA_FILENAME: &str = "facility_information_metadata.csv";

#[derive(Debug, Error)]
pub enum LegacyError {
    /// The CSV could not be opened or parsed.
    #[error("Failed to read legacy metadata {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// One row of the legacy CSV. Unknown columns are ignored, missing ones are
/// empty.
#[derive(Debug, Default, Deserialize)]
struct LegacyRow {
    #[serde(rename = "ContentDocumentId", default)]
    content_document_id: String,
    #[serde(default)]
    agency_id: String,
    #[serde(default)]
    agency_name: String,
    #[serde(rename = "Title", default)]
    title: String,
    #[serde(rename = "CreatedDate", default)]
    created_date: String,
    #[serde(rename = "FileExtension", default)]
    file_extension: String,
    #[serde(rename = "ContentBodyId", default)]
    content_body_id: String,
    #[serde(default)]
    downloaded_path: String,
    #[serde(default)]
    downloaded_filename: String,
    #[serde(default)]
    generated_filename: String,
}

impl LegacyRow {
    fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            agency_id: non_empty(&self.agency_id),
            agency_name: non_empty(&self.agency_name),
            title: non_empty(&self.title),
            created_date: non_empty(&self.created_date),
            file_extension: non_empty(&self.file_extension),
            content_body_id: non_empty(&self.content_body_id),
        }
    }

    /// Where the row says the file is: the first candidate that exists,
    /// else the first candidate at all.
    fn local_path(&self, download_dir: &Path) -> Option<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(recorded) = non_empty(&self.downloaded_path) {
            let recorded = PathBuf::from(recorded);
            if recorded.is_absolute() {
                candidates.push(recorded);
            } else {
                candidates.push(download_dir.join(recorded));
            }
        }
        for name in [&self.downloaded_filename, &self.generated_filename] {
            if let Some(name) = non_empty(name) {
                candidates.push(download_dir.join(name));
            }
        }

        match candidates.iter().position(|c| c.is_file()) {
            Some(i) => Some(candidates.swap_remove(i)),
            None => candidates.into_iter().next(),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Counts from one import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LegacyImport {
    pub rows: usize,
    /// Rows without a `ContentDocumentId`.
    pub skipped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Rows whose file was found on disk.
    pub with_local_file: usize,
}

/// Import the legacy CSV at `path`.
///
/// Relative file locations in the CSV are resolved against `download_dir`.
pub fn import_legacy_csv(
    path: &Path,
    download_dir: &Path,
    ledger: &dyn LedgerStore,
) -> Result<LegacyImport, LegacyError> {
    let reader = csv::Reader::from_path(path).map_err(|source| LegacyError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let import = import_rows(reader, path, download_dir, ledger)?;

    info!(
        path = %path.display(),
        rows = import.rows,
        inserted = import.inserted,
        updated = import.updated,
        with_local_file = import.with_local_file,
        "Legacy metadata imported"
    );
    Ok(import)
}

fn import_rows<R: Read>(
    mut reader: csv::Reader<R>,
    source_path: &Path,
    download_dir: &Path,
    ledger: &dyn LedgerStore,
) -> Result<LegacyImport, LegacyError> {
    let mut import = LegacyImport::default();

    for row in reader.deserialize::<LegacyRow>() {
        let row = row.map_err(|source| LegacyError::Read {
            path: source_path.to_path_buf(),
            source,
        })?;
        import.rows += 1;

        let Some(remote_id) = non_empty(&row.content_document_id) else {
            warn!(row = import.rows, "Legacy row has no ContentDocumentId, skipping");
            import.skipped += 1;
            continue;
        };

        let mut entry = LedgerEntry::pending(&remote_id).with_metadata(row.metadata());
        if let Some(local_path) = row.local_path(download_dir) {
            if local_path.is_file() {
                import.with_local_file += 1;
            }
            entry = entry.with_local_path(local_path);
        }

        match ledger.upsert(&entry)? {
            UpsertOutcome::Inserted => import.inserted += 1,
            UpsertOutcome::Updated => import.updated += 1,
            UpsertOutcome::Unchanged => import.unchanged += 1,
        }
        debug!(remote_id = %remote_id, "Legacy row imported");
    }

    Ok(import)
}
