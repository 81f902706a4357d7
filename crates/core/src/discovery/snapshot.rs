//! Per-run aggregation of discovered documents.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::{AgencyDocuments, RemoteDocumentRecord};

/// File name of the snapshot inside the output directory.
pub const SNAPSHOT_FILENAME: &str = "discovery_snapshot.json";

/// Everything discovery produced during one run, grouped by agency.
///
/// Built up by the discovery phase and returned as a value; written to disk
/// exactly once, when the run finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySnapshot {
    pub captured_at: DateTime<Utc>,
    pub agencies: Vec<AgencyDocuments>,
}

impl Default for DiscoverySnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoverySnapshot {
    pub fn new() -> Self {
        Self {
            captured_at: Utc::now(),
            agencies: Vec::new(),
        }
    }

    pub fn push(&mut self, agency: AgencyDocuments) {
        self.agencies.push(agency);
    }

    pub fn records(&self) -> impl Iterator<Item = &RemoteDocumentRecord> {
        self.agencies.iter().flat_map(|a| a.records.iter())
    }

    pub fn record_count(&self) -> usize {
        self.agencies.iter().map(|a| a.records.len()).sum()
    }

    /// Keep the records of `previous` that were not discovered again, so that
    /// metadata learned by earlier runs survives runs that stop at the limit
    /// or skip an agency. Records discovered this run win.
    ///
    /// Returns how many records were carried over.
    pub fn carry_forward(&mut self, previous: DiscoverySnapshot) -> usize {
        let seen: HashSet<String> = self.records().map(|r| r.remote_id.clone()).collect();
        let mut carried = 0;

        for old in previous.agencies {
            let records: Vec<RemoteDocumentRecord> = old
                .records
                .into_iter()
                .filter(|r| !seen.contains(&r.remote_id))
                .collect();
            if records.is_empty() {
                continue;
            }
            carried += records.len();

            match self
                .agencies
                .iter_mut()
                .find(|a| a.agency.agency_id == old.agency.agency_id)
            {
                Some(current) => current.records.extend(records),
                None => self.agencies.push(AgencyDocuments {
                    agency: old.agency,
                    records,
                }),
            }
        }
        carried
    }

    pub fn path_in(output_dir: &Path) -> PathBuf {
        output_dir.join(SNAPSHOT_FILENAME)
    }

    /// Write the snapshot to `<output_dir>/discovery_snapshot.json`.
    ///
    /// The file is replaced atomically so a crash never leaves half a snapshot.
    pub async fn save(&self, output_dir: &Path) -> std::io::Result<PathBuf> {
        let path = Self::path_in(output_dir);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::create_dir_all(output_dir).await?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        Ok(path)
    }

    /// Load a previously saved snapshot. A missing file is `Ok(None)`.
    pub async fn load(output_dir: &Path) -> std::io::Result<Option<Self>> {
        let path = Self::path_in(output_dir);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Lookup of remote metadata by remote id, used when backfilling.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    by_id: HashMap<String, RemoteDocumentRecord>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every record of a snapshot. The first record for an id wins.
    pub fn from_snapshot(snapshot: &DiscoverySnapshot) -> Self {
        let mut index = Self::new();
        for record in snapshot.records() {
            index.insert(record.clone());
        }
        index
    }

    pub fn insert(&mut self, record: RemoteDocumentRecord) {
        self.by_id.entry(record.remote_id.clone()).or_insert(record);
    }

    pub fn get(&self, remote_id: &str) -> Option<&RemoteDocumentRecord> {
        self.by_id.get(remote_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
