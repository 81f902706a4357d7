//! The run delta: documents newly satisfied during one invocation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ledger::LedgerStatus;

/// One newly satisfied document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaItem {
    pub remote_id: String,
    pub status: LedgerStatus,
    pub local_path: PathBuf,
    pub checksum: String,
}

/// Ordered sequence of documents that became `Downloaded` or
/// `BackfilledFromDisk` during the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunDelta {
    items: Vec<DeltaItem>,
}

impl RunDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: DeltaItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[DeltaItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries fetched over the network this run. Only these count toward the limit.
    pub fn downloaded_count(&self) -> usize {
        self.count_status(LedgerStatus::Downloaded)
    }

    pub fn backfilled_count(&self) -> usize {
        self.count_status(LedgerStatus::BackfilledFromDisk)
    }

    pub fn contains(&self, remote_id: &str) -> bool {
        self.items.iter().any(|i| i.remote_id == remote_id)
    }

    pub fn remote_ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|i| i.remote_id.as_str())
    }

    fn count_status(&self, status: LedgerStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }
}

impl FromIterator<DeltaItem> for RunDelta {
    fn from_iter<T: IntoIterator<Item = DeltaItem>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, status: LedgerStatus) -> DeltaItem {
        DeltaItem {
            remote_id: id.to_string(),
            status,
            local_path: PathBuf::from(format!("/docs/{}.pdf", id)),
            checksum: "ab".repeat(32),
        }
    }

    #[test]
    fn test_counts_split_by_status() {
        let mut delta = RunDelta::new();
        delta.push(item("a", LedgerStatus::BackfilledFromDisk));
        delta.push(item("b", LedgerStatus::Downloaded));
        delta.push(item("c", LedgerStatus::Downloaded));

        assert_eq!(delta.len(), 3);
        assert_eq!(delta.downloaded_count(), 2);
        assert_eq!(delta.backfilled_count(), 1);
        assert!(delta.contains("b"));
        assert!(!delta.contains("z"));
        assert_eq!(delta.remote_ids().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let delta: RunDelta = vec![item("a", LedgerStatus::Downloaded)].into_iter().collect();
        let json = serde_json::to_value(&delta).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["status"], "downloaded");
    }
}
