//! Testing utilities and mock implementations.
//!
//! Mocks for every external seam of the pipeline, so whole runs can be
//! exercised against a temp directory and an in-memory ledger.
//!
//! # Example
//!
//! ```rust,ignore
//! use docketeer_core::testing::{fixtures, MockDiscoverySource, MockFetcher, MockTrigger};
//!
//! let discovery = MockDiscoverySource::new();
//! discovery.add_agency("AG-1", "Sunrise", fixtures::records(1, 7)).await;
//! let fetcher = MockFetcher::new();
//! let trigger = MockTrigger::new();
//! ```

mod mock_discovery;
mod mock_fetcher;
mod mock_trigger;

pub use mock_discovery::MockDiscoverySource;
pub use mock_fetcher::MockFetcher;
pub use mock_trigger::{MockTrigger, RecordedTrigger};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::discovery::RemoteDocumentRecord;

    /// A content document id shaped like the real ones, unique per `n`.
    pub fn remote_id(n: u32) -> String {
        format!("0698z{:010}AAK", n)
    }

    /// A document record with reasonable defaults.
    pub fn record(remote_id: &str, title: &str) -> RemoteDocumentRecord {
        RemoteDocumentRecord {
            remote_id: remote_id.to_string(),
            agency_id: "AG-1".to_string(),
            agency_name: "Sunrise Family Services".to_string(),
            title: title.to_string(),
            created_date: Some("2024-03-01T10:15:00.000Z".to_string()),
            file_extension: Some("pdf".to_string()),
            content_body_id: None,
            version_id: None,
        }
    }

    /// `count` records with ids `remote_id(1..=count)`, offset by `agency_seed * 1000`.
    pub fn records(agency_seed: u32, count: u32) -> Vec<RemoteDocumentRecord> {
        (1..=count)
            .map(|i| {
                let id = remote_id(agency_seed * 1000 + i);
                record(&id, &format!("Inspection Report {}", i))
            })
            .collect()
    }
}
