//! Types produced by discovery.

use serde::{Deserialize, Serialize};

use crate::ledger::DocumentMetadata;

/// A licensing agency as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agency {
    pub agency_id: String,
    pub agency_name: String,
}

impl Agency {
    pub fn new(agency_id: impl Into<String>, agency_name: impl Into<String>) -> Self {
        Self {
            agency_id: agency_id.into(),
            agency_name: agency_name.into(),
        }
    }
}

/// One document version as known to the discovery API. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDocumentRecord {
    /// Content document id; unique per document version.
    pub remote_id: String,
    pub agency_id: String,
    /// Agency display name, used to derive the local file name.
    #[serde(default)]
    pub agency_name: String,
    #[serde(default)]
    pub title: String,
    /// Creation timestamp as sent by the API (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
    /// Identifies the byte payload; re-filings may share it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_body_id: Option<String>,
    /// Per-version record id from the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

impl From<&RemoteDocumentRecord> for DocumentMetadata {
    fn from(record: &RemoteDocumentRecord) -> Self {
        DocumentMetadata {
            agency_id: non_empty(&record.agency_id),
            agency_name: non_empty(&record.agency_name),
            title: non_empty(&record.title),
            created_date: record.created_date.as_deref().and_then(non_empty),
            file_extension: record.file_extension.as_deref().and_then(non_empty),
            content_body_id: record.content_body_id.as_deref().and_then(non_empty),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// The documents discovered for one agency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyDocuments {
    pub agency: Agency,
    pub records: Vec<RemoteDocumentRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_from_record_drops_blanks() {
        let record = RemoteDocumentRecord {
            remote_id: "0698z000001AbCdAAK".to_string(),
            agency_id: "AG-7".to_string(),
            agency_name: "  ".to_string(),
            title: "Renewal Inspection".to_string(),
            created_date: Some("2024-03-01T10:00:00.000Z".to_string()),
            file_extension: Some(String::new()),
            content_body_id: None,
            version_id: None,
        };

        let metadata = DocumentMetadata::from(&record);
        assert_eq!(metadata.agency_id.as_deref(), Some("AG-7"));
        assert_eq!(metadata.agency_name, None);
        assert_eq!(metadata.title.as_deref(), Some("Renewal Inspection"));
        assert_eq!(metadata.file_extension, None);
        assert_eq!(
            metadata.created_date.as_deref(),
            Some("2024-03-01T10:00:00.000Z")
        );
    }
}
