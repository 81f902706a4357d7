//! Mock discovery source for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::discovery::{Agency, AgencyDocuments, DiscoveryError, DiscoverySource, RemoteDocumentRecord};

/// Mock implementation of the DiscoverySource trait.
///
/// Serves a fixed catalog of agencies and documents in insertion order, and
/// records which agencies were asked for their documents.
///
/// # Example
///
/// ```rust,ignore
/// use docketeer_core::testing::{MockDiscoverySource, fixtures};
///
/// let source = MockDiscoverySource::new();
/// source.add_agency("AG-1", "Sunrise", vec![fixtures::record("0698z000001AaAaAAK", "Inspection")]).await;
/// source.fail_documents_for("AG-2").await;
/// ```
#[derive(Debug, Default)]
pub struct MockDiscoverySource {
    catalog: Arc<RwLock<Vec<AgencyDocuments>>>,
    failing_agencies: Arc<RwLock<HashSet<String>>>,
    fail_agency_listing: Arc<RwLock<bool>>,
    document_requests: Arc<RwLock<Vec<String>>>,
}

impl MockDiscoverySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agency and its documents. Records are re-tagged with the agency.
    pub async fn add_agency(&self, agency_id: &str, agency_name: &str, records: Vec<RemoteDocumentRecord>) {
        let agency = Agency::new(agency_id, agency_name);
        let records = records
            .into_iter()
            .map(|mut r| {
                r.agency_id = agency.agency_id.clone();
                r.agency_name = agency.agency_name.clone();
                r
            })
            .collect();
        self.catalog.write().await.push(AgencyDocuments { agency, records });
    }

    /// Make the document listing of one agency fail.
    pub async fn fail_documents_for(&self, agency_id: &str) {
        self.failing_agencies.write().await.insert(agency_id.to_string());
    }

    /// Make the agency listing itself fail.
    pub async fn set_fail_agency_listing(&self, fail: bool) {
        *self.fail_agency_listing.write().await = fail;
    }

    /// Agency ids whose documents were requested, in call order.
    pub async fn document_requests(&self) -> Vec<String> {
        self.document_requests.read().await.clone()
    }
}

#[async_trait]
impl DiscoverySource for MockDiscoverySource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn agencies(&self) -> Result<Vec<Agency>, DiscoveryError> {
        if *self.fail_agency_listing.read().await {
            return Err(DiscoveryError::ConnectionFailed("mock agency listing failure".to_string()));
        }
        Ok(self.catalog.read().await.iter().map(|a| a.agency.clone()).collect())
    }

    async fn documents(&self, agency: &Agency) -> Result<Vec<RemoteDocumentRecord>, DiscoveryError> {
        self.document_requests.write().await.push(agency.agency_id.clone());

        if self.failing_agencies.read().await.contains(&agency.agency_id) {
            return Err(DiscoveryError::Timeout);
        }
        Ok(self
            .catalog
            .read()
            .await
            .iter()
            .find(|a| a.agency.agency_id == agency.agency_id)
            .map(|a| a.records.clone())
            .unwrap_or_default())
    }
}
