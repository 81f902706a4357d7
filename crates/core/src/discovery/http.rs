//! HTTP discovery source for the public licensing-search API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::DiscoveryConfig;

use super::{Agency, DiscoveryError, DiscoverySource, RemoteDocumentRecord};

/// Discovery source backed by the agency document-search API.
///
/// Both endpoints answer with the API's `returnValue` envelope: agencies under
/// `returnValue.objectData.responseResult`, documents under
/// `returnValue.contentVersionRes`.
pub struct HttpDiscoverySource {
    client: Client,
    config: DiscoveryConfig,
}

impl HttpDiscoverySource {
    /// Create a new source with the given configuration.
    ///
    /// Fails with `NotConfigured` when no base URL is set.
    pub fn new(config: DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let base_url = config.base_url.trim();
        if base_url.is_empty() {
            return Err(DiscoveryError::NotConfigured(
                "discovery.base_url is not set".to_string(),
            ));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(DiscoveryError::NotConfigured(format!(
                "discovery.base_url must be an http(s) URL, got '{}'",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| DiscoveryError::NotConfigured(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn agencies_url(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.agencies_path
        )
    }

    fn documents_url(&self, agency_id: &str) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            self.config
                .documents_path
                .replace("{agency_id}", &urlencoding::encode(agency_id))
        )
    }

    async fn get_body(&self, url: &str) -> Result<String, DiscoveryError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::ApiError {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl DiscoverySource for HttpDiscoverySource {
    fn name(&self) -> &str {
        "licensing-search-api"
    }

    async fn agencies(&self) -> Result<Vec<Agency>, DiscoveryError> {
        let url = self.agencies_url();
        debug!(url = %url, "Listing agencies");
        let body = self.get_body(&url).await?;
        parse_agencies(&body)
    }

    async fn documents(
        &self,
        agency: &Agency,
    ) -> Result<Vec<RemoteDocumentRecord>, DiscoveryError> {
        let url = self.documents_url(&agency.agency_id);
        debug!(agency_id = %agency.agency_id, "Listing agency documents");
        let body = self.get_body(&url).await?;
        parse_documents(agency, &body)
    }
}

/// Parse the agency listing. Agencies without an id are skipped.
pub(crate) fn parse_agencies(body: &str) -> Result<Vec<Agency>, DiscoveryError> {
    let response: AgencyListResponse = serde_json::from_str(body)
        .map_err(|e| DiscoveryError::ParseError(format!("agency list: {}", e)))?;

    Ok(response
        .return_value
        .object_data
        .response_result
        .into_iter()
        .filter_map(|a| {
            let agency_id = a.agency_id.unwrap_or_default().trim().to_string();
            if agency_id.is_empty() {
                return None;
            }
            Some(Agency {
                agency_id,
                agency_name: a.agency_name.unwrap_or_default().trim().to_string(),
            })
        })
        .collect())
}

/// Parse one agency's document listing. Records without a content document id
/// are skipped.
pub(crate) fn parse_documents(
    agency: &Agency,
    body: &str,
) -> Result<Vec<RemoteDocumentRecord>, DiscoveryError> {
    let response: ContentDetailsResponse = serde_json::from_str(body)
        .map_err(|e| DiscoveryError::ParseError(format!("content details: {}", e)))?;

    Ok(response
        .return_value
        .content_version_res
        .into_iter()
        .filter_map(|d| {
            let remote_id = d.content_document_id.unwrap_or_default().trim().to_string();
            if remote_id.is_empty() {
                return None;
            }
            Some(RemoteDocumentRecord {
                remote_id,
                agency_id: agency.agency_id.clone(),
                agency_name: agency.agency_name.clone(),
                title: d.title.unwrap_or_default().trim().to_string(),
                created_date: d.created_date,
                file_extension: d.file_extension,
                content_body_id: d.content_body_id,
                version_id: d.id,
            })
        })
        .collect())
}

// Wire format

#[derive(Debug, Deserialize)]
struct AgencyListResponse {
    #[serde(rename = "returnValue")]
    return_value: AgencyReturnValue,
}

#[derive(Debug, Deserialize)]
struct AgencyReturnValue {
    #[serde(rename = "objectData")]
    object_data: AgencyObjectData,
}

#[derive(Debug, Deserialize)]
struct AgencyObjectData {
    #[serde(rename = "responseResult", default)]
    response_result: Vec<WireAgency>,
}

#[derive(Debug, Deserialize)]
struct WireAgency {
    #[serde(rename = "agencyId")]
    agency_id: Option<String>,
    #[serde(rename = "AgencyName")]
    agency_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentDetailsResponse {
    #[serde(rename = "returnValue")]
    return_value: ContentReturnValue,
}

#[derive(Debug, Deserialize)]
struct ContentReturnValue {
    #[serde(rename = "contentVersionRes", default)]
    content_version_res: Vec<WireContentVersion>,
}

#[derive(Debug, Deserialize)]
struct WireContentVersion {
    #[serde(rename = "ContentDocumentId")]
    content_document_id: Option<String>,
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "CreatedDate")]
    created_date: Option<String>,
    #[serde(rename = "FileExtension")]
    file_extension: Option<String>,
    #[serde(rename = "ContentBodyId")]
    content_body_id: Option<String>,
    #[serde(rename = "Id")]
    id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agencies_skips_missing_ids() {
        let body = r#"{
            "returnValue": {
                "objectData": {
                    "responseResult": [
                        {"agencyId": "0018z00002AbCdE", "AgencyName": " Sunrise Family Services "},
                        {"agencyId": "", "AgencyName": "Nameless"},
                        {"AgencyName": "No Id"},
                        {"agencyId": "0018z00002XyZ12"}
                    ]
                }
            }
        }"#;

        let agencies = parse_agencies(body).unwrap();
        assert_eq!(agencies.len(), 2);
        assert_eq!(agencies[0].agency_id, "0018z00002AbCdE");
        assert_eq!(agencies[0].agency_name, "Sunrise Family Services");
        assert_eq!(agencies[1].agency_name, "");
    }

    #[test]
    fn test_parse_documents_keeps_api_order() {
        let agency = Agency::new("AG-1", "Sunrise Family Services");
        let body = r#"{
            "returnValue": {
                "contentVersionRes": [
                    {
                        "ContentDocumentId": "0698z000001BbBbAAK",
                        "Title": "Renewal Inspection",
                        "CreatedDate": "2024-03-01T10:00:00.000Z",
                        "FileExtension": "pdf",
                        "ContentBodyId": "05T8z000001",
                        "Id": "0688z000001"
                    },
                    {"Title": "Orphan without id"},
                    {"ContentDocumentId": "0698z000001AaAaAAK", "Title": "Special Investigation"}
                ]
            }
        }"#;

        let records = parse_documents(&agency, body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].remote_id, "0698z000001BbBbAAK");
        assert_eq!(records[0].agency_name, "Sunrise Family Services");
        assert_eq!(records[0].version_id.as_deref(), Some("0688z000001"));
        assert_eq!(records[1].remote_id, "0698z000001AaAaAAK");
        assert_eq!(records[1].file_extension, None);
    }

    #[test]
    fn test_parse_documents_empty_list() {
        let agency = Agency::new("AG-1", "x");
        let records = parse_documents(&agency, r#"{"returnValue": {}}"#).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_parse_garbage_is_parse_error() {
        let result = parse_agencies("<html>maintenance</html>");
        assert!(matches!(result, Err(DiscoveryError::ParseError(_))));
    }

    #[test]
    fn test_unset_base_url_is_rejected() {
        let result = HttpDiscoverySource::new(DiscoveryConfig::default());
        assert!(matches!(result, Err(DiscoveryError::NotConfigured(_))));

        let result = HttpDiscoverySource::new(DiscoveryConfig {
            base_url: "licensing.example.org".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(DiscoveryError::NotConfigured(_))));
    }

    #[test]
    fn test_documents_url_encodes_agency_id() {
        let source = HttpDiscoverySource::new(DiscoveryConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(source.agencies_url(), "http://localhost:8000/api/agencies");
        assert_eq!(
            source.documents_url("A B/1"),
            "http://localhost:8000/api/agencies/A%20B%2F1/documents"
        );
    }
}
