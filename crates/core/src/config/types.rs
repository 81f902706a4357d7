use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::inventory::Confidence;

/// File name of the ledger database when no explicit path is configured.
pub const DEFAULT_LEDGER_FILENAME: &str = "downloaded_files_database.db";

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where artifacts, documents and the ledger live.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Directory for ledger, run delta and report artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Directory where document bytes land.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Ledger database override (default: `<output_dir>/downloaded_files_database.db`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<PathBuf>,
}

impl PathsConfig {
    /// The effective ledger location.
    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join(DEFAULT_LEDGER_FILENAME))
    }

    /// Anchor relative paths at `base`, so that recorded provenance does not
    /// depend on the directory a later command runs from.
    pub fn make_absolute(&mut self, base: &Path) {
        for path in [&mut self.output_dir, &mut self.download_dir] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        if let Some(path) = self.ledger_path.as_mut().filter(|p| p.is_relative()) {
            *path = base.join(&*path);
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            download_dir: default_download_dir(),
            ledger_path: None,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("metadata_output")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("Downloads")
}

/// Document-search API used to enumerate agencies and their documents.
///
/// There is no usable default endpoint: `base_url` is empty until configured,
/// and the two paths are placeholders for whatever gateway fronts the API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// API base URL. Required by `run`.
    #[serde(default)]
    pub base_url: String,
    /// Path of the agency listing endpoint, relative to `base_url`
    /// (placeholder default: `/api/agencies`).
    #[serde(default = "default_agencies_path")]
    pub agencies_path: String,
    /// Path of the per-agency document listing endpoint
    /// (placeholder default: `/api/agencies/{agency_id}/documents`).
    /// `{agency_id}` is replaced with the URL-encoded agency id.
    #[serde(default = "default_documents_path")]
    pub documents_path: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_discovery_timeout")]
    pub timeout_secs: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            agencies_path: default_agencies_path(),
            documents_path: default_documents_path(),
            timeout_secs: default_discovery_timeout(),
        }
    }
}

fn default_agencies_path() -> String {
    "/api/agencies".to_string()
}

fn default_documents_path() -> String {
    "/api/agencies/{agency_id}/documents".to_string()
}

fn default_discovery_timeout() -> u32 {
    30
}

/// Document byte retrieval.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// URL template for document bytes; `{remote_id}` is substituted.
    #[serde(default = "default_url_template")]
    pub url_template: String,
    /// Per-request timeout in seconds (default: 60)
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u32,
    /// Fetch attempts per document within one run (default: 1, no retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts of the same document, in milliseconds.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    /// Pause after each successful download, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            timeout_secs: default_download_timeout(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff(),
            delay_ms: 0,
            user_agent: default_user_agent(),
        }
    }
}

fn default_url_template() -> String {
    "https://michildwelfarepubliclicensingsearch.michigan.gov/licagencysrch/sfc/servlet.shepherd/document/download/{remote_id}".to_string()
}

fn default_download_timeout() -> u32 {
    60
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_backoff() -> u64 {
    2000
}

fn default_user_agent() -> String {
    concat!("docketeer/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Local inventory scanning.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InventoryConfig {
    /// Lowest filename-inference confidence accepted as a match.
    #[serde(default)]
    pub min_confidence: Confidence,
}

/// Downstream extraction step.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// Run the extraction trigger after a run (the CLI can still skip it).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// External command, program first. `{staging_dir}` is replaced with the
    /// directory holding this run's files. Empty means no command.
    #[serde(default)]
    pub command: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.paths.output_dir.to_str().unwrap(), "metadata_output");
        assert_eq!(config.discovery.timeout_secs, 30);
        assert!(config.discovery.base_url.is_empty());
        assert_eq!(config.download.timeout_secs, 60);
        assert_eq!(config.download.max_attempts, 1);
        assert_eq!(config.download.delay_ms, 0);
        assert_eq!(config.inventory.min_confidence, Confidence::Weak);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.extraction.command.is_empty());
    }

    #[test]
    fn test_default_ledger_path_under_output_dir() {
        let paths = PathsConfig {
            output_dir: PathBuf::from("/srv/out"),
            ..Default::default()
        };
        assert_eq!(
            paths.ledger_path(),
            PathBuf::from("/srv/out/downloaded_files_database.db")
        );
    }

    #[test]
    fn test_make_absolute_anchors_relative_paths() {
        let mut paths = PathsConfig {
            output_dir: PathBuf::from("metadata_output"),
            download_dir: PathBuf::from("/data/Downloads"),
            ledger_path: Some(PathBuf::from("state/ledger.db")),
        };
        paths.make_absolute(Path::new("/srv/run"));

        assert_eq!(paths.output_dir, PathBuf::from("/srv/run/metadata_output"));
        assert_eq!(paths.download_dir, PathBuf::from("/data/Downloads"));
        assert_eq!(paths.ledger_path(), PathBuf::from("/srv/run/state/ledger.db"));
    }

    #[test]
    fn test_explicit_ledger_path_wins() {
        let toml = r#"
[paths]
output_dir = "/srv/out"
ledger_path = "/srv/ledger.sqlite"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.paths.ledger_path(),
            PathBuf::from("/srv/ledger.sqlite")
        );
    }

    #[test]
    fn test_deserialize_full_download_section() {
        let toml = r#"
[download]
url_template = "http://localhost:9000/doc/{remote_id}"
timeout_secs = 5
max_attempts = 3
retry_backoff_ms = 100
delay_ms = 250
user_agent = "tests"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.download.url_template,
            "http://localhost:9000/doc/{remote_id}"
        );
        assert_eq!(config.download.max_attempts, 3);
        assert_eq!(config.download.retry_backoff_ms, 100);
        assert_eq!(config.download.delay_ms, 250);
        assert_eq!(config.download.user_agent, "tests");
    }

    #[test]
    fn test_deserialize_extraction_and_logging() {
        let toml = r#"
[extraction]
enabled = false
command = ["python3", "extract.py", "--pdf-dir", "{staging_dir}"]

[logging]
format = "json"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(!config.extraction.enabled);
        assert_eq!(config.extraction.command.len(), 4);
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
