pub mod backfill;
pub mod checksum;
pub mod config;
pub mod delta;
pub mod discovery;
pub mod downloader;
pub mod inventory;
pub mod ledger;
pub mod legacy;
pub mod orchestrator;
pub mod report;
pub mod testing;
pub mod trigger;

pub use backfill::{BackfillError, BackfillReconciler, BackfillReport};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LogFormat,
};
pub use delta::{DeltaItem, RunDelta};
pub use discovery::{
    Agency, DiscoveryError, DiscoverySnapshot, DiscoverySource, HttpDiscoverySource,
    RemoteDocumentRecord,
};
pub use downloader::{DocumentFetcher, DownloadOutcome, Downloader, FetchError, HttpFetcher};
pub use inventory::{Confidence, InventoryScan, InventoryScanner};
pub use ledger::{
    LedgerEntry, LedgerError, LedgerStats, LedgerStatus, LedgerStore, SqliteLedgerStore,
};
pub use legacy::{import_legacy_csv, LegacyError, LegacyImport, LEGACY_METADATA_FILENAME};
pub use orchestrator::{ExtractionStatus, PipelineError, RunOptions, RunOrchestrator, RunSummary};
pub use report::{verify_ledger, VerifyReport};
pub use trigger::{CommandTrigger, ExtractionTrigger, NoopTrigger, TriggerError};
