//! Recorded paths must not depend on the working directory.
//!
//! Kept in its own test binary: it changes the process working directory.

use std::sync::Arc;

use tempfile::TempDir;

use docketeer_core::{
    testing::{fixtures, MockDiscoverySource, MockFetcher, MockTrigger},
    verify_ledger, Config, LedgerStore, RunOptions, RunOrchestrator, SqliteLedgerStore,
};

#[tokio::test]
async fn test_ledger_verifies_from_another_directory() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let run_dir = temp.path().join("run");
    let elsewhere = temp.path().join("elsewhere");
    std::fs::create_dir_all(&run_dir).unwrap();
    std::fs::create_dir_all(&elsewhere).unwrap();
    std::env::set_current_dir(&run_dir).unwrap();

    // relative defaults: Downloads/ and metadata_output/
    let config = Config::default();
    assert!(config.paths.download_dir.is_relative());
    let ledger = Arc::new(SqliteLedgerStore::open(&run_dir.join("ledger.db")).unwrap());
    let discovery = Arc::new(MockDiscoverySource::new());
    discovery.add_agency("AG-1", "Sunrise", fixtures::records(1, 2)).await;

    let summary = RunOrchestrator::new(
        config,
        ledger.clone(),
        discovery,
        Arc::new(MockFetcher::new()),
        Arc::new(MockTrigger::new()),
    )
    .run(&RunOptions::default())
    .await
    .expect("Run failed");
    assert_eq!(summary.downloaded, 2);

    for entry in ledger.all().unwrap() {
        let path = entry.local_path.expect("downloaded entry has a path");
        assert!(path.is_absolute(), "{}", path.display());
    }

    std::env::set_current_dir(&elsewhere).unwrap();
    let report = verify_ledger(ledger.as_ref()).await.unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.verified, 2);
    assert!(report.missing.is_empty());
}
