//! Pipeline lifecycle integration tests.
//!
//! These tests drive whole runs through the orchestrator against a temp
//! directory, a file-backed ledger and mocked network seams:
//! preflight backfill -> discovery -> downloads -> delta and extraction

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use docketeer_core::{
    checksum::{sha256_file, sha256_hex},
    inventory::document_filename,
    report::{DELTA_FILENAME, INVENTORY_REPORT_FILENAME},
    testing::{fixtures, MockDiscoverySource, MockFetcher, MockTrigger},
    import_legacy_csv, Config, LedgerStatus, LedgerStore, RunOptions, RunOrchestrator,
    SqliteLedgerStore, LEGACY_METADATA_FILENAME,
};

/// Test helper holding all dependencies of a run.
struct TestHarness {
    config: Config,
    ledger: Arc<SqliteLedgerStore>,
    discovery: Arc<MockDiscoverySource>,
    fetcher: Arc<MockFetcher>,
    trigger: Arc<MockTrigger>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = Config::default();
        config.paths.output_dir = temp_dir.path().join("metadata_output");
        config.paths.download_dir = temp_dir.path().join("Downloads");

        let ledger = Arc::new(
            SqliteLedgerStore::open(&config.paths.ledger_path()).expect("Failed to open ledger"),
        );

        Self {
            config,
            ledger,
            discovery: Arc::new(MockDiscoverySource::new()),
            fetcher: Arc::new(MockFetcher::new()),
            trigger: Arc::new(MockTrigger::new()),
            _temp_dir: temp_dir,
        }
    }

    fn download_dir(&self) -> PathBuf {
        self.config.paths.download_dir.clone()
    }

    async fn run(&self, options: RunOptions) -> docketeer_core::RunSummary {
        RunOrchestrator::new(
            self.config.clone(),
            self.ledger.clone(),
            self.discovery.clone(),
            self.fetcher.clone(),
            self.trigger.clone(),
        )
        .run(&options)
        .await
        .expect("Run failed")
    }
}

#[tokio::test]
async fn test_second_run_downloads_nothing() {
    let h = TestHarness::new();
    h.discovery.add_agency("AG-1", "Sunrise Family Services", fixtures::records(1, 3)).await;
    h.discovery.add_agency("AG-2", "Lakeside Homes", fixtures::records(2, 2)).await;

    let first = h.run(RunOptions::default()).await;
    assert_eq!(first.downloaded, 5);
    assert_eq!(h.fetcher.fetch_count().await, 5);

    h.fetcher.clear_fetched().await;
    let second = h.run(RunOptions::default()).await;

    assert_eq!(second.downloaded, 0);
    assert_eq!(second.already_satisfied, 5);
    assert!(second.delta.is_empty());
    assert_eq!(h.fetcher.fetch_count().await, 0);
    assert_eq!(h.ledger.all().unwrap().len(), 5);
}

#[tokio::test]
async fn test_limit_counts_only_new_downloads() {
    let h = TestHarness::new();
    let records = fixtures::records(1, 7);
    let ids: Vec<String> = records.iter().map(|r| r.remote_id.clone()).collect();
    h.discovery.add_agency("AG-1", "Sunrise", records).await;

    let first = h.run(RunOptions::default().with_limit(5)).await;
    assert_eq!(first.downloaded, 5);
    assert!(first.limit_reached);
    let first_ids: Vec<&str> = first.delta.remote_ids().collect();
    assert_eq!(first_ids, ids[..5].iter().map(String::as_str).collect::<Vec<_>>());

    let entries = h.ledger.all().unwrap();
    assert_eq!(entries.len(), 5);
    assert!(entries.iter().all(|e| e.status == LedgerStatus::Downloaded));
    assert!(h.ledger.get(&ids[5]).unwrap().is_none());
    assert!(h.ledger.get(&ids[6]).unwrap().is_none());

    let second = h.run(RunOptions::default().with_limit(5)).await;
    assert_eq!(second.downloaded, 2);
    assert!(!second.limit_reached);
    let second_ids: Vec<&str> = second.delta.remote_ids().collect();
    assert_eq!(second_ids, ids[5..].iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(second.already_satisfied, 5);
}

#[tokio::test]
async fn test_limit_zero_downloads_nothing() {
    let h = TestHarness::new();
    h.discovery.add_agency("AG-1", "Sunrise", fixtures::records(1, 2)).await;

    let summary = h.run(RunOptions::default().with_limit(0)).await;

    assert_eq!(summary.downloaded, 0);
    assert!(summary.limit_reached);
    assert_eq!(h.fetcher.fetch_count().await, 0);
}

#[tokio::test]
async fn test_orphan_local_file_is_backfilled_not_downloaded() {
    let h = TestHarness::new();
    let records = fixtures::records(1, 3);
    let orphan = records[1].clone();

    tokio::fs::create_dir_all(h.download_dir()).await.unwrap();
    let orphan_path = h.download_dir().join(document_filename(&orphan));
    tokio::fs::write(&orphan_path, b"bytes from an earlier manual download")
        .await
        .unwrap();
    h.discovery.add_agency("AG-1", "Sunrise", records).await;

    let summary = h.run(RunOptions::default()).await;

    // backfill came first, so the orphan was never fetched
    let fetched = h.fetcher.fetched().await;
    assert!(!fetched.contains(&orphan.remote_id));
    assert_eq!(fetched.len(), 2);

    assert_eq!(summary.backfilled, 1);
    assert_eq!(summary.downloaded, 2);
    assert_eq!(summary.delta.len(), 3);
    assert_eq!(summary.delta.items()[0].remote_id, orphan.remote_id);
    assert_eq!(summary.delta.items()[0].status, LedgerStatus::BackfilledFromDisk);

    let entry = h.ledger.get(&orphan.remote_id).unwrap().unwrap();
    assert_eq!(entry.status, LedgerStatus::BackfilledFromDisk);
    assert_eq!(
        entry.checksum.as_deref(),
        Some(sha256_hex(b"bytes from an earlier manual download").as_str())
    );
}

#[tokio::test]
async fn test_undiscovered_local_file_is_backfilled() {
    let h = TestHarness::new();
    let unknown_id = fixtures::remote_id(9999);
    tokio::fs::create_dir_all(h.download_dir()).await.unwrap();
    tokio::fs::write(
        h.download_dir().join(format!("retired_2019-01-01_old-report_{}.pdf", unknown_id)),
        b"retired document",
    )
    .await
    .unwrap();
    h.discovery.add_agency("AG-1", "Sunrise", fixtures::records(1, 1)).await;

    let summary = h.run(RunOptions::default()).await;

    let entry = h.ledger.get(&unknown_id).unwrap().unwrap();
    assert_eq!(entry.status, LedgerStatus::BackfilledFromDisk);
    assert!(summary.delta.contains(&unknown_id));
    assert_eq!(summary.missing, 0);
}

#[tokio::test]
async fn test_backfill_uses_previous_snapshot_metadata() {
    let h = TestHarness::new();
    let records = fixtures::records(1, 1);
    let record = records[0].clone();
    h.discovery.add_agency("AG-1", "Sunrise", records).await;
    h.fetcher.fail_for(&record.remote_id).await;

    // first run only discovers; the fetch fails
    let first = h.run(RunOptions::default()).await;
    assert_eq!(first.failed, 1);

    // the document then shows up on disk by other means
    let path = h.download_dir().join(format!("manual_{}.pdf", record.remote_id));
    tokio::fs::write(&path, b"manual copy").await.unwrap();

    let second = h.run(RunOptions::default()).await;
    assert_eq!(second.backfilled, 1);
    let entry = h.ledger.get(&record.remote_id).unwrap().unwrap();
    assert_eq!(entry.metadata.title.as_deref(), Some(record.title.as_str()));
    assert_eq!(entry.metadata.agency_name.as_deref(), Some("Sunrise"));
}

#[tokio::test]
async fn test_limited_run_keeps_metadata_of_agencies_it_did_not_reach() {
    let h = TestHarness::new();
    let sunrise = fixtures::records(1, 2);
    let lakeside = fixtures::records(2, 1);
    let later = sunrise[1].remote_id.clone();
    let unreached = lakeside[0].clone();
    h.discovery.add_agency("AG-1", "Sunrise", sunrise).await;
    h.discovery.add_agency("AG-2", "Lakeside", lakeside).await;
    h.fetcher.fail_for(&later).await;
    h.fetcher.fail_for(&unreached.remote_id).await;

    let first = h.run(RunOptions::default()).await;
    assert_eq!(first.downloaded, 1);
    assert_eq!(first.failed, 2);

    // stops inside AG-1, so AG-2 is not listed this time
    h.fetcher.succeed_for(&later).await;
    let second = h.run(RunOptions::default().with_limit(1)).await;
    assert_eq!(second.downloaded, 1);
    assert!(second.limit_reached);
    assert_eq!(h.discovery.document_requests().await, vec!["AG-1", "AG-2", "AG-1"]);

    let path = h.download_dir().join(format!("manual_{}.pdf", unreached.remote_id));
    tokio::fs::write(&path, b"manual copy").await.unwrap();
    let third = h.run(RunOptions::default().with_limit(0)).await;

    assert_eq!(third.backfilled, 1);
    let entry = h.ledger.get(&unreached.remote_id).unwrap().unwrap();
    assert_eq!(entry.status, LedgerStatus::BackfilledFromDisk);
    assert_eq!(entry.metadata.title.as_deref(), Some(unreached.title.as_str()));
    assert_eq!(entry.metadata.agency_name.as_deref(), Some("Lakeside"));
}

#[tokio::test]
async fn test_legacy_csv_file_is_backfilled_with_its_metadata() {
    let h = TestHarness::new();
    let records = fixtures::records(1, 2);
    let legacy = records[0].clone();
    tokio::fs::create_dir_all(h.download_dir()).await.unwrap();
    let legacy_path = h.download_dir().join("Sunrise Inspection.pdf");
    tokio::fs::write(&legacy_path, b"saved by the old tool").await.unwrap();

    let csv_path = h.download_dir().join(LEGACY_METADATA_FILENAME);
    tokio::fs::write(
        &csv_path,
        format!(
            "ContentDocumentId,agency_name,Title,downloaded_filename\n\
             {},Sunrise,Annual Inspection,Sunrise Inspection.pdf\n",
            legacy.remote_id
        ),
    )
    .await
    .unwrap();
    let import = import_legacy_csv(&csv_path, &h.download_dir(), h.ledger.as_ref()).unwrap();
    assert_eq!(import.inserted, 1);
    assert_eq!(import.with_local_file, 1);

    h.discovery.add_agency("AG-1", "Sunrise", records.clone()).await;
    let summary = h.run(RunOptions::default()).await;

    assert_eq!(h.fetcher.fetched().await, vec![records[1].remote_id.clone()]);
    assert_eq!(summary.backfilled, 1);
    assert_eq!(summary.downloaded, 1);

    let entry = h.ledger.get(&legacy.remote_id).unwrap().unwrap();
    assert_eq!(entry.status, LedgerStatus::BackfilledFromDisk);
    assert_eq!(entry.local_path, Some(legacy_path));
    assert_eq!(entry.metadata.title.as_deref(), Some("Annual Inspection"));
    assert_eq!(
        entry.checksum.as_deref(),
        Some(sha256_hex(b"saved by the old tool").as_str())
    );
}

#[tokio::test]
async fn test_recorded_checksums_match_files_on_disk() {
    let h = TestHarness::new();
    h.discovery.add_agency("AG-1", "Sunrise", fixtures::records(1, 4)).await;

    h.run(RunOptions::default()).await;

    let entries = h.ledger.all().unwrap();
    assert_eq!(entries.len(), 4);
    for entry in entries {
        let path = entry.local_path.expect("satisfied entry has a path");
        let on_disk = sha256_file(&path).await.unwrap();
        assert_eq!(entry.checksum.as_deref(), Some(on_disk.as_str()));
    }
}

#[tokio::test]
async fn test_failed_fetch_leaves_no_entry_or_partial() {
    let h = TestHarness::new();
    let records = fixtures::records(1, 2);
    let broken = records[0].remote_id.clone();
    h.discovery.add_agency("AG-1", "Sunrise", records).await;
    h.fetcher.fail_for(&broken).await;

    let summary = h.run(RunOptions::default()).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.downloaded, 1);
    assert!(h.ledger.get(&broken).unwrap().is_none());

    let mut dir = tokio::fs::read_dir(h.download_dir()).await.unwrap();
    let mut names = Vec::new();
    while let Some(entry) = dir.next_entry().await.unwrap() {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    assert_eq!(names.len(), 1);
    assert!(!names[0].contains(&broken));
    assert!(!names[0].ends_with(".part"));
}

#[tokio::test]
async fn test_extraction_receives_exactly_the_delta() {
    let h = TestHarness::new();
    h.discovery.add_agency("AG-1", "Sunrise", fixtures::records(1, 2)).await;
    h.run(RunOptions::default()).await;

    h.discovery.add_agency("AG-2", "Lakeside", fixtures::records(2, 1)).await;
    let second = h.run(RunOptions::default()).await;

    let calls = h.trigger.recorded_calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].delta.len(), 2);
    assert_eq!(calls[1].run_id, second.run_id);
    assert_eq!(calls[1].delta, second.delta);
    assert_eq!(
        calls[1].delta.remote_ids().collect::<Vec<_>>(),
        vec![fixtures::remote_id(2001).as_str()]
    );
}

#[tokio::test]
async fn test_run_artifacts_are_written() {
    let h = TestHarness::new();
    tokio::fs::create_dir_all(h.download_dir()).await.unwrap();
    tokio::fs::write(h.download_dir().join("notes.txt"), b"not a document")
        .await
        .unwrap();
    h.discovery.add_agency("AG-1", "Sunrise", fixtures::records(1, 1)).await;

    let summary = h.run(RunOptions::default()).await;
    let output_dir = &h.config.paths.output_dir;

    let delta: serde_json::Value = serde_json::from_slice(
        &tokio::fs::read(output_dir.join(DELTA_FILENAME)).await.unwrap(),
    )
    .unwrap();
    assert_eq!(delta["run_id"], summary.run_id.as_str());
    assert_eq!(delta["documents"].as_array().unwrap().len(), 1);

    let report: serde_json::Value = serde_json::from_slice(
        &tokio::fs::read(output_dir.join(INVENTORY_REPORT_FILENAME))
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(report["unmatched"].as_array().unwrap().len(), 1);
    assert_eq!(report["unmatched"][0]["reason"], "no_identifier");
    assert_eq!(summary.unmatched_files, 1);

    let latest = h.ledger.latest_run().unwrap().unwrap();
    assert_eq!(latest.run_id, summary.run_id);
    assert_eq!(latest.delta.len(), 1);
}
