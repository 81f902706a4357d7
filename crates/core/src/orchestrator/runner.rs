//! Run orchestrator implementation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backfill::{BackfillReconciler, ChecksumConflict, DuplicateFile};
use crate::config::Config;
use crate::delta::RunDelta;
use crate::discovery::{
    AgencyDocuments, DiscoveryError, DiscoverySnapshot, DiscoverySource, MetadataIndex,
    RemoteDocumentRecord,
};
use crate::downloader::{DocumentFetcher, DownloadOutcome, Downloader};
use crate::inventory::InventoryScanner;
use crate::ledger::{LedgerStore, RunRecord};
use crate::report::{
    write_json, DeltaFile, FailedDownload, InventoryReport, MissingRecord, DELTA_FILENAME,
    INVENTORY_REPORT_FILENAME,
};
use crate::trigger::ExtractionTrigger;

use super::config::RunOptions;
use super::types::{ExtractionStatus, PipelineError, RunPhase, RunSummary};

/// Counters gathered while discovering and downloading.
#[derive(Debug, Default)]
struct RunProgress {
    delta: RunDelta,
    attempted: usize,
    already_satisfied: usize,
    metadata_filled: usize,
    agencies_listed: usize,
    agency_failures: usize,
    /// Why the agency listing failed, if it did.
    discovery_error: Option<DiscoveryError>,
    limit_reached: bool,
    failures: Vec<FailedDownload>,
    conflicts: Vec<ChecksumConflict>,
}

/// Drives one incremental acquisition run.
pub struct RunOrchestrator {
    config: Config,
    ledger: Arc<dyn LedgerStore>,
    discovery: Arc<dyn DiscoverySource>,
    fetcher: Arc<dyn DocumentFetcher>,
    trigger: Arc<dyn ExtractionTrigger>,
}

impl RunOrchestrator {
    pub fn new(
        config: Config,
        ledger: Arc<dyn LedgerStore>,
        discovery: Arc<dyn DiscoverySource>,
        fetcher: Arc<dyn DocumentFetcher>,
        trigger: Arc<dyn ExtractionTrigger>,
    ) -> Self {
        Self {
            config,
            ledger,
            discovery,
            fetcher,
            trigger,
        }
    }

    /// Run the pipeline once.
    ///
    /// Returns `Err` for failures of shared state: directories, ledger,
    /// artifacts. An unreachable agency listing is also an error, but only
    /// after the backfill, the run record and the artifacts are written.
    /// Everything that concerns a single document or agency is counted in
    /// the summary instead.
    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary, PipelineError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let output_dir = absolute_dir(&self.config.paths.output_dir).await?;
        let download_dir = absolute_dir(&self.config.paths.download_dir).await?;
        let output_dir = output_dir.as_path();
        let download_dir = download_dir.as_path();

        info!(run_id = %run_id, phase = %RunPhase::PreflightBackfill, limit = ?options.limit, "Run started");
        let previous = self.load_previous_snapshot(output_dir).await;
        let index = previous
            .as_ref()
            .map(MetadataIndex::from_snapshot)
            .unwrap_or_default();
        let scan = InventoryScanner::new(download_dir, self.config.inventory.min_confidence)
            .scan(self.ledger.as_ref())
            .await?;
        for unmatched in &scan.unmatched {
            warn!(path = %unmatched.path.display(), "Local file has no recognizable remote id");
        }
        let backfill = BackfillReconciler::new(self.ledger.as_ref(), &index)
            .reconcile(&scan)
            .await?;

        let mut progress = RunProgress {
            delta: backfill.recorded.iter().cloned().collect(),
            ..Default::default()
        };
        let backfilled = progress.delta.len();

        let snapshot = self
            .discover_and_download(options, download_dir, &mut progress)
            .await?;

        let missing = self.missing_records(&snapshot)?;
        let finished_at = Utc::now();
        let failed = progress.failures.len();
        let integrity_conflicts = backfill.conflicts.len() + progress.conflicts.len();

        self.ledger.record_run(&RunRecord {
            run_id: run_id.clone(),
            started_at,
            finished_at,
            download_limit: options.limit,
            failed_downloads: failed as u32,
            delta: progress.delta.clone(),
        })?;

        let delta_file = DeltaFile {
            run_id: &run_id,
            finished_at,
            documents: &progress.delta,
        };
        write_artifact(output_dir, DELTA_FILENAME, &delta_file).await?;

        let unmatched_files = scan.unmatched.len();
        let mut conflicts = backfill.conflicts;
        conflicts.extend(progress.conflicts);
        let mut duplicates: Vec<DuplicateFile> = scan
            .recorded_copies
            .into_iter()
            .map(|copy| DuplicateFile {
                remote_id: copy.remote_id,
                kept: copy.recorded,
                duplicate: copy.path,
            })
            .collect();
        duplicates.extend(backfill.duplicates);
        let report = InventoryReport {
            run_id: run_id.clone(),
            unmatched: scan.unmatched,
            stale_partials: scan.stale_partials,
            missing: missing.clone(),
            duplicates,
            content_duplicates: backfill.content_duplicates,
            hash_failures: backfill.hash_failures,
            failed_downloads: progress.failures,
            conflicts,
        };
        write_artifact(output_dir, INVENTORY_REPORT_FILENAME, &report).await?;

        // an unreachable API must not wipe the previous run's metadata
        if progress.discovery_error.is_none() {
            let mut snapshot = snapshot;
            if let Some(previous) = previous {
                let carried = snapshot.carry_forward(previous);
                debug!(carried, "Kept records from the previous snapshot");
            }
            snapshot
                .save(output_dir)
                .await
                .map_err(|source| PipelineError::Artifact {
                    path: DiscoverySnapshot::path_in(output_dir),
                    source,
                })?;
        }

        let extraction = self.run_extraction(&run_id, options, &progress.delta).await;

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at,
            phase: RunPhase::Done,
            backfilled,
            attempted: progress.attempted,
            downloaded: progress.delta.downloaded_count(),
            failed,
            already_satisfied: progress.already_satisfied,
            metadata_filled: progress.metadata_filled,
            integrity_conflicts,
            agencies_listed: progress.agencies_listed,
            agency_failures: progress.agency_failures,
            limit_reached: progress.limit_reached,
            missing: missing.len(),
            unmatched_files,
            extraction,
            delta: progress.delta,
        };

        if let Some(limit) = options.limit {
            if !summary.limit_reached {
                info!(
                    limit,
                    downloaded = summary.downloaded,
                    "Fewer new documents available than the limit"
                );
            }
        }
        info!(
            run_id = %summary.run_id,
            phase = %summary.phase,
            backfilled = summary.backfilled,
            attempted = summary.attempted,
            downloaded = summary.downloaded,
            failed = summary.failed,
            already_satisfied = summary.already_satisfied,
            integrity_conflicts = summary.integrity_conflicts,
            limit_reached = summary.limit_reached,
            "Run finished"
        );

        match progress.discovery_error {
            Some(e) => Err(PipelineError::Discovery(e)),
            None => Ok(summary),
        }
    }

    async fn load_previous_snapshot(&self, output_dir: &Path) -> Option<DiscoverySnapshot> {
        match DiscoverySnapshot::load(output_dir).await {
            Ok(Some(snapshot)) => {
                debug!(records = snapshot.record_count(), "Loaded previous discovery snapshot");
                Some(snapshot)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Previous discovery snapshot unreadable, backfilling without metadata");
                None
            }
        }
    }

    async fn discover_and_download(
        &self,
        options: &RunOptions,
        download_dir: &Path,
        progress: &mut RunProgress,
    ) -> Result<DiscoverySnapshot, PipelineError> {
        let mut snapshot = DiscoverySnapshot::new();

        info!(phase = %RunPhase::Discovering, source = self.discovery.name(), "Listing agencies");
        let agencies = match self.discovery.agencies().await {
            Ok(agencies) => agencies,
            Err(e) => {
                error!(error = %e, "Agency listing failed, finishing with backfill only");
                progress.discovery_error = Some(e);
                return Ok(snapshot);
            }
        };
        progress.agencies_listed = agencies.len();
        info!(phase = %RunPhase::Downloading, agencies = agencies.len(), "Discovering documents");

        let downloader = Downloader::new(
            self.ledger.clone(),
            self.fetcher.clone(),
            download_dir,
            &self.config.download,
        );

        for agency in agencies {
            if options.limit_reached(progress.delta.downloaded_count()) {
                progress.limit_reached = true;
                break;
            }

            let records = match self.discovery.documents(&agency).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(agency_id = %agency.agency_id, error = %e, "Failed to list agency documents");
                    progress.agency_failures += 1;
                    continue;
                }
            };
            debug!(agency_id = %agency.agency_id, records = records.len(), "Agency documents listed");

            let hit_limit = self
                .download_records(&downloader, &records, options, progress)
                .await?;
            snapshot.push(AgencyDocuments { agency, records });

            if hit_limit {
                progress.limit_reached = true;
                break;
            }
        }

        Ok(snapshot)
    }

    /// Returns whether the download limit was reached.
    async fn download_records(
        &self,
        downloader: &Downloader,
        records: &[RemoteDocumentRecord],
        options: &RunOptions,
        progress: &mut RunProgress,
    ) -> Result<bool, PipelineError> {
        let delay = Duration::from_millis(self.config.download.delay_ms);

        for record in records {
            if options.limit_reached(progress.delta.downloaded_count()) {
                return Ok(true);
            }

            match downloader.download(record).await? {
                DownloadOutcome::AlreadySatisfied { metadata_filled } => {
                    progress.already_satisfied += 1;
                    if metadata_filled {
                        progress.metadata_filled += 1;
                    }
                }
                DownloadOutcome::Downloaded(item) => {
                    progress.attempted += 1;
                    progress.delta.push(item);
                    let downloaded = progress.delta.downloaded_count();
                    match options.limit {
                        Some(limit) => info!(remote_id = %record.remote_id, "Downloaded new file {}/{}", downloaded, limit),
                        None => info!(remote_id = %record.remote_id, "Downloaded new file {}", downloaded),
                    }
                    if options.limit_reached(downloaded) {
                        return Ok(true);
                    }
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                DownloadOutcome::Failed { error } => {
                    progress.attempted += 1;
                    progress.failures.push(FailedDownload {
                        remote_id: record.remote_id.clone(),
                        error,
                    });
                }
                DownloadOutcome::Conflict(conflict) => {
                    progress.attempted += 1;
                    progress.conflicts.push(conflict);
                }
            }
        }

        Ok(false)
    }

    /// Records seen this run that the ledger does not consider satisfied.
    fn missing_records(&self, snapshot: &DiscoverySnapshot) -> Result<Vec<MissingRecord>, PipelineError> {
        let mut seen = HashSet::new();
        let mut missing = Vec::new();

        for record in snapshot.records() {
            if !seen.insert(record.remote_id.as_str()) {
                continue;
            }
            let satisfied = self
                .ledger
                .get(&record.remote_id)?
                .is_some_and(|e| e.is_satisfied());
            if !satisfied {
                missing.push(MissingRecord {
                    remote_id: record.remote_id.clone(),
                    agency_id: record.agency_id.clone(),
                    title: record.title.clone(),
                });
            }
        }
        Ok(missing)
    }

    async fn run_extraction(
        &self,
        run_id: &str,
        options: &RunOptions,
        delta: &RunDelta,
    ) -> ExtractionStatus {
        if options.skip_extraction || !self.config.extraction.enabled {
            info!("Extraction skipped");
            return ExtractionStatus::Skipped;
        }

        match self.trigger.trigger(run_id, delta).await {
            Ok(()) => ExtractionStatus::Completed,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Extraction failed");
                ExtractionStatus::Failed(e.to_string())
            }
        }
    }
}

/// Create `path` if needed and return its absolute, canonical form, so that
/// every path recorded in the ledger is valid from any working directory.
async fn absolute_dir(path: &Path) -> Result<PathBuf, PipelineError> {
    let err = |source: std::io::Error| PipelineError::CreateDir {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::create_dir_all(path).await.map_err(err)?;
    tokio::fs::canonicalize(path).await.map_err(err)
}

async fn write_artifact<T: serde::Serialize>(
    output_dir: &Path,
    file_name: &str,
    value: &T,
) -> Result<(), PipelineError> {
    write_json(output_dir, file_name, value)
        .await
        .map(|_| ())
        .map_err(|source| PipelineError::Artifact {
            path: output_dir.join(file_name),
            source,
        })
}
