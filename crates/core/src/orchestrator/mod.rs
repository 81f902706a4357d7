//! Run orchestrator.
//!
//! One run walks `PreflightBackfill -> Discovering -> Downloading -> Done`
//! exactly once, on a single sequential control flow:
//! - **PreflightBackfill**: record unverified local files before any fetch
//! - **Discovering/Downloading**: agency by agency, record by record, in API
//!   order, until discovery is exhausted or the download limit is hit
//! - **Done**: persist the run, write artifacts, hand the delta to extraction

mod config;
mod runner;
mod types;

pub use config::RunOptions;
pub use runner::RunOrchestrator;
pub use types::{ExtractionStatus, PipelineError, RunPhase, RunSummary};
