//! Downstream extraction trigger.
//!
//! Receives exactly the documents newly satisfied by a run and hands them to
//! the text-extraction step.

mod command;

pub use command::CommandTrigger;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::delta::RunDelta;

/// Errors from the extraction trigger. Never abort a run.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Failed to stage {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Extraction command not found: {0}")]
    CommandNotFound(String),

    #[error("Failed to run extraction command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Extraction command exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },
}

/// Hands a run's delta to downstream processing.
#[async_trait]
pub trait ExtractionTrigger: Send + Sync {
    /// Process the documents of one run's delta.
    async fn trigger(&self, run_id: &str, delta: &RunDelta) -> Result<(), TriggerError>;
}

/// Trigger that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTrigger;

#[async_trait]
impl ExtractionTrigger for NoopTrigger {
    async fn trigger(&self, _run_id: &str, _delta: &RunDelta) -> Result<(), TriggerError> {
        Ok(())
    }
}
