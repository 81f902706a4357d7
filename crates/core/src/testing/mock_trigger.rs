//! Mock extraction trigger for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::delta::RunDelta;
use crate::trigger::{ExtractionTrigger, TriggerError};

/// A recorded trigger call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedTrigger {
    pub run_id: String,
    pub delta: RunDelta,
}

/// Mock implementation of the ExtractionTrigger trait.
#[derive(Debug, Default)]
pub struct MockTrigger {
    calls: Arc<RwLock<Vec<RecordedTrigger>>>,
    fail: Arc<RwLock<bool>>,
}

impl MockTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recorded_calls(&self) -> Vec<RecordedTrigger> {
        self.calls.read().await.clone()
    }

    /// Make every call fail after being recorded.
    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }
}

#[async_trait]
impl ExtractionTrigger for MockTrigger {
    async fn trigger(&self, run_id: &str, delta: &RunDelta) -> Result<(), TriggerError> {
        self.calls.write().await.push(RecordedTrigger {
            run_id: run_id.to_string(),
            delta: delta.clone(),
        });
        if *self.fail.read().await {
            return Err(TriggerError::CommandFailed {
                status: "exit status: 1".to_string(),
                stderr: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}
