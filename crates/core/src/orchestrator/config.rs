//! Per-invocation run options.

use serde::{Deserialize, Serialize};

/// Options for one pipeline run, usually taken from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Stop once this many documents were newly downloaded.
    /// Backfilled documents and no-ops do not count. `None` is unbounded.
    #[serde(default)]
    pub limit: Option<u32>,

    /// Do not invoke the extraction trigger, even when configured.
    #[serde(default)]
    pub skip_extraction: bool,
}

impl RunOptions {
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip_extraction(mut self) -> Self {
        self.skip_extraction = true;
        self
    }

    /// Whether `downloaded` new documents exhaust the limit.
    pub fn limit_reached(&self, downloaded: usize) -> bool {
        self.limit.is_some_and(|limit| downloaded >= limit as usize)
    }
}
