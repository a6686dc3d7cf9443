//! Result sinks for finished runs

use crate::error::{EngineError, EngineResult};
use crate::stats::TestStatistics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// Summary of one run handed to a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: Uuid,
    pub url: String,
    pub method: String,
    /// Status of the first response, 0 if it failed at transport level
    pub status: u16,
    /// Wall-clock seconds
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<TestStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Persists run summaries. Failures are reported to the caller, who must not
/// let them fail the run.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, record: &RunRecord) -> EngineResult<()>;
}

/// Discards every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl ResultSink for NullSink {
    async fn record(&self, _record: &RunRecord) -> EngineResult<()> {
        Ok(())
    }
}

/// Appends one JSON object per line to a file
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultSink for JsonLinesSink {
    async fn record(&self, record: &RunRecord) -> EngineResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_vec(record)
            .map_err(|e| EngineError::Sink(format!("failed to encode run record: {}", e)))?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        debug!("Recorded run {} to {}", record.run_id, self.path.display());
        Ok(())
    }
}
