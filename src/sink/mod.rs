//! Result sink — best-effort export of terminal results.
//!
//! The sink is an observer, not part of the core state: by the time `record`
//! runs the task is already terminal, so a sink failure is logged and
//! otherwise ignored. [`JsonlSink`] appends one JSON object per result to a
//! file (the spreadsheet view's feed); [`LogSink`] just traces.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::queue::types::AnalysisResult;

/// Destination for terminal results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, result: &AnalysisResult) -> Result<()>;
}

/// Appends each result as a JSON line.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ResultSink for JsonlSink {
    async fn record(&self, result: &AnalysisResult) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut line = serde_json::to_string(result).context("failed to serialize result")?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .context("failed to append result")?;
        file.flush().await.context("failed to flush result")?;
        Ok(())
    }
}

/// Traces each result; useful when no export file is configured.
pub struct LogSink;

#[async_trait]
impl ResultSink for LogSink {
    async fn record(&self, result: &AnalysisResult) -> Result<()> {
        info!(
            task_id = result.task_id,
            status = %result.status,
            recommendation = result.recommendation.map(|r| r.as_str()),
            past_memory_used = result.past_memory_used,
            "result recorded"
        );
        Ok(())
    }
}
