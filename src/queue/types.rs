//! Task queue type definitions.
//!
//! Defines [`TaskStatus`] (the task state machine's states), [`Task`] (a full
//! queue row), [`AnalysisResult`] (the terminal outcome of a task), and
//! [`QueueStats`].

use serde::{Deserialize, Serialize};

use crate::memory::types::Recommendation;

/// States of the task lifecycle. Transitions only move forward:
/// Pending → Processing → {Processed, Failed}, with Pending → Abandoned as
/// the only cancellation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Processed,
    Failed,
    Abandoned,
}

impl TaskStatus {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }

    /// No further transition occurs from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Failed | Self::Abandoned)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("unknown task status: {s}")),
        }
    }
}

/// A queued analysis request, matching the `tasks` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Monotonically assigned id; FIFO order is ascending id.
    pub id: i64,
    /// The raw submitted query (keyword or investment range).
    pub query: String,
    /// Normalized form of the query.
    pub fingerprint: String,
    pub status: TaskStatus,
    /// Delivery attempts consumed so far.
    pub attempt_count: u32,
    /// Earliest time this task is eligible for dequeue (backoff gate).
    pub not_before: String,
    /// Reason for the most recent failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// ISO 8601 submission timestamp.
    pub submitted_at: String,
    /// ISO 8601 last-transition timestamp.
    pub updated_at: String,
}

/// Terminal outcome of a task, matching the `results` table schema.
///
/// Exactly one exists per Processed or Failed task. For a Failed task the
/// product fields are `None` and `analysis` carries the failure reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub task_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub analysis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
    /// Whether a recalled memory record was fed into the analysis.
    pub past_memory_used: bool,
    pub status: TaskStatus,
}

impl AnalysisResult {
    /// Successful outcome.
    pub fn processed(
        task_id: i64,
        product_title: impl Into<String>,
        price: f64,
        analysis: impl Into<String>,
        recommendation: Recommendation,
        past_memory_used: bool,
    ) -> Self {
        Self {
            task_id,
            product_title: Some(product_title.into()),
            price: Some(price),
            analysis: analysis.into(),
            recommendation: Some(recommendation),
            past_memory_used,
            status: TaskStatus::Processed,
        }
    }

    /// Terminal failure outcome; `reason` lands in the analysis column.
    pub fn failed(task_id: i64, reason: impl Into<String>) -> Self {
        Self {
            task_id,
            product_title: None,
            price: None,
            analysis: reason.into(),
            recommendation: None,
            past_memory_used: false,
            status: TaskStatus::Failed,
        }
    }
}

/// Counts by status plus current queue depth.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub processed: u64,
    pub failed: u64,
    pub abandoned: u64,
}

impl QueueStats {
    /// Tasks still waiting for or undergoing processing.
    pub fn depth(&self) -> u64 {
        self.pending + self.processing
    }
}
