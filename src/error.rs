//! Error taxonomy for the queue, memory tiers, and external analyzer.
//!
//! The split matters for retry routing: [`AnalyzerError`]s and
//! [`MemoryError::LongTerm`] are handed to the queue's retry machinery,
//! [`MemoryError::ShortTerm`] is logged and swallowed, and [`QueueError`]s
//! surface directly to the caller.

use thiserror::Error;

/// Task queue failures.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The backing store is unreachable. No task was created or mutated.
    #[error("queue backing store unavailable: {0}")]
    Unavailable(String),

    #[error("unknown task: {0}")]
    UnknownTask(i64),

    /// The requested transition is not legal from the task's current status.
    #[error("invalid transition for task {id}: {from} -> {to}")]
    InvalidTransition {
        id: i64,
        from: &'static str,
        to: &'static str,
    },
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        QueueError::Unavailable(e.to_string())
    }
}

/// External analysis call failures. All variants are retryable via the
/// queue's backoff policy.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("analysis call timed out")]
    Timeout,

    #[error("analyzer rate limited")]
    RateLimited,

    /// The analyzer responded, but not in the expected structure.
    #[error("malformed analyzer response: {0}")]
    Malformed(String),

    #[error("analyzer transport error: {0}")]
    Http(String),
}

/// Memory tier write failures.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Short-term cache failure. Non-fatal: the analysis proceeds without
    /// caching.
    #[error("short-term memory failed: {0}")]
    ShortTerm(String),

    /// Long-term store failure. Fatal to the task's completion: the
    /// historical record is part of the result.
    #[error("long-term memory failed: {0}")]
    LongTerm(String),
}

impl From<rusqlite::Error> for MemoryError {
    fn from(e: rusqlite::Error) -> Self {
        MemoryError::LongTerm(e.to_string())
    }
}
