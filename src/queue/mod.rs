//! Durable FIFO task queue over SQLite.
//!
//! [`TaskQueue`] owns every status transition. Claims run inside a
//! transaction so a task is never handed out twice; retries are modeled as an
//! explicit Pending transition with an `attempt_count` and a `not_before`
//! backoff gate rather than re-insertion, so a retried task keeps its
//! original submission-order position. Every transition appends a `task_log`
//! row — that log is the status-changed event stream reporting collaborators
//! consume.

pub mod types;

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::memory::types::fingerprint;
use types::{AnalysisResult, QueueStats, Task, TaskStatus};

/// Fixed-width UTC timestamp so lexicographic comparison in SQL matches
/// chronological order.
fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

const TASK_COLUMNS: &str =
    "id, query, fingerprint, status, attempt_count, not_before, last_error, submitted_at, updated_at";

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get(3)?;
    Ok(Task {
        id: row.get(0)?,
        query: row.get(1)?,
        fingerprint: row.get(2)?,
        status: status.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        attempt_count: row.get(4)?,
        not_before: row.get(5)?,
        last_error: row.get(6)?,
        submitted_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Handle to the durable queue. Cheap to clone; all clones share the
/// underlying store, so intake sources and the worker can hold their own.
#[derive(Clone)]
pub struct TaskQueue {
    db: Arc<Mutex<Connection>>,
    config: QueueConfig,
}

impl TaskQueue {
    pub fn new(db: Arc<Mutex<Connection>>, config: QueueConfig) -> Self {
        Self { db, config }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.db
            .lock()
            .map_err(|_| QueueError::Unavailable("db lock poisoned".into()))
    }

    /// Append a Pending task. Returns its id; submission order is id order.
    pub fn enqueue(&self, query: &str) -> Result<i64, QueueError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = now_stamp();

        tx.execute(
            "INSERT INTO tasks (query, fingerprint, status, attempt_count, not_before, submitted_at, updated_at) \
             VALUES (?1, ?2, 'pending', 0, ?3, ?3, ?3)",
            params![query, fingerprint(query), now],
        )?;
        let id = tx.last_insert_rowid();

        log_transition(&tx, id, None, TaskStatus::Pending, None)?;
        tx.commit()?;

        info!(task_id = id, query, "task enqueued");
        Ok(id)
    }

    /// Claim the oldest eligible Pending task, atomically marking it
    /// Processing. Returns `None` when nothing is eligible.
    pub fn dequeue(&self) -> Result<Option<Task>, QueueError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = now_stamp();

        // Oldest-first among eligible tasks; a retried task's original id
        // keeps it ahead of anything submitted after it.
        let task = tx
            .query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks \
                     WHERE status = 'pending' AND not_before <= ?1 \
                     ORDER BY id LIMIT 1"
                ),
                params![now],
                task_from_row,
            )
            .optional()?;

        let Some(mut task) = task else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE tasks SET status = 'processing', updated_at = ?1 WHERE id = ?2",
            params![now, task.id],
        )?;
        log_transition(&tx, task.id, Some(TaskStatus::Pending), TaskStatus::Processing, None)?;
        tx.commit()?;

        task.status = TaskStatus::Processing;
        task.updated_at = now;
        debug!(task_id = task.id, attempt = task.attempt_count + 1, "task claimed");
        Ok(Some(task))
    }

    /// Transition Processing → Processed and record the result.
    pub fn complete(&self, task_id: i64, result: &AnalysisResult) -> Result<(), QueueError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let status = current_status(&tx, task_id)?;
        if status != TaskStatus::Processing {
            return Err(QueueError::InvalidTransition {
                id: task_id,
                from: status.as_str(),
                to: TaskStatus::Processed.as_str(),
            });
        }

        let now = now_stamp();
        tx.execute(
            "UPDATE tasks SET status = 'processed', updated_at = ?1 WHERE id = ?2",
            params![now, task_id],
        )?;
        insert_result(&tx, result, &now)?;
        log_transition(&tx, task_id, Some(TaskStatus::Processing), TaskStatus::Processed, None)?;
        tx.commit()?;

        info!(task_id, past_memory_used = result.past_memory_used, "task processed");
        Ok(())
    }

    /// Report a processing failure.
    ///
    /// Consumes one attempt. Below `max_attempts` the task returns to
    /// Pending behind a capped exponential backoff gate; at the limit it
    /// goes terminal Failed and a failure result is recorded. Returns the
    /// resulting status.
    pub fn fail(&self, task_id: i64, reason: &str) -> Result<TaskStatus, QueueError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let (status, attempts) = tx
            .query_row(
                "SELECT status, attempt_count FROM tasks WHERE id = ?1",
                params![task_id],
                |row| {
                    let s: String = row.get(0)?;
                    let a: u32 = row.get(1)?;
                    Ok((s, a))
                },
            )
            .optional()?
            .ok_or(QueueError::UnknownTask(task_id))?;

        let status: TaskStatus = status
            .parse()
            .map_err(|_| QueueError::Unavailable(format!("corrupt status for task {task_id}")))?;
        if status != TaskStatus::Processing {
            return Err(QueueError::InvalidTransition {
                id: task_id,
                from: status.as_str(),
                to: TaskStatus::Failed.as_str(),
            });
        }

        let attempts = attempts + 1;
        let now = now_stamp();

        let new_status = if attempts >= self.config.max_attempts {
            tx.execute(
                "UPDATE tasks SET status = 'failed', attempt_count = ?1, last_error = ?2, updated_at = ?3 \
                 WHERE id = ?4",
                params![attempts, reason, now, task_id],
            )?;
            insert_result(&tx, &AnalysisResult::failed(task_id, reason), &now)?;
            log_transition(
                &tx,
                task_id,
                Some(TaskStatus::Processing),
                TaskStatus::Failed,
                Some(reason),
            )?;
            warn!(task_id, attempts, reason, "task failed terminally");
            TaskStatus::Failed
        } else {
            let delay_ms = self.backoff_delay_ms(attempts);
            let not_before = (Utc::now() + chrono::Duration::milliseconds(delay_ms as i64))
                .to_rfc3339_opts(SecondsFormat::Micros, true);
            tx.execute(
                "UPDATE tasks SET status = 'pending', attempt_count = ?1, last_error = ?2, \
                 not_before = ?3, updated_at = ?4 WHERE id = ?5",
                params![attempts, reason, not_before, now, task_id],
            )?;
            log_transition(
                &tx,
                task_id,
                Some(TaskStatus::Processing),
                TaskStatus::Pending,
                Some(reason),
            )?;
            debug!(task_id, attempts, delay_ms, "task requeued with backoff");
            TaskStatus::Pending
        };

        tx.commit()?;
        Ok(new_status)
    }

    /// Cancel a task. Legal only while Pending — a Processing task has a
    /// result in flight that must not be orphaned.
    pub fn abandon(&self, task_id: i64) -> Result<(), QueueError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let status = current_status(&tx, task_id)?;
        if status != TaskStatus::Pending {
            return Err(QueueError::InvalidTransition {
                id: task_id,
                from: status.as_str(),
                to: TaskStatus::Abandoned.as_str(),
            });
        }

        let now = now_stamp();
        tx.execute(
            "UPDATE tasks SET status = 'abandoned', updated_at = ?1 WHERE id = ?2",
            params![now, task_id],
        )?;
        log_transition(&tx, task_id, Some(TaskStatus::Pending), TaskStatus::Abandoned, None)?;
        tx.commit()?;

        info!(task_id, "task abandoned");
        Ok(())
    }

    /// Point lookup for status reporting.
    pub fn task(&self, task_id: i64) -> Result<Option<Task>, QueueError> {
        let conn = self.lock()?;
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![task_id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    /// The recorded terminal result for a task, if it has one.
    pub fn result(&self, task_id: i64) -> Result<Option<AnalysisResult>, QueueError> {
        let conn = self.lock()?;
        let result = conn
            .query_row(
                "SELECT task_id, product_title, price, analysis, recommendation, past_memory_used, status \
                 FROM results WHERE task_id = ?1",
                params![task_id],
                |row| {
                    let recommendation: Option<String> = row.get(4)?;
                    let status: String = row.get(6)?;
                    Ok(AnalysisResult {
                        task_id: row.get(0)?,
                        product_title: row.get(1)?,
                        price: row.get(2)?,
                        analysis: row.get(3)?,
                        recommendation: recommendation
                            .map(|r| r.parse().map_err(|_| rusqlite::Error::InvalidQuery))
                            .transpose()?,
                        past_memory_used: row.get::<_, i64>(5)? != 0,
                        status: status.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    /// Counts by status.
    pub fn stats(&self) -> Result<QueueStats, QueueError> {
        let conn = self.lock()?;
        let mut stats = QueueStats {
            pending: 0,
            processing: 0,
            processed: 0,
            failed: 0,
            abandoned: 0,
        };

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (status, count) = row?;
            match status.as_str() {
                "pending" => stats.pending = count,
                "processing" => stats.processing = count,
                "processed" => stats.processed = count,
                "failed" => stats.failed = count,
                "abandoned" => stats.abandoned = count,
                _ => {}
            }
        }
        Ok(stats)
    }

    /// Non-terminal tasks submitted more than `older_than_minutes` ago.
    /// These are the stuck tasks `doctor` reports.
    pub fn stale_tasks(&self, older_than_minutes: u64) -> Result<Vec<Task>, QueueError> {
        let cutoff = (Utc::now() - chrono::Duration::minutes(older_than_minutes as i64))
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE status IN ('pending', 'processing') AND submitted_at < ?1 \
             ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![cutoff], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Capped exponential backoff delay after `attempts` consumed attempts.
    fn backoff_delay_ms(&self, attempts: u32) -> u64 {
        let exp = attempts.saturating_sub(1);
        let base = self.config.backoff_initial_ms as f64
            * self.config.backoff_multiplier.powi(exp as i32);
        (base as u64).min(self.config.backoff_max_ms)
    }
}

/// Fetch a task's current status inside a transaction.
fn current_status(conn: &Connection, task_id: i64) -> Result<TaskStatus, QueueError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM tasks WHERE id = ?1",
            params![task_id],
            |row| row.get(0),
        )
        .optional()?;
    let status = status.ok_or(QueueError::UnknownTask(task_id))?;
    status
        .parse()
        .map_err(|_| QueueError::Unavailable(format!("corrupt status for task {task_id}")))
}

/// Insert the terminal result row for a task.
fn insert_result(conn: &Connection, result: &AnalysisResult, now: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO results (task_id, product_title, price, analysis, recommendation, past_memory_used, status, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            result.task_id,
            result.product_title,
            result.price,
            result.analysis,
            result.recommendation.map(|r| r.as_str()),
            result.past_memory_used as i64,
            result.status.as_str(),
            now,
        ],
    )?;
    Ok(())
}

/// Append a status-transition event to the task_log.
fn log_transition(
    conn: &Connection,
    task_id: i64,
    old_status: Option<TaskStatus>,
    new_status: TaskStatus,
    detail: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO task_log (task_id, old_status, new_status, detail, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            task_id,
            old_status.map(|s| s.as_str()),
            new_status.as_str(),
            detail,
            now_stamp(),
        ],
    )?;
    Ok(())
}
