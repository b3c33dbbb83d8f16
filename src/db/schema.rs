//! SQL DDL for all prospect tables.
//!
//! Defines the `tasks`, `memories`, `results`, `task_log`, and `schema_meta`
//! tables. All DDL uses `IF NOT EXISTS` for idempotent initialization.
//!
//! `memories` is append-only by contract: nothing in this crate issues an
//! UPDATE or DELETE against it.

use rusqlite::Connection;

/// All schema DDL statements for prospect's core tables.
const SCHEMA_SQL: &str = r#"
-- Durable task queue. Task ids are assigned monotonically by AUTOINCREMENT,
-- so FIFO order is ORDER BY id.
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK(status IN ('pending','processing','processed','failed','abandoned')),
    attempt_count INTEGER NOT NULL DEFAULT 0,
    not_before TEXT NOT NULL,
    last_error TEXT,
    submitted_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status, not_before);
CREATE INDEX IF NOT EXISTS idx_tasks_fingerprint ON tasks(fingerprint);

-- Long-term memory: the append-only analysis history.
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL,
    product_title TEXT NOT NULL,
    price REAL NOT NULL,
    analysis TEXT NOT NULL,
    recommendation TEXT NOT NULL CHECK(recommendation IN ('buy','avoid','research')),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_fingerprint ON memories(fingerprint);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);

-- One terminal result per task.
CREATE TABLE IF NOT EXISTS results (
    task_id INTEGER PRIMARY KEY REFERENCES tasks(id),
    product_title TEXT,
    price REAL,
    analysis TEXT NOT NULL,
    recommendation TEXT CHECK(recommendation IN ('buy','avoid','research')),
    past_memory_used INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL CHECK(status IN ('processed','failed')),
    created_at TEXT NOT NULL
);

-- Status-transition event log, observable by reporting collaborators.
CREATE TABLE IF NOT EXISTS task_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL,
    old_status TEXT,
    new_status TEXT NOT NULL,
    detail TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_log_task ON task_log(task_id);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
