//! CLI command implementations.

pub mod doctor;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::analyzer::openai::OpenAiAnalyzer;
use crate::config::ProspectConfig;
use crate::db;
use crate::memory::long_term::{LongTermStore, SqliteLongTermStore};
use crate::memory::short_term::RecentCache;
use crate::memory::types::fingerprint;
use crate::memory::TieredMemory;
use crate::queue::TaskQueue;
use crate::sink::{JsonlSink, LogSink, ResultSink};
use crate::worker::Worker;

fn open_shared_db(config: &ProspectConfig) -> Result<Arc<Mutex<Connection>>> {
    let conn = db::open_database(config.resolved_db_path())?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn long_term_store(config: &ProspectConfig, db: Arc<Mutex<Connection>>) -> SqliteLongTermStore {
    SqliteLongTermStore::new(
        db,
        config.memory.similarity_threshold,
        config.memory.similarity_window,
    )
}

/// Run the analysis worker until interrupted.
pub async fn serve(config: ProspectConfig) -> Result<()> {
    let db = open_shared_db(&config)?;
    let queue = TaskQueue::new(Arc::clone(&db), config.queue.clone());

    let memory = TieredMemory::new(
        Box::new(RecentCache::new(
            config.memory.short_term_capacity,
            config.memory.short_term_ttl_minutes,
        )),
        Box::new(long_term_store(&config, Arc::clone(&db))),
    );

    let analyzer = OpenAiAnalyzer::from_config(&config.analyzer)
        .context("failed to build analyzer client")?;

    let sink: Box<dyn ResultSink> = if config.sink.results_path.is_empty() {
        Box::new(LogSink)
    } else {
        Box::new(JsonlSink::new(crate::config::expand_tilde(
            &config.sink.results_path,
        )))
    };

    let worker = Worker::new(
        queue,
        memory,
        Box::new(analyzer),
        sink,
        Duration::from_millis(config.queue.poll_interval_ms),
        Duration::from_secs(config.analyzer.timeout_secs),
    );

    worker.run().await.context("worker stopped")?;
    Ok(())
}

/// Submit a research query; prints the assigned task id.
pub fn submit(config: &ProspectConfig, query: &str) -> Result<()> {
    let db = open_shared_db(config)?;
    let queue = TaskQueue::new(db, config.queue.clone());
    let task_id = queue.enqueue(query)?;
    println!("Task {task_id} queued: {query}");
    Ok(())
}

/// Print a task's current status and, if terminal, its result.
pub fn status(config: &ProspectConfig, task_id: i64) -> Result<()> {
    let db = open_shared_db(config)?;
    let queue = TaskQueue::new(db, config.queue.clone());

    let Some(task) = queue.task(task_id)? else {
        println!("Task {task_id}: not found");
        return Ok(());
    };

    println!("Task {}", task.id);
    println!("  Query:       {}", task.query);
    println!("  Status:      {}", task.status);
    println!("  Attempts:    {}", task.attempt_count);
    println!("  Submitted:   {}", task.submitted_at);
    if let Some(ref err) = task.last_error {
        println!("  Last error:  {err}");
    }

    if let Some(result) = queue.result(task_id)? {
        println!("Result:");
        if let Some(ref title) = result.product_title {
            println!("  Product:        {title}");
        }
        if let Some(price) = result.price {
            println!("  Price:          ${price:.2}");
        }
        if let Some(rec) = result.recommendation {
            println!("  Recommendation: {rec}");
        }
        println!("  Past memory:    {}", result.past_memory_used);
        println!("  Analysis:       {}", result.analysis);
    }
    Ok(())
}

/// Print the long-term analysis history for a query, most recent first.
pub fn history(config: &ProspectConfig, query: &str, limit: usize) -> Result<()> {
    let db = open_shared_db(config)?;
    let store = long_term_store(config, db);

    let records = store.history(&fingerprint(query), limit)?;
    if records.is_empty() {
        println!("No history for: {query}");
        return Ok(());
    }

    for record in records {
        println!(
            "{}  {}  ${:.2}  {}",
            record.created_at, record.recommendation, record.price, record.product_title
        );
    }
    Ok(())
}

/// Cancel a Pending task. Tasks already claimed by the worker cannot be
/// cancelled.
pub fn abandon(config: &ProspectConfig, task_id: i64) -> Result<()> {
    let db = open_shared_db(config)?;
    let queue = TaskQueue::new(db, config.queue.clone());
    queue.abandon(task_id)?;
    println!("Task {task_id} abandoned");
    Ok(())
}

/// Print queue statistics.
pub fn stats(config: &ProspectConfig) -> Result<()> {
    let db = open_shared_db(config)?;
    let queue = TaskQueue::new(db, config.queue.clone());
    let stats = queue.stats()?;

    println!("Queue");
    println!("  Pending:     {}", stats.pending);
    println!("  Processing:  {}", stats.processing);
    println!("  Processed:   {}", stats.processed);
    println!("  Failed:      {}", stats.failed);
    println!("  Abandoned:   {}", stats.abandoned);
    println!("  Depth:       {}", stats.depth());
    Ok(())
}
