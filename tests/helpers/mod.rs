#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;

use prospect::analyzer::{Analysis, Analyzer};
use prospect::config::QueueConfig;
use prospect::db;
use prospect::error::AnalyzerError;
use prospect::memory::long_term::SqliteLongTermStore;
use prospect::memory::short_term::RecentCache;
use prospect::memory::types::{MemoryRecord, Recommendation};
use prospect::memory::TieredMemory;
use prospect::queue::types::AnalysisResult;
use prospect::queue::TaskQueue;
use prospect::sink::ResultSink;
use prospect::worker::Worker;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(db::open_memory_database().unwrap()))
}

/// Queue config with zero backoff so retried tasks are immediately eligible.
pub fn fast_queue_config() -> QueueConfig {
    QueueConfig {
        backoff_initial_ms: 0,
        backoff_max_ms: 0,
        ..QueueConfig::default()
    }
}

pub fn test_queue(db: &Arc<Mutex<Connection>>) -> TaskQueue {
    TaskQueue::new(Arc::clone(db), fast_queue_config())
}

pub fn test_memory(db: &Arc<Mutex<Connection>>) -> TieredMemory {
    TieredMemory::new(
        Box::new(RecentCache::new(16, 60)),
        Box::new(SqliteLongTermStore::new(Arc::clone(db), 0.82, 200)),
    )
}

/// A canned successful analysis.
pub fn earbuds_analysis() -> Analysis {
    Analysis {
        product_title: "X Earbuds".to_string(),
        price: 42.99,
        analysis_text: "Competitive at this price point.".to_string(),
        recommendation: Recommendation::Buy,
    }
}

/// Analyzer that replays a scripted sequence of outcomes and records the
/// context it was handed on each call.
pub struct ScriptedAnalyzer {
    script: Mutex<VecDeque<Result<Analysis, AnalyzerError>>>,
    pub contexts: Mutex<Vec<Option<MemoryRecord>>>,
}

impl ScriptedAnalyzer {
    pub fn new(script: Vec<Result<Analysis, AnalyzerError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            contexts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        _query: &str,
        context: Option<&MemoryRecord>,
    ) -> Result<Analysis, AnalyzerError> {
        self.contexts.lock().unwrap().push(context.cloned());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("analyzer script exhausted")
    }
}

/// Sink that collects everything it is given.
#[derive(Clone, Default)]
pub struct CollectingSink {
    pub results: Arc<Mutex<Vec<AnalysisResult>>>,
}

#[async_trait]
impl ResultSink for CollectingSink {
    async fn record(&self, result: &AnalysisResult) -> anyhow::Result<()> {
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }
}

/// Fully wired worker over a shared in-memory database.
pub fn test_worker(
    db: &Arc<Mutex<Connection>>,
    script: Vec<Result<Analysis, AnalyzerError>>,
) -> (Worker, TaskQueue, CollectingSink) {
    let queue = test_queue(db);
    let sink = CollectingSink::default();
    let worker = Worker::new(
        queue.clone(),
        test_memory(db),
        Box::new(ScriptedAnalyzer::new(script)),
        Box::new(sink.clone()),
        Duration::from_millis(10),
        Duration::from_secs(5),
    );
    (worker, queue, sink)
}
