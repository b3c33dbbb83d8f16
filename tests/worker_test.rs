mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{earbuds_analysis, test_db, test_memory, test_queue, CollectingSink, ScriptedAnalyzer};
use prospect::analyzer::{Analysis, Analyzer};
use prospect::error::{AnalyzerError, MemoryError};
use prospect::memory::long_term::LongTermStore;
use prospect::memory::short_term::RecentCache;
use prospect::memory::types::MemoryRecord;
use prospect::memory::TieredMemory;
use prospect::queue::types::TaskStatus;
use prospect::worker::Worker;

#[tokio::test]
async fn fresh_query_completes_without_past_memory() {
    let db = test_db();
    let memory = test_memory(&db);

    // recall before submission returns None
    assert!(memory.recall("wireless earbuds under $50").unwrap().is_none());

    let (worker, queue, sink) = helpers::test_worker(&db, vec![Ok(earbuds_analysis())]);
    let id = queue.enqueue("wireless earbuds under $50").unwrap();
    assert!(worker.run_once().await.unwrap());

    let result = queue.result(id).unwrap().unwrap();
    assert_eq!(result.status, TaskStatus::Processed);
    assert_eq!(result.product_title.as_deref(), Some("X Earbuds"));
    assert_eq!(result.price, Some(42.99));
    assert!(!result.past_memory_used);

    // after completion, recall returns the new record
    let recalled = memory.recall("wireless earbuds under $50").unwrap().unwrap();
    assert_eq!(recalled.product_title, "X Earbuds");

    // and the sink saw the terminal result
    assert_eq!(sink.results.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn repeat_query_feeds_prior_record_into_analysis() {
    let db = test_db();
    let queue = test_queue(&db);
    let analyzer = Arc::new(ScriptedAnalyzer::new(vec![
        Ok(earbuds_analysis()),
        Ok(earbuds_analysis()),
    ]));
    let sink = CollectingSink::default();
    let worker = Worker::new(
        queue.clone(),
        test_memory(&db),
        Box::new(SharedAnalyzer(Arc::clone(&analyzer))),
        Box::new(sink.clone()),
        Duration::from_millis(10),
        Duration::from_secs(5),
    );

    let first = queue.enqueue("wireless earbuds under $50").unwrap();
    worker.run_once().await.unwrap();
    assert!(!queue.result(first).unwrap().unwrap().past_memory_used);

    let second = queue.enqueue("Wireless Earbuds under $50!").unwrap();
    worker.run_once().await.unwrap();
    assert!(queue.result(second).unwrap().unwrap().past_memory_used);

    // The second call actually received the recalled record as context
    let contexts = analyzer.contexts.lock().unwrap();
    assert!(contexts[0].is_none());
    let ctx = contexts[1].as_ref().expect("second call should carry context");
    assert_eq!(ctx.product_title, "X Earbuds");
}

#[tokio::test]
async fn three_timeouts_fail_the_task_terminally() {
    let db = test_db();
    let (worker, queue, sink) = helpers::test_worker(
        &db,
        vec![
            Err(AnalyzerError::Timeout),
            Err(AnalyzerError::Timeout),
            Err(AnalyzerError::Timeout),
        ],
    );
    let id = queue.enqueue("wireless earbuds under $50").unwrap();

    for _ in 0..3 {
        assert!(worker.run_once().await.unwrap());
    }
    assert!(!worker.run_once().await.unwrap(), "failed task must not be re-dequeued");

    let task = queue.task(id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempt_count, 3);

    // No analysis ever succeeded, so the long-term store stayed empty
    let memories: i64 = {
        let conn = db.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))
            .unwrap()
    };
    assert_eq!(memories, 0);

    let recorded = sink.results.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].status, TaskStatus::Failed);
}

/// Long-term tier that refuses every write.
struct BrokenLongTerm;

impl LongTermStore for BrokenLongTerm {
    fn append(&self, _record: &MemoryRecord) -> Result<(), MemoryError> {
        Err(MemoryError::LongTerm("disk full".into()))
    }
    fn find_exact(&self, _fingerprint: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        Ok(None)
    }
    fn find_similar(&self, _fingerprint: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        Ok(None)
    }
    fn history(&self, _fingerprint: &str, _limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn long_term_write_failure_fails_task_despite_good_analysis() {
    let db = test_db();
    let queue = test_queue(&db);
    let memory = TieredMemory::new(
        Box::new(RecentCache::new(16, 60)),
        Box::new(BrokenLongTerm),
    );
    let sink = CollectingSink::default();
    let worker = Worker::new(
        queue.clone(),
        memory,
        Box::new(ScriptedAnalyzer::new(vec![
            Ok(earbuds_analysis()),
            Ok(earbuds_analysis()),
            Ok(earbuds_analysis()),
        ])),
        Box::new(sink.clone()),
        Duration::from_millis(10),
        Duration::from_secs(5),
    );

    let id = queue.enqueue("wireless earbuds under $50").unwrap();
    for _ in 0..3 {
        worker.run_once().await.unwrap();
    }

    // The analysis itself succeeded every time, but a result without durable
    // memory is incomplete
    let task = queue.task(id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    let result = queue.result(id).unwrap().unwrap();
    assert!(result.analysis.contains("memory write failed"));
}

#[tokio::test]
async fn worker_drains_queue_in_order() {
    let db = test_db();
    let (worker, queue, sink) = helpers::test_worker(
        &db,
        vec![Ok(earbuds_analysis()), Ok(earbuds_analysis()), Ok(earbuds_analysis())],
    );

    let ids: Vec<i64> = (0..3)
        .map(|i| queue.enqueue(&format!("product {i}")).unwrap())
        .collect();

    while worker.run_once().await.unwrap() {}

    let recorded = sink.results.lock().unwrap();
    let recorded_ids: Vec<i64> = recorded.iter().map(|r| r.task_id).collect();
    assert_eq!(recorded_ids, ids, "results arrive in submission order");
}

/// Wrapper so a shared ScriptedAnalyzer can be handed to the worker by value.
struct SharedAnalyzer(Arc<ScriptedAnalyzer>);

#[async_trait::async_trait]
impl Analyzer for SharedAnalyzer {
    async fn analyze(
        &self,
        query: &str,
        context: Option<&MemoryRecord>,
    ) -> Result<Analysis, AnalyzerError> {
        self.0.analyze(query, context).await
    }
}
