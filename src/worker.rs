//! The analysis worker — single consumer of the task queue.
//!
//! Per task: claim → consult memory → external analysis → memory update →
//! result persisted → terminal status. Every failure along the way is handed
//! to [`TaskQueue::fail`], which owns all retry and backoff bookkeeping; the
//! worker never retries anything itself.
//!
//! Exactly one worker instance runs at a time. That keeps dequeue order
//! strictly FIFO and guarantees each task pays for at most one external
//! analysis call per attempt.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::analyzer::Analyzer;
use crate::error::{AnalyzerError, QueueError};
use crate::memory::types::MemoryRecord;
use crate::memory::TieredMemory;
use crate::queue::types::{AnalysisResult, Task, TaskStatus};
use crate::queue::TaskQueue;
use crate::sink::ResultSink;

pub struct Worker {
    queue: TaskQueue,
    memory: TieredMemory,
    analyzer: Box<dyn Analyzer>,
    sink: Box<dyn ResultSink>,
    poll_interval: Duration,
    analysis_timeout: Duration,
}

impl Worker {
    pub fn new(
        queue: TaskQueue,
        memory: TieredMemory,
        analyzer: Box<dyn Analyzer>,
        sink: Box<dyn ResultSink>,
        poll_interval: Duration,
        analysis_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            memory,
            analyzer,
            sink,
            poll_interval,
            analysis_timeout,
        }
    }

    /// Process tasks until the queue handle fails.
    pub async fn run(&self) -> Result<(), QueueError> {
        info!("worker started");
        loop {
            if !self.run_once().await? {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    /// Claim and process at most one task. Returns whether a task was
    /// claimed, so callers can idle when the queue is drained.
    pub async fn run_once(&self) -> Result<bool, QueueError> {
        let Some(task) = self.queue.dequeue()? else {
            return Ok(false);
        };
        self.process(task).await?;
        Ok(true)
    }

    async fn process(&self, task: Task) -> Result<(), QueueError> {
        let attempt = task.attempt_count + 1;
        info!(task_id = task.id, attempt, query = %task.query, "processing task");

        // Memory consultation. A failure here is routed through the queue's
        // retry policy like any other — the store may recover.
        let recalled = match self.memory.recall(&task.query) {
            Ok(recalled) => recalled,
            Err(e) => {
                return self.fail_task(task.id, &format!("memory recall failed: {e}")).await;
            }
        };
        let past_memory_used = recalled.is_some();

        // External analysis, bounded by the configured deadline.
        let analysis = match tokio::time::timeout(
            self.analysis_timeout,
            self.analyzer.analyze(&task.query, recalled.as_ref()),
        )
        .await
        {
            Err(_elapsed) => Err(AnalyzerError::Timeout),
            Ok(result) => result,
        };

        let analysis = match analysis {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(task_id = task.id, error = %e, "analysis call failed");
                return self.fail_task(task.id, &e.to_string()).await;
            }
        };

        // Memory update before completion: a result without durable history
        // is incomplete, so a long-term write failure fails the task even
        // though the analysis succeeded.
        let record = MemoryRecord::new(
            task.fingerprint.clone(),
            analysis.product_title.clone(),
            analysis.price,
            analysis.analysis_text.clone(),
            analysis.recommendation,
        );
        if let Err(e) = self.memory.remember(record) {
            error!(task_id = task.id, error = %e, "memory write failed after successful analysis");
            return self.fail_task(task.id, &format!("memory write failed: {e}")).await;
        }

        let result = AnalysisResult::processed(
            task.id,
            analysis.product_title,
            analysis.price,
            analysis.analysis_text,
            analysis.recommendation,
            past_memory_used,
        );
        self.queue.complete(task.id, &result)?;
        self.record_to_sink(&result).await;
        Ok(())
    }

    /// Hand a failure to the queue; export the result if it went terminal.
    async fn fail_task(&self, task_id: i64, reason: &str) -> Result<(), QueueError> {
        let status = self.queue.fail(task_id, reason)?;
        if status == TaskStatus::Failed {
            if let Some(result) = self.queue.result(task_id)? {
                self.record_to_sink(&result).await;
            }
        }
        Ok(())
    }

    /// Best-effort: a sink failure never touches task status.
    async fn record_to_sink(&self, result: &AnalysisResult) {
        if let Err(e) = self.sink.record(result).await {
            warn!(task_id = result.task_id, error = %e, "result sink write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analysis;
    use crate::config::QueueConfig;
    use crate::db;
    use crate::memory::long_term::SqliteLongTermStore;
    use crate::memory::short_term::RecentCache;
    use crate::memory::types::Recommendation;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Analyzer that replays a script of canned outcomes.
    struct ScriptedAnalyzer {
        script: Mutex<VecDeque<Result<Analysis, AnalyzerError>>>,
    }

    impl ScriptedAnalyzer {
        fn new(script: Vec<Result<Analysis, AnalyzerError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl Analyzer for ScriptedAnalyzer {
        async fn analyze(
            &self,
            _query: &str,
            _context: Option<&MemoryRecord>,
        ) -> Result<Analysis, AnalyzerError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("analyzer script exhausted")
        }
    }

    /// Sink that collects everything it is given.
    #[derive(Clone, Default)]
    struct CollectingSink {
        results: Arc<Mutex<Vec<AnalysisResult>>>,
    }

    #[async_trait]
    impl ResultSink for CollectingSink {
        async fn record(&self, result: &AnalysisResult) -> anyhow::Result<()> {
            self.results.lock().unwrap().push(result.clone());
            Ok(())
        }
    }

    fn earbuds_analysis() -> Analysis {
        Analysis {
            product_title: "X Earbuds".to_string(),
            price: 42.99,
            analysis_text: "Competitive at this price point.".to_string(),
            recommendation: Recommendation::Buy,
        }
    }

    fn test_worker(
        script: Vec<Result<Analysis, AnalyzerError>>,
    ) -> (Worker, TaskQueue, CollectingSink) {
        let conn = db::open_memory_database().unwrap();
        let db = Arc::new(Mutex::new(conn));
        let queue = TaskQueue::new(
            Arc::clone(&db),
            QueueConfig {
                backoff_initial_ms: 0,
                backoff_max_ms: 0,
                ..QueueConfig::default()
            },
        );
        let memory = TieredMemory::new(
            Box::new(RecentCache::new(16, 60)),
            Box::new(SqliteLongTermStore::new(Arc::clone(&db), 0.82, 200)),
        );
        let sink = CollectingSink::default();
        let worker = Worker::new(
            queue.clone(),
            memory,
            Box::new(ScriptedAnalyzer::new(script)),
            Box::new(sink.clone()),
            Duration::from_millis(10),
            Duration::from_secs(5),
        );
        (worker, queue, sink)
    }

    #[tokio::test]
    async fn first_analysis_has_no_past_memory() {
        let (worker, queue, sink) = test_worker(vec![Ok(earbuds_analysis())]);
        let id = queue.enqueue("wireless earbuds under $50").unwrap();

        assert!(worker.run_once().await.unwrap());

        let result = queue.result(id).unwrap().unwrap();
        assert_eq!(result.status, TaskStatus::Processed);
        assert!(!result.past_memory_used);
        assert_eq!(sink.results.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repeat_query_uses_past_memory() {
        let (worker, queue, _sink) =
            test_worker(vec![Ok(earbuds_analysis()), Ok(earbuds_analysis())]);

        let first = queue.enqueue("wireless earbuds under $50").unwrap();
        assert!(worker.run_once().await.unwrap());
        assert!(!queue.result(first).unwrap().unwrap().past_memory_used);

        // Same query modulo normalization
        let second = queue.enqueue("Wireless Earbuds under $50!").unwrap();
        assert!(worker.run_once().await.unwrap());
        assert!(queue.result(second).unwrap().unwrap().past_memory_used);
    }

    #[tokio::test]
    async fn analyzer_errors_defer_to_queue_retry() {
        let (worker, queue, sink) = test_worker(vec![
            Err(AnalyzerError::Timeout),
            Err(AnalyzerError::RateLimited),
            Err(AnalyzerError::Timeout),
        ]);
        let id = queue.enqueue("doomed gadget").unwrap();

        // max_attempts = 3: two requeues, then terminal failure
        for _ in 0..3 {
            assert!(worker.run_once().await.unwrap());
        }
        assert!(!worker.run_once().await.unwrap());

        let task = queue.task(id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempt_count, 3);

        // The terminal failure reached the sink exactly once
        let recorded = sink.results.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn failed_task_leaves_no_memory_record() {
        let (worker, queue, _sink) = test_worker(vec![
            Err(AnalyzerError::Timeout),
            Err(AnalyzerError::Timeout),
            Err(AnalyzerError::Timeout),
            Ok(earbuds_analysis()),
        ]);
        queue.enqueue("doomed gadget").unwrap();

        for _ in 0..3 {
            worker.run_once().await.unwrap();
        }

        // A later task with the same query starts from a cold memory
        let fresh = queue.enqueue("doomed gadget").unwrap();
        worker.run_once().await.unwrap();
        assert!(!queue.result(fresh).unwrap().unwrap().past_memory_used);
    }
}
