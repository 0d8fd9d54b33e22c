//! Pool of queue workers sharing one queue.
//!
//! Concurrency comes only from running several workers against the same
//! queue; the store's atomic pop keeps them from seeing the same message.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::queue_worker::{PoolStats, QueueWorker, SharedPoolStats, WorkerConfig};
use crate::metrics::MetricsCollector;
use crate::queue::{MessageHandler, QueueConsumer, QueueKind};

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool is already running.
    #[error("Pool is already running")]
    AlreadyRunning,

    /// Pool is not running.
    #[error("Pool is not running")]
    NotRunning,

    /// Shutdown timed out.
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Worker pool that runs several `QueueWorker`s against one queue.
pub struct WorkerPool {
    queue: QueueKind,
    num_workers: usize,
    config: WorkerConfig,
    consumer: QueueConsumer,
    handler: Arc<dyn MessageHandler>,
    shutdown_tx: broadcast::Sender<()>,
    worker_handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedPoolStats>,
    is_running: AtomicBool,
    metrics: MetricsCollector,
}

impl WorkerPool {
    /// Creates a pool of `num_workers` workers bound to `queue`.
    pub fn new(
        queue: QueueKind,
        num_workers: usize,
        consumer: QueueConsumer,
        handler: Arc<dyn MessageHandler>,
        config: WorkerConfig,
    ) -> Self {
        // Buffer size of 1 is sufficient since we only send once
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            queue,
            num_workers: num_workers.max(1),
            config,
            consumer,
            handler,
            shutdown_tx,
            worker_handles: Vec::new(),
            stats: Arc::new(SharedPoolStats::default()),
            is_running: AtomicBool::new(false),
            metrics: MetricsCollector::new(),
        }
    }

    /// Starts all workers in the pool.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::AlreadyRunning` if the pool is already running.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::AlreadyRunning);
        }

        for i in 0..self.num_workers {
            let worker = QueueWorker::new(
                format!("{}-worker-{}", self.queue, i),
                self.queue,
                self.consumer.clone(),
                Arc::clone(&self.handler),
                self.config.clone(),
            )
            .with_shared_stats(Arc::clone(&self.stats));

            let handle = tokio::spawn(worker.run(self.shutdown_tx.subscribe()));
            self.worker_handles.push(handle);
        }

        self.is_running.store(true, Ordering::SeqCst);
        self.metrics.update_workers(self.num_workers);
        info!(
            queue = %self.queue,
            num_workers = self.num_workers,
            "Worker pool started"
        );

        Ok(())
    }

    /// Gracefully shuts down all workers.
    ///
    /// Workers finish the tick they are in before stopping.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ShutdownTimeout` if workers don't stop within
    /// the configured timeout.
    pub async fn shutdown(&mut self) -> Result<(), PoolError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::NotRunning);
        }

        info!(queue = %self.queue, "Initiating worker pool shutdown");

        // Workers may have already stopped
        let _ = self.shutdown_tx.send(());

        let handles: Vec<_> = self.worker_handles.drain(..).collect();
        let shutdown_future = async {
            for result in futures::future::join_all(handles).await {
                if let Err(e) = result {
                    error!(error = %e, "Worker task panicked during shutdown");
                }
            }
        };

        let result = tokio::time::timeout(self.config.shutdown_timeout, shutdown_future).await;
        self.is_running.store(false, Ordering::SeqCst);
        self.metrics.update_workers(0);

        match result {
            Ok(()) => {
                info!(queue = %self.queue, "Worker pool shutdown complete");
                Ok(())
            }
            Err(_) => Err(PoolError::ShutdownTimeout(self.config.shutdown_timeout)),
        }
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.num_workers)
    }

    /// Returns whether the pool is currently running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Returns the number of workers in the pool.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Returns the queue the pool is bound to.
    pub fn queue(&self) -> QueueKind {
        self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::queue::{AiAnalysisJob, MemoryQueueStore, QueueMessage, QueueProducer};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct CollectingHandler {
        ids: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl MessageHandler for CollectingHandler {
        async fn handle(&self, message: &QueueMessage) -> Result<(), StageError> {
            self.ids.lock().unwrap().push(message.id);
            Ok(())
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig::default()
            .with_tick_interval(Duration::from_millis(2))
            .with_health_interval(Duration::from_millis(100))
            .with_pop_timeout(Duration::from_millis(5))
            .with_shutdown_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_pool_processes_each_message_once() {
        let store = Arc::new(MemoryQueueStore::new());
        let producer = QueueProducer::new(store.clone());
        let handler = Arc::new(CollectingHandler::default());

        for i in 0..6 {
            producer
                .publish(
                    QueueKind::AiAnalysis,
                    AiAnalysisJob {
                        trend_id: Uuid::new_v4(),
                        topic: format!("topic{i}"),
                        subreddit: "r/tech".to_string(),
                        raw_data_path: "batch.json".to_string(),
                        trend_score: 60.0,
                        priority: 2,
                    },
                )
                .await
                .unwrap();
        }

        let mut pool = WorkerPool::new(
            QueueKind::AiAnalysis,
            3,
            QueueConsumer::new(store.clone()),
            handler.clone(),
            fast_config(),
        );
        pool.start().unwrap();
        assert!(pool.is_running());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while pool.stats().processed < 6 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        pool.shutdown().await.unwrap();

        let stats = pool.stats();
        assert_eq!(stats.num_workers, 3);
        assert_eq!(stats.processed, 6);

        let ids = handler.ids.lock().unwrap().clone();
        let unique: HashSet<Uuid> = ids.iter().copied().collect();
        assert_eq!(ids.len(), 6);
        assert_eq!(unique.len(), 6);
        assert!(!pool.is_running());
    }

    #[tokio::test]
    async fn test_pool_lifecycle_errors() {
        let store = Arc::new(MemoryQueueStore::new());
        let mut pool = WorkerPool::new(
            QueueKind::PostGeneration,
            1,
            QueueConsumer::new(store),
            Arc::new(CollectingHandler::default()),
            fast_config(),
        );

        assert!(matches!(pool.shutdown().await, Err(PoolError::NotRunning)));
        pool.start().unwrap();
        assert!(matches!(pool.start(), Err(PoolError::AlreadyRunning)));
        pool.shutdown().await.unwrap();
    }

    #[test]
    fn test_pool_error_display() {
        assert!(PoolError::AlreadyRunning.to_string().contains("already running"));
        assert!(PoolError::NotRunning.to_string().contains("not running"));
        assert!(PoolError::ShutdownTimeout(Duration::from_secs(60))
            .to_string()
            .contains("60"));
    }
}
