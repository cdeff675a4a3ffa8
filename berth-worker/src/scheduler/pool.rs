//! Worker pool
//!
//! A fixed number of workers drain one shared [`MessageQueue`]. Each worker
//! holds its own job store connection and runs every delivery through the
//! [`DeploymentPipeline`]. A worker only logs what happened and moves on; the
//! single exit condition is the queue being closed and drained.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::context::WorkerContext;
use crate::repository::{JobConnection, JobStore};
use crate::scheduler::queue::MessageQueue;
use crate::service::{DeploymentPipeline, StageFault};

/// Handle on a running set of workers
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `config.workers` workers onto the tokio runtime
    pub fn spawn(
        config: &WorkerConfig,
        store: Arc<dyn JobStore>,
        pipeline: Arc<DeploymentPipeline>,
        queue: MessageQueue,
    ) -> Self {
        info!(workers = config.workers, "starting worker pool");

        let handles = (0..config.workers)
            .map(|worker_id| {
                let worker = Worker::new(
                    WorkerContext::new(worker_id),
                    Arc::clone(&store),
                    Arc::clone(&pipeline),
                    queue.clone(),
                );
                tokio::spawn(worker.run())
            })
            .collect();

        Self { handles }
    }

    /// Number of workers in the pool
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Waits for every worker to exit
    ///
    /// Workers exit once all senders are dropped and the queue is drained.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("Worker task panicked: {}", e);
            }
        }

        info!("worker pool stopped");
    }
}

struct Worker {
    ctx: WorkerContext,
    store: Arc<dyn JobStore>,
    pipeline: Arc<DeploymentPipeline>,
    queue: MessageQueue,
    connection: Option<Box<dyn JobConnection>>,
}

impl Worker {
    fn new(
        ctx: WorkerContext,
        store: Arc<dyn JobStore>,
        pipeline: Arc<DeploymentPipeline>,
        queue: MessageQueue,
    ) -> Self {
        Self {
            ctx,
            store,
            pipeline,
            queue,
            connection: None,
        }
    }

    async fn run(mut self) {
        let worker_id = self.ctx.worker_id();
        info!(worker_id, "worker started");

        self.connection = self.connect().await;

        while let Some(raw) = self.queue.recv().await {
            self.handle(&raw).await;
        }

        self.disconnect().await;
        info!(worker_id, "worker stopped");
    }

    async fn handle(&mut self, raw: &str) {
        let worker_id = self.ctx.worker_id();

        let message = match self.pipeline.decode(raw) {
            Ok(message) => message,
            Err(fault) => {
                warn!(worker_id, message = raw, error = %fault, "worker received invalid message");
                return;
            }
        };

        if self.connection.is_none() {
            self.connection = self.connect().await;
        }

        let Some(conn) = self.connection.as_mut() else {
            error!(
                worker_id,
                correlation_id = %message.uuid,
                job_id = message.job,
                "dropping delivery, job store is unreachable"
            );
            return;
        };

        match self.pipeline.run(&self.ctx, conn.as_mut(), &message).await {
            Ok(outcome) => {
                info!(
                    worker_id,
                    correlation_id = %message.uuid,
                    job_id = outcome.job_id,
                    job_uuid = %outcome.job_uuid,
                    status = %outcome.status,
                    "delivery processed"
                );
            }
            Err(fault) => {
                match &fault {
                    StageFault::JobNotFound(_) => warn!(
                        worker_id,
                        correlation_id = %message.uuid,
                        job_id = message.job,
                        error = %fault,
                        "dropping delivery for unknown job"
                    ),
                    _ => error!(
                        worker_id,
                        correlation_id = %message.uuid,
                        job_id = message.job,
                        error = %fault,
                        "dropping delivery"
                    ),
                }

                if fault.is_connection_fault() {
                    self.disconnect().await;
                }
            }
        }
    }

    async fn connect(&self) -> Option<Box<dyn JobConnection>> {
        match self.store.connect().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                error!(
                    worker_id = self.ctx.worker_id(),
                    error = %e,
                    "worker unable to connect to job store"
                );
                None
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            conn.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryJobStore;
    use crate::scheduler::queue::channel;
    use async_trait::async_trait;
    use berth_cluster::{Cluster, ClusterError, ClusterResolver};
    use berth_core::domain::deployment::DeploymentRequest;
    use berth_core::domain::job::{JobStatus, NewJob};
    use berth_core::domain::message::Message;
    use std::time::Duration;
    use tokio::time::Instant;

    const PAYLOAD: &str = r#"{"cluster":"prod-a","namespace":"ns1","application":"app1","version":"v2","strategy":"rolling"}"#;

    struct ReadyCluster;

    #[async_trait]
    impl Cluster for ReadyCluster {
        fn name(&self) -> &str {
            "prod-a"
        }

        async fn probe(&self, _deadline: Instant) -> berth_cluster::Result<bool> {
            Ok(true)
        }

        async fn deploy(&self, _request: &DeploymentRequest) -> berth_cluster::Result<bool> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(true)
        }
    }

    struct OnlyProdA;

    #[async_trait]
    impl ClusterResolver for OnlyProdA {
        async fn resolve(&self, name: &str) -> berth_cluster::Result<Arc<dyn Cluster>> {
            if name == "prod-a" {
                Ok(Arc::new(ReadyCluster))
            } else {
                Err(ClusterError::NotFound(name.to_string()))
            }
        }
    }

    fn pipeline() -> Arc<DeploymentPipeline> {
        Arc::new(DeploymentPipeline::new(
            Arc::new(OnlyProdA),
            Duration::from_secs(1),
        ))
    }

    async fn seed(store: &MemoryJobStore, payloads: &[&str]) -> Vec<i64> {
        let mut conn = store.connect().await.unwrap();
        let mut ids = Vec::new();
        for payload in payloads {
            ids.push(conn.create(NewJob::new("deployment", *payload)).await.unwrap().id);
        }
        conn.close().await;
        ids
    }

    #[tokio::test]
    async fn test_pool_drains_queue_and_releases_connections() {
        let store = MemoryJobStore::new();
        let ids = seed(&store, &[PAYLOAD; 20]).await;

        let (tx, queue) = channel(4);
        let pool = WorkerPool::spawn(
            &WorkerConfig::new(3),
            Arc::new(store.clone()),
            pipeline(),
            queue,
        );
        assert_eq!(pool.size(), 3);

        for id in &ids {
            tx.send(Message::new(*id).encode().unwrap()).await.unwrap();
        }
        drop(tx);
        pool.join().await;

        for id in ids {
            let job = store.get(id).unwrap();
            assert_eq!(job.status, JobStatus::Success);
            assert!(job.run_at.is_some());
        }
        assert_eq!(store.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_worker_survives_bad_messages() {
        let store = MemoryJobStore::new();
        let ids = seed(&store, &[PAYLOAD, "not a payload"]).await;

        let (tx, queue) = channel(8);
        let pool = WorkerPool::spawn(
            &WorkerConfig::new(1),
            Arc::new(store.clone()),
            pipeline(),
            queue,
        );

        tx.send("garbage".to_string()).await.unwrap();
        tx.send(r#"{"uuid":"m-404","job":404}"#.to_string())
            .await
            .unwrap();
        tx.send(format!(r#"{{"uuid":"m-bad","job":{}}}"#, ids[1]))
            .await
            .unwrap();
        tx.send(format!(r#"{{"uuid":"m-ok","job":{}}}"#, ids[0]))
            .await
            .unwrap();
        drop(tx);
        pool.join().await;

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(ids[0]).unwrap().status, JobStatus::Success);

        let bad = store.get(ids[1]).unwrap();
        assert_eq!(bad.status, JobStatus::Failed);
        assert_eq!(bad.result, "Invalid job payload, UUID m-bad");
    }

    #[tokio::test]
    async fn test_worker_reconnects_after_store_outage() {
        let store = MemoryJobStore::new();
        let ids = seed(&store, &[PAYLOAD]).await;
        let raw = format!(r#"{{"uuid":"m-1","job":{}}}"#, ids[0]);

        let (_tx, queue) = channel(1);
        let mut worker = Worker::new(
            WorkerContext::new(0),
            Arc::new(store.clone()),
            pipeline(),
            queue,
        );
        worker.connection = worker.connect().await;

        store.set_available(false);
        worker.handle(&raw).await;
        assert!(worker.connection.is_none());
        assert_eq!(store.open_connections(), 0);
        assert_eq!(store.get(ids[0]).unwrap().status, JobStatus::Queued);

        // Still down: no connection can be opened, delivery is dropped
        worker.handle(&raw).await;
        assert!(worker.connection.is_none());

        store.set_available(true);
        worker.handle(&raw).await;
        assert!(worker.connection.is_some());
        assert_eq!(store.get(ids[0]).unwrap().status, JobStatus::Success);

        worker.disconnect().await;
        assert_eq!(store.open_connections(), 0);
    }
}
