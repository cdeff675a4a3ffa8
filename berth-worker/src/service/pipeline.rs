//! Deployment pipeline
//!
//! Drives one job from `queued` to a terminal status for one queue delivery:
//! - Decode the message
//! - Load the job record
//! - Decode the payload into a deployment request
//! - Resolve the target cluster
//! - Probe the cluster
//! - Apply the deployment
//! - Commit the terminal status
//!
//! Stages run strictly in order and stop at the first failure. Failures that
//! concern the job itself end up in the job record as a `failed` status with
//! a result naming the stage and the delivery's correlation id. Failures that
//! leave nothing to record (an unreadable message, an unreachable store) are
//! returned as [`StageFault`]s and the job is left untouched.
//!
//! Every job store and cluster call is bounded by the configured stage timeout.

use berth_cluster::{ClusterError, ClusterResolver};
use berth_core::domain::deployment::{DeploymentRequest, PayloadError};
use berth_core::domain::job::{Job, JobError, JobStatus};
use berth_core::domain::message::{Message, MessageDecodeError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{Instrument, Span, error, info, info_span};
use uuid::Uuid;

use crate::context::WorkerContext;
use crate::repository::{JobConnection, StoreError};

/// Result recorded on jobs that deployed successfully
pub const SUCCESS_RESULT: &str = "Deployment finished successfully";

/// Terminal state committed for one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub job_id: i64,
    pub job_uuid: Uuid,
    pub status: JobStatus,
    pub result: String,
}

/// Faults that abandon a delivery without recording anything on the job
#[derive(Debug, thiserror::Error)]
pub enum StageFault {
    #[error("invalid message: {0}")]
    Message(#[from] MessageDecodeError),

    #[error("unable to load job {job_id}: {source}")]
    Load {
        job_id: i64,
        #[source]
        source: StoreError,
    },

    #[error("job {0} not found")]
    JobNotFound(i64),

    #[error(transparent)]
    Transition(#[from] JobError),

    #[error("unable to commit job {job_id}: {source}")]
    Commit {
        job_id: i64,
        #[source]
        source: StoreError,
    },
}

impl StageFault {
    /// The job store error behind this fault, if any
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            StageFault::Load { source, .. } | StageFault::Commit { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether the worker's store connection should be discarded
    pub fn is_connection_fault(&self) -> bool {
        self.store_error()
            .is_some_and(StoreError::is_connection_fault)
    }
}

/// Reasons a job ends up `failed`
#[derive(Debug, thiserror::Error)]
pub enum JobFailure {
    #[error("invalid job payload: {0}")]
    InvalidPayload(#[source] PayloadError),

    #[error("cluster not found: {0}")]
    ClusterNotFound(#[source] ClusterError),

    #[error("cluster unreachable: {0}")]
    ClusterUnreachable(String),

    #[error("deployment failed: {0}")]
    DeploymentFailed(String),
}

impl JobFailure {
    /// Result string stored on the job
    pub fn result_message(&self, correlation_id: &str) -> String {
        let summary = match self {
            JobFailure::InvalidPayload(_) => "Invalid job payload",
            JobFailure::ClusterNotFound(_) => "Worker can not find the cluster",
            JobFailure::ClusterUnreachable(_) => "Worker unable to ping cluster",
            JobFailure::DeploymentFailed(_) => "Failure during deployment",
        };

        format!("{}, UUID {}", summary, correlation_id)
    }
}

/// Per-delivery deployment pipeline, shared by all workers
pub struct DeploymentPipeline {
    clusters: Arc<dyn ClusterResolver>,
    stage_timeout: Duration,
}

impl DeploymentPipeline {
    /// Creates a pipeline
    ///
    /// # Arguments
    /// * `clusters` - Resolves cluster names found in deployment requests
    /// * `stage_timeout` - Upper bound for each job store and cluster call
    pub fn new(clusters: Arc<dyn ClusterResolver>, stage_timeout: Duration) -> Self {
        Self {
            clusters,
            stage_timeout,
        }
    }

    /// Decodes a raw delivery
    pub fn decode(&self, raw: &str) -> Result<Message, StageFault> {
        Ok(Message::decode(raw)?)
    }

    /// Decodes a raw delivery and runs it through every stage
    pub async fn process(
        &self,
        ctx: &WorkerContext,
        conn: &mut dyn JobConnection,
        raw: &str,
    ) -> Result<Outcome, StageFault> {
        let message = self.decode(raw)?;
        self.run(ctx, conn, &message).await
    }

    /// Runs an already decoded message through the remaining stages
    pub async fn run(
        &self,
        ctx: &WorkerContext,
        conn: &mut dyn JobConnection,
        message: &Message,
    ) -> Result<Outcome, StageFault> {
        let span = ctx.delivery_span(message);
        self.run_stages(conn, message).instrument(span).await
    }

    async fn run_stages(
        &self,
        conn: &mut dyn JobConnection,
        message: &Message,
    ) -> Result<Outcome, StageFault> {
        info!("worker received a new job");

        let mut job = self
            .store_call(conn.get_by_id(message.job))
            .await
            .map_err(|source| StageFault::Load {
                job_id: message.job,
                source,
            })?
            .ok_or(StageFault::JobNotFound(message.job))?;

        Span::current().record("job_uuid", tracing::field::display(job.uuid));

        let (status, result) = match self.execute(&job).await {
            Ok(()) => (JobStatus::Success, SUCCESS_RESULT.to_string()),
            Err(failure) => (JobStatus::Failed, failure.result_message(&message.uuid)),
        };

        job.complete(status, result, chrono::Utc::now())?;

        self.store_call(conn.update(&job))
            .await
            .map_err(|source| StageFault::Commit {
                job_id: job.id,
                source,
            })?;

        info!(status = %job.status, result = %job.result, "job committed");

        Ok(Outcome {
            job_id: job.id,
            job_uuid: job.uuid,
            status: job.status,
            result: job.result,
        })
    }

    /// Stages that can fail the job: payload decode, resolve, probe, deploy
    async fn execute(&self, job: &Job) -> Result<(), JobFailure> {
        let request = DeploymentRequest::decode(&job.payload).map_err(|e| {
            error!(error = %e, "invalid job payload");
            JobFailure::InvalidPayload(e)
        })?;

        let span = info_span!(
            "deployment",
            request_cluster = %request.cluster,
            request_namespace = %request.namespace,
            request_application = %request.application,
            request_version = %request.version,
            request_strategy = %request.strategy,
        );

        self.deploy(&request).instrument(span).await
    }

    async fn deploy(&self, request: &DeploymentRequest) -> Result<(), JobFailure> {
        info!("worker accepted deployment request");

        let cluster = self
            .cluster_call(self.deadline(), self.clusters.resolve(&request.cluster))
            .await
            .map_err(|e| {
                error!(error = %e, "worker can not find the cluster");
                JobFailure::ClusterNotFound(e)
            })?;

        let deadline = self.deadline();
        match self.cluster_call(deadline, cluster.probe(deadline)).await {
            Ok(true) => {}
            Ok(false) => {
                error!("cluster reported it is not ready");
                return Err(JobFailure::ClusterUnreachable(
                    "cluster reported it is not ready".to_string(),
                ));
            }
            Err(e) => {
                error!(error = %e, "worker unable to ping cluster");
                return Err(JobFailure::ClusterUnreachable(e.to_string()));
            }
        }

        match self.cluster_call(self.deadline(), cluster.deploy(request)).await {
            Ok(true) => {
                info!("deployment finished successfully");
                Ok(())
            }
            Ok(false) => {
                error!("cluster refused the deployment");
                Err(JobFailure::DeploymentFailed(
                    "cluster refused the deployment".to_string(),
                ))
            }
            Err(e) => {
                error!(error = %e, "worker unable to deploy");
                Err(JobFailure::DeploymentFailed(e.to_string()))
            }
        }
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.stage_timeout
    }

    async fn cluster_call<T>(
        &self,
        deadline: Instant,
        call: impl Future<Output = Result<T, ClusterError>>,
    ) -> Result<T, ClusterError> {
        timeout_at(deadline, call)
            .await
            .unwrap_or_else(|_| Err(ClusterError::Timeout))
    }

    async fn store_call<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        timeout(self.stage_timeout, call)
            .await
            .unwrap_or_else(|_| Err(StoreError::Timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{JobStore, MemoryJobStore};
    use async_trait::async_trait;
    use berth_cluster::Cluster;
    use berth_core::domain::job::NewJob;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PAYLOAD: &str = r#"{"cluster":"prod-a","namespace":"ns1","application":"app1","version":"v2","strategy":"rolling"}"#;
    const MESSAGE: &str = r#"{"uuid":"m-1","job":42}"#;

    #[derive(Clone, Copy)]
    enum Reply {
        Ok,
        NotOk,
        Fail,
        Hang,
    }

    impl Reply {
        async fn play(self) -> berth_cluster::Result<bool> {
            match self {
                Reply::Ok => Ok(true),
                Reply::NotOk => Ok(false),
                Reply::Fail => Err(ClusterError::api_error(500, "agent exploded")),
                Reply::Hang => std::future::pending().await,
            }
        }
    }

    struct ScriptedCluster {
        name: String,
        probe: Reply,
        deploy: Reply,
        deploys: AtomicUsize,
    }

    #[async_trait]
    impl Cluster for ScriptedCluster {
        fn name(&self) -> &str {
            &self.name
        }

        async fn probe(&self, _deadline: Instant) -> berth_cluster::Result<bool> {
            self.probe.play().await
        }

        async fn deploy(&self, request: &DeploymentRequest) -> berth_cluster::Result<bool> {
            assert_eq!(request.strategy, "rolling");
            self.deploys.fetch_add(1, Ordering::SeqCst);
            self.deploy.play().await
        }
    }

    #[derive(Default)]
    struct Clusters {
        clusters: HashMap<String, Arc<ScriptedCluster>>,
        resolves: AtomicUsize,
    }

    impl Clusters {
        fn with(name: &str, probe: Reply, deploy: Reply) -> Arc<Self> {
            let mut clusters = HashMap::new();
            clusters.insert(
                name.to_string(),
                Arc::new(ScriptedCluster {
                    name: name.to_string(),
                    probe,
                    deploy,
                    deploys: AtomicUsize::new(0),
                }),
            );
            Arc::new(Self {
                clusters,
                resolves: AtomicUsize::new(0),
            })
        }

        fn deploys(&self, name: &str) -> usize {
            self.clusters[name].deploys.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ClusterResolver for Clusters {
        async fn resolve(&self, name: &str) -> berth_cluster::Result<Arc<dyn Cluster>> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            self.clusters
                .get(name)
                .map(|c| Arc::clone(c) as Arc<dyn Cluster>)
                .ok_or_else(|| ClusterError::NotFound(name.to_string()))
        }
    }

    fn store_with_job(payload: &str) -> MemoryJobStore {
        let store = MemoryJobStore::new();
        store
            .insert(NewJob::new("deployment", payload).into_job(42, chrono::Utc::now()))
            .unwrap();
        store
    }

    fn pipeline(clusters: Arc<Clusters>) -> DeploymentPipeline {
        DeploymentPipeline::new(clusters, Duration::from_millis(200))
    }

    async fn process(
        pipeline: &DeploymentPipeline,
        store: &MemoryJobStore,
        raw: &str,
    ) -> Result<Outcome, StageFault> {
        let mut conn = store.connect().await.unwrap();
        let ctx = WorkerContext::new(0);
        let outcome = pipeline.process(&ctx, conn.as_mut(), raw).await;
        conn.close().await;
        outcome
    }

    #[tokio::test]
    async fn test_successful_deployment() {
        let clusters = Clusters::with("prod-a", Reply::Ok, Reply::Ok);
        let store = store_with_job(PAYLOAD);

        let outcome = process(&pipeline(clusters.clone()), &store, MESSAGE)
            .await
            .unwrap();

        assert_eq!(outcome.job_id, 42);
        assert_eq!(outcome.status, JobStatus::Success);
        assert_eq!(outcome.result, "Deployment finished successfully");

        let job = store.get(42).unwrap();
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.result, SUCCESS_RESULT);
        assert_eq!(job.payload, PAYLOAD);
        assert!(job.run_at.unwrap() >= job.created_at);
        assert_eq!(clusters.deploys("prod-a"), 1);
    }

    #[tokio::test]
    async fn test_unknown_cluster_fails_job() {
        let clusters = Clusters::with("prod-b", Reply::Ok, Reply::Ok);
        let store = store_with_job(PAYLOAD);

        let outcome = process(&pipeline(clusters.clone()), &store, MESSAGE)
            .await
            .unwrap();

        assert_eq!(outcome.status, JobStatus::Failed);
        let job = store.get(42).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.result.contains("can not find the cluster"));
        assert!(job.result.contains("m-1"));
        assert!(job.run_at.is_some());
        assert_eq!(clusters.deploys("prod-b"), 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_never_reaches_cluster() {
        let clusters = Clusters::with("prod-a", Reply::Ok, Reply::Ok);
        let store = store_with_job(r#"{"cluster":"prod-a"}"#);

        let outcome = process(&pipeline(clusters.clone()), &store, MESSAGE)
            .await
            .unwrap();

        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(outcome.result, "Invalid job payload, UUID m-1");
        assert!(store.get(42).unwrap().run_at.is_some());
        assert_eq!(clusters.resolves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_probe_not_ok_or_failing_fails_job() {
        for probe in [Reply::NotOk, Reply::Fail, Reply::Hang] {
            let clusters = Clusters::with("prod-a", probe, Reply::Ok);
            let store = store_with_job(PAYLOAD);

            let outcome = process(&pipeline(clusters.clone()), &store, MESSAGE)
                .await
                .unwrap();

            assert_eq!(outcome.status, JobStatus::Failed);
            assert_eq!(outcome.result, "Worker unable to ping cluster, UUID m-1");
            assert_eq!(clusters.deploys("prod-a"), 0);
        }
    }

    #[tokio::test]
    async fn test_deploy_not_ok_or_failing_fails_job() {
        for deploy in [Reply::NotOk, Reply::Fail, Reply::Hang] {
            let clusters = Clusters::with("prod-a", Reply::Ok, deploy);
            let store = store_with_job(PAYLOAD);

            let outcome = process(&pipeline(clusters.clone()), &store, MESSAGE)
                .await
                .unwrap();

            assert_eq!(outcome.status, JobStatus::Failed);
            assert_eq!(outcome.result, "Failure during deployment, UUID m-1");
            assert_eq!(store.get(42).unwrap().status, JobStatus::Failed);
        }
    }

    #[tokio::test]
    async fn test_malformed_message_touches_nothing() {
        let clusters = Clusters::with("prod-a", Reply::Ok, Reply::Ok);
        let store = store_with_job(PAYLOAD);
        let before = store.get(42).unwrap();

        for raw in ["", "{", r#"{"job":42}"#, r#"{"uuid":"m-1","job":42,"x":1}"#] {
            let fault = process(&pipeline(clusters.clone()), &store, raw)
                .await
                .unwrap_err();
            assert!(matches!(fault, StageFault::Message(_)));
            assert!(!fault.is_connection_fault());
        }

        assert_eq!(store.get(42).unwrap(), before);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_job_is_skipped() {
        let clusters = Clusters::with("prod-a", Reply::Ok, Reply::Ok);
        let store = store_with_job(PAYLOAD);

        let fault = process(&pipeline(clusters), &store, r#"{"uuid":"m-2","job":7}"#)
            .await
            .unwrap_err();

        assert!(matches!(fault, StageFault::JobNotFound(7)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_store_outage_leaves_job_untouched() {
        let clusters = Clusters::with("prod-a", Reply::Ok, Reply::Ok);
        let store = store_with_job(PAYLOAD);
        let mut conn = store.connect().await.unwrap();

        store.set_available(false);
        let fault = pipeline(clusters.clone())
            .process(&WorkerContext::new(3), conn.as_mut(), MESSAGE)
            .await
            .unwrap_err();
        store.set_available(true);

        assert!(matches!(fault, StageFault::Load { job_id: 42, .. }));
        assert!(fault.is_connection_fault());
        assert_eq!(store.get(42).unwrap().status, JobStatus::Queued);
        assert_eq!(clusters.resolves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_is_reported() {
        struct ReadOnly(Job);

        #[async_trait]
        impl JobConnection for ReadOnly {
            async fn create(&mut self, _job: NewJob) -> Result<Job, StoreError> {
                Err(StoreError::Unavailable("read only".into()))
            }
            async fn get_by_id(&mut self, _id: i64) -> Result<Option<Job>, StoreError> {
                Ok(Some(self.0.clone()))
            }
            async fn get_by_uuid(&mut self, _uuid: Uuid) -> Result<Option<Job>, StoreError> {
                Ok(Some(self.0.clone()))
            }
            async fn update(&mut self, _job: &Job) -> Result<(), StoreError> {
                Err(StoreError::Unavailable("read only".into()))
            }
            async fn delete(&mut self, _id: i64) -> Result<(), StoreError> {
                Err(StoreError::Unavailable("read only".into()))
            }
            async fn close(&mut self) {}
        }

        let clusters = Clusters::with("prod-a", Reply::Ok, Reply::Ok);
        let mut conn = ReadOnly(NewJob::new("deployment", PAYLOAD).into_job(42, chrono::Utc::now()));

        let fault = pipeline(clusters)
            .process(&WorkerContext::new(0), &mut conn, MESSAGE)
            .await
            .unwrap_err();

        assert!(matches!(fault, StageFault::Commit { job_id: 42, .. }));
        assert!(fault.is_connection_fault());
    }

    #[tokio::test]
    async fn test_redelivery_yields_same_status() {
        let clusters = Clusters::with("prod-a", Reply::Ok, Reply::Ok);
        let store = store_with_job(PAYLOAD);
        let pipeline = pipeline(clusters.clone());

        let first = process(&pipeline, &store, MESSAGE).await.unwrap();
        let first_run_at = store.get(42).unwrap().run_at.unwrap();
        let second = process(&pipeline, &store, MESSAGE).await.unwrap();
        let second_run_at = store.get(42).unwrap().run_at.unwrap();

        assert_eq!(first.status, second.status);
        assert_eq!(first.result, second.result);
        assert!(second_run_at >= first_run_at);
        assert_eq!(clusters.deploys("prod-a"), 2);
    }

    #[test]
    fn test_failure_result_messages() {
        let failure = JobFailure::ClusterNotFound(ClusterError::NotFound("prod-a".into()));
        assert_eq!(
            failure.result_message("m-9"),
            "Worker can not find the cluster, UUID m-9"
        );
        assert_eq!(
            JobFailure::DeploymentFailed("x".into()).result_message("m-9"),
            "Failure during deployment, UUID m-9"
        );
    }
}
