//! Engine facade tying together the store, registry, scheduler, and executor.

use std::sync::Arc;

use chrono::Utc;
use conveyor_config::shared::EngineConfig;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::adapters::registry::AdapterRegistry;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::engine_error;
use crate::error::{EngineResult, ErrorKind};
use crate::schedule::scheduler::Scheduler;
use crate::store::base::{JobFilter, JobStore};
use crate::types::{
    AdapterConfig, ErrorPolicy, Job, JobId, JobStatus, LogEntry, LogLevel, Pipeline, PipelineId,
    PipelineStatus, TransformationConfig,
};
use crate::workers::pool::ExecutorPool;
use crate::workers::runner::JobRunner;

/// Client-supplied pipeline definition used by create and update operations.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source_type: String,
    pub source_config: AdapterConfig,
    pub destination_type: String,
    pub destination_config: AdapterConfig,
    #[serde(default)]
    pub transformation: Option<TransformationConfig>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

/// Handles for the background tasks of a started engine.
struct RunningTasks {
    scheduler: JoinHandle<EngineResult<()>>,
    pool: ExecutorPool,
}

/// The pipeline execution engine.
///
/// Owns the job store, the adapter registry, and (once started) the scheduler
/// loop and the executor worker pool. All client-facing operations go through
/// this type; the API layer is a thin mapping on top of it.
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn JobStore>,
    registry: Arc<AdapterRegistry>,
    shutdown_tx: ShutdownTx,
    tasks: Option<RunningTasks>,
}

impl Engine {
    /// Creates a stopped engine.
    ///
    /// Fails when the engine configuration is invalid.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn JobStore>,
        registry: Arc<AdapterRegistry>,
    ) -> EngineResult<Self> {
        config.validate().map_err(|err| {
            engine_error!(
                ErrorKind::ConfigError,
                "invalid engine configuration",
                detail = err.to_string()
            )
        })?;

        let (shutdown_tx, _) = create_shutdown_channel();

        Ok(Self {
            config,
            store,
            registry,
            shutdown_tx,
            tasks: None,
        })
    }

    /// Starts the scheduler loop and the executor worker pool.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.tasks.is_some() {
            return Err(engine_error!(
                ErrorKind::Conflict,
                "engine is already started"
            ));
        }

        info!(
            workers = self.config.workers,
            tick_interval_secs = self.config.tick_interval_secs,
            "starting engine"
        );

        let runner = Arc::new(JobRunner::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            self.config.record_retry.clone(),
            self.config.batch_size,
            self.config.job_timeout(),
        ));

        let pool = ExecutorPool::start(
            self.config.workers,
            Arc::clone(&self.store),
            runner,
            self.config.poll_interval(),
            self.shutdown_tx.subscribe(),
        );

        let scheduler = Scheduler::new(
            Arc::clone(&self.store),
            self.config.tick_interval(),
            self.shutdown_tx.subscribe(),
        );
        let scheduler = tokio::spawn(scheduler.run());

        self.tasks = Some(RunningTasks { scheduler, pool });

        Ok(())
    }

    /// Signals all background tasks to stop.
    pub fn shutdown(&self) {
        self.shutdown_tx.shutdown();
    }

    /// Waits for all background tasks to finish.
    pub async fn wait(&mut self) -> EngineResult<()> {
        let Some(tasks) = self.tasks.take() else {
            return Ok(());
        };

        tasks.pool.wait_all().await?;
        match tasks.scheduler.await {
            Ok(result) => result,
            Err(join_err) => Err(engine_error!(
                ErrorKind::ExecutorWorkerPanic,
                "scheduler task panicked",
                detail = join_err.to_string()
            )),
        }
    }

    /// Signals shutdown and waits for completion.
    pub async fn shutdown_and_wait(&mut self) -> EngineResult<()> {
        self.shutdown();
        self.wait().await
    }

    /// Returns the adapter registry.
    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Returns the job store.
    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    // Pipeline operations.

    /// Creates a new active pipeline from a definition.
    pub async fn create_pipeline(&self, definition: PipelineDefinition) -> EngineResult<Pipeline> {
        self.validate_definition(&definition)?;

        let now = Utc::now();
        let pipeline = Pipeline {
            id: Uuid::new_v4(),
            name: definition.name,
            description: definition.description,
            source_type: definition.source_type,
            source_config: definition.source_config,
            destination_type: definition.destination_type,
            destination_config: definition.destination_config,
            transformation: definition.transformation,
            schedule: definition.schedule,
            status: PipelineStatus::Active,
            error_policy: definition.error_policy,
            created_at: now,
            updated_at: now,
            job_count: 0,
            success_count: 0,
            last_run_at: None,
        };

        self.store.insert_pipeline(pipeline.clone()).await?;
        info!(pipeline_id = %pipeline.id, pipeline_name = %pipeline.name, "created pipeline");

        Ok(pipeline)
    }

    /// Replaces a pipeline's configuration.
    ///
    /// Queued and running jobs are unaffected; they execute against the
    /// snapshot frozen at their creation.
    pub async fn update_pipeline(
        &self,
        pipeline_id: PipelineId,
        definition: PipelineDefinition,
    ) -> EngineResult<Pipeline> {
        self.validate_definition(&definition)?;

        let mut pipeline = self.store.get_pipeline(pipeline_id).await?;
        pipeline.name = definition.name;
        pipeline.description = definition.description;
        pipeline.source_type = definition.source_type;
        pipeline.source_config = definition.source_config;
        pipeline.destination_type = definition.destination_type;
        pipeline.destination_config = definition.destination_config;
        pipeline.transformation = definition.transformation;
        pipeline.schedule = definition.schedule;
        pipeline.error_policy = definition.error_policy;
        pipeline.updated_at = Utc::now();

        self.store.update_pipeline(pipeline.clone()).await?;

        Ok(pipeline)
    }

    pub async fn get_pipeline(&self, pipeline_id: PipelineId) -> EngineResult<Pipeline> {
        self.store.get_pipeline(pipeline_id).await
    }

    pub async fn list_pipelines(&self) -> EngineResult<Vec<Pipeline>> {
        self.store.list_pipelines().await
    }

    /// Deletes a pipeline. Rejected while it has pending or running jobs.
    pub async fn delete_pipeline(&self, pipeline_id: PipelineId) -> EngineResult<()> {
        self.store.delete_pipeline(pipeline_id).await
    }

    /// Activates or deactivates a pipeline.
    pub async fn set_pipeline_status(
        &self,
        pipeline_id: PipelineId,
        status: PipelineStatus,
    ) -> EngineResult<()> {
        self.store.set_pipeline_status(pipeline_id, status).await
    }

    /// Enqueues a manual execution of a pipeline and returns the new job id.
    pub async fn execute_pipeline(&self, pipeline_id: PipelineId) -> EngineResult<JobId> {
        let pipeline = self.store.get_pipeline(pipeline_id).await?;

        if pipeline.status != PipelineStatus::Active {
            return Err(engine_error!(
                ErrorKind::Conflict,
                "pipeline is not active",
                format!("pipeline `{pipeline_id}` must be active to execute")
            ));
        }

        let job = Job::new(&pipeline);
        let job_id = job.id;
        self.store.insert_job(job).await?;
        info!(%pipeline_id, %job_id, "enqueued manual job");

        Ok(job_id)
    }

    /// Tests a source adapter configuration without persisting anything.
    pub async fn test_source_connection(
        &self,
        kind: &str,
        config: &AdapterConfig,
    ) -> EngineResult<()> {
        let mut adapter = self.registry.create_source(kind, config)?;
        let result = adapter.test_connection().await;
        let _ = adapter.close().await;
        result
    }

    /// Tests a destination adapter configuration without persisting anything.
    pub async fn test_destination_connection(
        &self,
        kind: &str,
        config: &AdapterConfig,
    ) -> EngineResult<()> {
        let mut adapter = self.registry.create_destination(kind, config)?;
        let result = adapter.test_connection().await;
        let _ = adapter.close().await;
        result
    }

    // Job operations.

    pub async fn get_job(&self, job_id: JobId) -> EngineResult<Job> {
        self.store.get_job(job_id).await
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> EngineResult<Vec<Job>> {
        self.store.list_jobs(filter).await
    }

    /// Retries a failed job by creating a fresh pending job.
    ///
    /// The original job is never mutated. The new job freezes the pipeline's
    /// current configuration and re-runs the extract from the beginning.
    pub async fn retry_job(&self, job_id: JobId) -> EngineResult<JobId> {
        let job = self.store.get_job(job_id).await?;

        if job.status != JobStatus::Failed {
            return Err(engine_error!(
                ErrorKind::InvalidTransition,
                "only failed jobs can be retried",
                format!("job `{job_id}` is `{}`", job.status)
            ));
        }

        let pipeline = self.store.get_pipeline(job.pipeline_id).await?;
        let mut retry = Job::new(&pipeline);
        retry.logs.push(LogEntry::new(
            LogLevel::Info,
            format!("Job retry initiated (from job {job_id})"),
        ));
        let retry_id = retry.id;
        self.store.insert_job(retry).await?;
        info!(original_job_id = %job_id, retry_job_id = %retry_id, "job retry initiated");

        Ok(retry_id)
    }

    /// Cancels a pending or running job.
    pub async fn cancel_job(&self, job_id: JobId) -> EngineResult<Job> {
        // The status may move under us between the read and the CAS (a worker
        // claiming the job, most commonly); one re-read covers that race.
        let mut retried = false;
        loop {
            let job = self.store.get_job(job_id).await?;

            let expected = match job.status {
                JobStatus::Pending => JobStatus::Pending,
                JobStatus::Running => JobStatus::Running,
                _ => {
                    return Err(engine_error!(
                        ErrorKind::InvalidTransition,
                        "only pending or running jobs can be cancelled",
                        format!("job `{job_id}` is `{}`", job.status)
                    ));
                }
            };

            match self
                .store
                .transition_job(job_id, expected, JobStatus::Cancelled)
                .await
            {
                Ok(job) => {
                    info!(%job_id, "job cancelled");
                    return Ok(job);
                }
                Err(err) if err.kind() == ErrorKind::InvalidTransition && !retried => {
                    retried = true;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Validates a pipeline definition against the registry and cron grammar.
    fn validate_definition(&self, definition: &PipelineDefinition) -> EngineResult<()> {
        if definition.name.trim().is_empty() {
            return Err(engine_error!(
                ErrorKind::ConfigError,
                "pipeline name must not be empty"
            ));
        }

        if !self.registry.has_source(&definition.source_type) {
            return Err(engine_error!(
                ErrorKind::ConfigError,
                "unknown source adapter kind",
                format!("`{}` is not a registered source adapter kind", definition.source_type)
            ));
        }
        if !self.registry.has_destination(&definition.destination_type) {
            return Err(engine_error!(
                ErrorKind::ConfigError,
                "unknown destination adapter kind",
                format!(
                    "`{}` is not a registered destination adapter kind",
                    definition.destination_type
                )
            ));
        }

        if definition.source_config.is_empty() {
            return Err(engine_error!(
                ErrorKind::ConfigError,
                "source configuration must not be empty"
            ));
        }
        if definition.destination_config.is_empty() {
            return Err(engine_error!(
                ErrorKind::ConfigError,
                "destination configuration must not be empty"
            ));
        }

        if let Some(schedule) = definition.schedule.as_deref()
            && !schedule.trim().is_empty()
        {
            crate::schedule::cron::CronSchedule::parse(schedule)?;
        }

        Ok(())
    }
}
