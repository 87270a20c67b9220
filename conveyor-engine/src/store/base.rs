use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{
    Job, JobError, JobId, JobStatus, LogEntry, Pipeline, PipelineId, PipelineStatus,
};

/// Query filter for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub pipeline_id: Option<PipelineId>,
    pub status: Option<JobStatus>,
}

/// Storage for pipelines and jobs.
///
/// [`JobStore`] is the only mutable state shared between the scheduler, the
/// executor workers, and the API boundary. Implementations must provide an
/// atomic compare-and-set status transition ([`JobStore::transition_job`]);
/// it is the sole synchronization primitive workers rely on to avoid
/// double-claiming a job.
///
/// Mutations addressed to a job that is already terminal must be ignored
/// without error, so a job cancelled mid-run stops accumulating counters and
/// log lines no matter what its former worker still has in flight.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new pipeline.
    ///
    /// Fails with a conflict error when the id is already taken.
    async fn insert_pipeline(&self, pipeline: Pipeline) -> EngineResult<()>;

    /// Returns the pipeline with the given id.
    async fn get_pipeline(&self, pipeline_id: PipelineId) -> EngineResult<Pipeline>;

    /// Returns all pipelines ordered by creation time.
    async fn list_pipelines(&self) -> EngineResult<Vec<Pipeline>>;

    /// Replaces the stored pipeline configuration.
    ///
    /// Never touches jobs: queued and running jobs keep executing against the
    /// snapshot frozen at their creation.
    async fn update_pipeline(&self, pipeline: Pipeline) -> EngineResult<()>;

    /// Deletes a pipeline and its terminal jobs.
    ///
    /// Rejected with a conflict error while the pipeline has pending or
    /// running jobs; those must be cancelled first.
    async fn delete_pipeline(&self, pipeline_id: PipelineId) -> EngineResult<()>;

    /// Sets the activation status of a pipeline.
    async fn set_pipeline_status(
        &self,
        pipeline_id: PipelineId,
        status: PipelineStatus,
    ) -> EngineResult<()>;

    /// Inserts a new job and bumps the owning pipeline's display counters.
    async fn insert_job(&self, job: Job) -> EngineResult<()>;

    /// Returns the job with the given id.
    async fn get_job(&self, job_id: JobId) -> EngineResult<Job>;

    /// Returns jobs matching the filter, newest first.
    async fn list_jobs(&self, filter: &JobFilter) -> EngineResult<Vec<Job>>;

    /// Returns `true` when the pipeline has a pending or running job.
    async fn has_live_job(&self, pipeline_id: PipelineId) -> EngineResult<bool>;

    /// Atomically claims the oldest pending job whose pipeline is active.
    ///
    /// The claim transitions the job to running and records `started_at` in
    /// the same step. Returns `None` when no claimable job exists.
    async fn claim_next_job(&self) -> EngineResult<Option<Job>>;

    /// Atomically transitions a job from `expected` to `next`.
    ///
    /// Fails with an invalid transition error when the job is not currently in
    /// `expected` or when the edge is not legal, leaving the job unchanged.
    /// Records `started_at` when entering running and `completed_at` when a
    /// running job reaches a terminal state. Returns the updated job.
    async fn transition_job(
        &self,
        job_id: JobId,
        expected: JobStatus,
        next: JobStatus,
    ) -> EngineResult<Job>;

    /// Appends a log line to a job. Ignored once the job is terminal.
    async fn append_log(&self, job_id: JobId, entry: LogEntry) -> EngineResult<()>;

    /// Appends an error entry to a job and increments its error count.
    /// Ignored once the job is terminal.
    async fn append_error(&self, job_id: JobId, error: JobError) -> EngineResult<()>;

    /// Updates a job's record counters. Ignored once the job is terminal.
    async fn record_progress(
        &self,
        job_id: JobId,
        source_record_count: u64,
        destination_record_count: u64,
    ) -> EngineResult<()>;
}
