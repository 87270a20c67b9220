use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{EngineResult, ErrorKind};
use crate::store::base::{JobFilter, JobStore};
use crate::types::{
    Job, JobError, JobId, JobStatus, LogEntry, LogLevel, Pipeline, PipelineId, PipelineStatus,
};

/// Inner state of [`MemoryStore`].
#[derive(Debug)]
struct Inner {
    /// All pipelines keyed by id.
    pipelines: BTreeMap<PipelineId, Pipeline>,
    /// All jobs keyed by id.
    jobs: BTreeMap<JobId, Job>,
    /// Job ids in insertion order, which is creation order. Drives the
    /// oldest-first claim scan and newest-first listings.
    job_order: Vec<JobId>,
    /// Pipeline ids in insertion order.
    pipeline_order: Vec<PipelineId>,
}

/// In-memory storage for pipelines and jobs.
///
/// [`MemoryStore`] keeps all state behind a single [`Mutex`], which makes every
/// store operation atomic with respect to every other one. That is what gives
/// [`JobStore::claim_next_job`] and [`JobStore::transition_job`] their
/// compare-and-set semantics: a transition observes the job's current status
/// and replaces it while holding the lock, so concurrent claimers cannot both
/// succeed.
///
/// All data is lost on process restart; this store is intended for tests,
/// development, and single-node deployments where durability is not required.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Creates a new empty memory store.
    pub fn new() -> Self {
        let inner = Inner {
            pipelines: BTreeMap::new(),
            jobs: BTreeMap::new(),
            job_order: Vec::new(),
            pipeline_order: Vec::new(),
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn pipeline_not_found(pipeline_id: PipelineId) -> crate::error::EngineError {
    engine_error!(
        ErrorKind::PipelineNotFound,
        "pipeline not found",
        format!("no pipeline with id `{pipeline_id}`")
    )
}

fn job_not_found(job_id: JobId) -> crate::error::EngineError {
    engine_error!(
        ErrorKind::JobNotFound,
        "job not found",
        format!("no job with id `{job_id}`")
    )
}

impl Inner {
    /// Applies a status transition under the lock, enforcing the legal edges.
    fn transition(
        &mut self,
        job_id: JobId,
        expected: JobStatus,
        next: JobStatus,
    ) -> EngineResult<Job> {
        let job = self.jobs.get_mut(&job_id).ok_or_else(|| job_not_found(job_id))?;

        if job.status != expected {
            return Err(engine_error!(
                ErrorKind::InvalidTransition,
                "job is not in the expected state",
                format!(
                    "job `{job_id}` is `{}`, expected `{expected}` before moving to `{next}`",
                    job.status
                )
            ));
        }

        if !expected.can_transition_to(next) {
            return Err(engine_error!(
                ErrorKind::InvalidTransition,
                "illegal job status transition",
                format!("`{expected}` -> `{next}` is not a legal edge")
            ));
        }

        job.status = next;
        match next {
            JobStatus::Running => {
                job.started_at = Some(Utc::now());
            }
            // A job cancelled while pending never started, so it keeps no
            // timestamps beyond created_at.
            JobStatus::Cancelled if expected == JobStatus::Pending => {}
            JobStatus::Cancelled => {
                // Appended as part of the transition so the entry cannot be
                // lost to the terminal-state mutation guard.
                job.logs
                    .push(LogEntry::new(LogLevel::Info, "Job cancelled by user"));
                job.completed_at = Some(Utc::now());
            }
            JobStatus::Completed | JobStatus::Failed => {
                job.completed_at = Some(Utc::now());
            }
            JobStatus::Pending => {}
        }

        if next == JobStatus::Completed
            && let Some(pipeline) = self.pipelines.get_mut(&job.pipeline_id)
        {
            pipeline.success_count += 1;
        }

        Ok(job.clone())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_pipeline(&self, pipeline: Pipeline) -> EngineResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.pipelines.contains_key(&pipeline.id) {
            return Err(engine_error!(
                ErrorKind::Conflict,
                "pipeline already exists",
                format!("a pipeline with id `{}` is already stored", pipeline.id)
            ));
        }

        inner.pipeline_order.push(pipeline.id);
        inner.pipelines.insert(pipeline.id, pipeline);

        Ok(())
    }

    async fn get_pipeline(&self, pipeline_id: PipelineId) -> EngineResult<Pipeline> {
        let inner = self.inner.lock().await;

        inner
            .pipelines
            .get(&pipeline_id)
            .cloned()
            .ok_or_else(|| pipeline_not_found(pipeline_id))
    }

    async fn list_pipelines(&self) -> EngineResult<Vec<Pipeline>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .pipeline_order
            .iter()
            .filter_map(|id| inner.pipelines.get(id).cloned())
            .collect())
    }

    async fn update_pipeline(&self, pipeline: Pipeline) -> EngineResult<()> {
        let mut inner = self.inner.lock().await;

        if !inner.pipelines.contains_key(&pipeline.id) {
            return Err(pipeline_not_found(pipeline.id));
        }

        inner.pipelines.insert(pipeline.id, pipeline);

        Ok(())
    }

    async fn delete_pipeline(&self, pipeline_id: PipelineId) -> EngineResult<()> {
        let mut inner = self.inner.lock().await;

        if !inner.pipelines.contains_key(&pipeline_id) {
            return Err(pipeline_not_found(pipeline_id));
        }

        let live_jobs = inner
            .jobs
            .values()
            .filter(|job| job.pipeline_id == pipeline_id && !job.status.is_terminal())
            .count();
        if live_jobs > 0 {
            return Err(engine_error!(
                ErrorKind::Conflict,
                "pipeline has live jobs",
                format!(
                    "pipeline `{pipeline_id}` has {live_jobs} pending or running job(s); cancel them first"
                )
            ));
        }

        inner.pipelines.remove(&pipeline_id);
        inner.pipeline_order.retain(|id| *id != pipeline_id);
        inner.jobs.retain(|_, job| job.pipeline_id != pipeline_id);
        let remaining: Vec<JobId> = inner.jobs.keys().copied().collect();
        inner.job_order.retain(|id| remaining.contains(id));

        Ok(())
    }

    async fn set_pipeline_status(
        &self,
        pipeline_id: PipelineId,
        status: PipelineStatus,
    ) -> EngineResult<()> {
        let mut inner = self.inner.lock().await;

        let pipeline = inner
            .pipelines
            .get_mut(&pipeline_id)
            .ok_or_else(|| pipeline_not_found(pipeline_id))?;
        pipeline.status = status;
        pipeline.updated_at = Utc::now();

        Ok(())
    }

    async fn insert_job(&self, job: Job) -> EngineResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.jobs.contains_key(&job.id) {
            return Err(engine_error!(
                ErrorKind::Conflict,
                "job already exists",
                format!("a job with id `{}` is already stored", job.id)
            ));
        }

        let pipeline = inner
            .pipelines
            .get_mut(&job.pipeline_id)
            .ok_or_else(|| pipeline_not_found(job.pipeline_id))?;
        pipeline.job_count += 1;
        pipeline.last_run_at = Some(job.created_at);

        inner.job_order.push(job.id);
        inner.jobs.insert(job.id, job);

        Ok(())
    }

    async fn get_job(&self, job_id: JobId) -> EngineResult<Job> {
        let inner = self.inner.lock().await;

        inner
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or_else(|| job_not_found(job_id))
    }

    async fn list_jobs(&self, filter: &JobFilter) -> EngineResult<Vec<Job>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .job_order
            .iter()
            .rev()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|job| {
                filter
                    .pipeline_id
                    .is_none_or(|pipeline_id| job.pipeline_id == pipeline_id)
            })
            .filter(|job| filter.status.is_none_or(|status| job.status == status))
            .cloned()
            .collect())
    }

    async fn has_live_job(&self, pipeline_id: PipelineId) -> EngineResult<bool> {
        let inner = self.inner.lock().await;

        Ok(inner
            .jobs
            .values()
            .any(|job| job.pipeline_id == pipeline_id && !job.status.is_terminal()))
    }

    async fn claim_next_job(&self) -> EngineResult<Option<Job>> {
        let mut inner = self.inner.lock().await;

        let claimable: Option<JobId> = inner
            .job_order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .find(|job| {
                job.status == JobStatus::Pending
                    && inner
                        .pipelines
                        .get(&job.pipeline_id)
                        .is_some_and(|pipeline| pipeline.status == PipelineStatus::Active)
            })
            .map(|job| job.id);

        match claimable {
            Some(job_id) => {
                let job = inner.transition(job_id, JobStatus::Pending, JobStatus::Running)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn transition_job(
        &self,
        job_id: JobId,
        expected: JobStatus,
        next: JobStatus,
    ) -> EngineResult<Job> {
        let mut inner = self.inner.lock().await;

        inner.transition(job_id, expected, next)
    }

    async fn append_log(&self, job_id: JobId, entry: LogEntry) -> EngineResult<()> {
        let mut inner = self.inner.lock().await;

        let job = job_mut(&mut inner, job_id)?;
        if job.status.is_terminal() {
            return Ok(());
        }
        job.logs.push(entry);

        Ok(())
    }

    async fn append_error(&self, job_id: JobId, error: JobError) -> EngineResult<()> {
        let mut inner = self.inner.lock().await;

        let job = job_mut(&mut inner, job_id)?;
        if job.status.is_terminal() {
            return Ok(());
        }
        job.errors.push(error);
        job.error_count += 1;

        Ok(())
    }

    async fn record_progress(
        &self,
        job_id: JobId,
        source_record_count: u64,
        destination_record_count: u64,
    ) -> EngineResult<()> {
        let mut inner = self.inner.lock().await;

        let job = job_mut(&mut inner, job_id)?;
        if job.status.is_terminal() {
            return Ok(());
        }
        job.source_record_count = source_record_count;
        job.destination_record_count = destination_record_count;

        Ok(())
    }
}

fn job_mut(inner: &mut Inner, job_id: JobId) -> EngineResult<&mut Job> {
    inner.jobs.get_mut(&job_id).ok_or_else(|| job_not_found(job_id))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use crate::types::{AdapterConfig, ErrorPolicy};

    use super::*;

    fn test_pipeline() -> Pipeline {
        let now = Utc::now();
        Pipeline {
            id: Uuid::new_v4(),
            name: "orders".into(),
            description: None,
            source_type: "memory".into(),
            source_config: AdapterConfig::new(),
            destination_type: "memory".into(),
            destination_config: AdapterConfig::new(),
            transformation: None,
            schedule: None,
            status: PipelineStatus::Active,
            error_policy: ErrorPolicy::Retry,
            created_at: now,
            updated_at: now,
            job_count: 0,
            success_count: 0,
            last_run_at: None,
        }
    }

    #[tokio::test]
    async fn claim_takes_oldest_pending_job() {
        let store = MemoryStore::new();
        let pipeline = test_pipeline();
        store.insert_pipeline(pipeline.clone()).await.unwrap();

        let first = Job::new(&pipeline);
        let second = Job::new(&pipeline);
        store.insert_job(first.clone()).await.unwrap();
        store.insert_job(second.clone()).await.unwrap();

        let claimed = store.claim_next_job().await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert!(claimed.started_at.is_some());

        let claimed = store.claim_next_job().await.unwrap().unwrap();
        assert_eq!(claimed.id, second.id);

        assert!(store.claim_next_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_skips_inactive_pipelines() {
        let store = MemoryStore::new();
        let pipeline = test_pipeline();
        store.insert_pipeline(pipeline.clone()).await.unwrap();
        store.insert_job(Job::new(&pipeline)).await.unwrap();

        store
            .set_pipeline_status(pipeline.id, PipelineStatus::Inactive)
            .await
            .unwrap();

        assert!(store.claim_next_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn illegal_transition_leaves_job_unchanged() {
        let store = MemoryStore::new();
        let pipeline = test_pipeline();
        store.insert_pipeline(pipeline.clone()).await.unwrap();
        let job = Job::new(&pipeline);
        store.insert_job(job.clone()).await.unwrap();

        let err = store
            .transition_job(job.id, JobStatus::Pending, JobStatus::Completed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        let stored = store.get_job(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert!(stored.completed_at.is_none());
    }

    #[tokio::test]
    async fn terminal_jobs_ignore_mutations() {
        let store = MemoryStore::new();
        let pipeline = test_pipeline();
        store.insert_pipeline(pipeline.clone()).await.unwrap();
        let job = Job::new(&pipeline);
        store.insert_job(job.clone()).await.unwrap();

        store
            .transition_job(job.id, JobStatus::Pending, JobStatus::Cancelled)
            .await
            .unwrap();

        store
            .record_progress(job.id, 10, 10)
            .await
            .unwrap();
        store
            .append_error(job.id, JobError::new("late failure", None))
            .await
            .unwrap();
        store
            .append_log(job.id, LogEntry::new(crate::types::LogLevel::Info, "late"))
            .await
            .unwrap();

        let stored = store.get_job(job.id).await.unwrap();
        assert_eq!(stored.source_record_count, 0);
        assert_eq!(stored.error_count, 0);
        assert!(stored.logs.is_empty());
    }

    #[tokio::test]
    async fn delete_with_live_jobs_is_a_conflict() {
        let store = MemoryStore::new();
        let pipeline = test_pipeline();
        store.insert_pipeline(pipeline.clone()).await.unwrap();
        let job = Job::new(&pipeline);
        store.insert_job(job.clone()).await.unwrap();

        let err = store.delete_pipeline(pipeline.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        store
            .transition_job(job.id, JobStatus::Pending, JobStatus::Cancelled)
            .await
            .unwrap();
        store.delete_pipeline(pipeline.id).await.unwrap();
        assert!(store.get_job(job.id).await.is_err());
    }

    #[tokio::test]
    async fn completion_bumps_pipeline_success_count() {
        let store = MemoryStore::new();
        let pipeline = test_pipeline();
        store.insert_pipeline(pipeline.clone()).await.unwrap();
        let job = Job::new(&pipeline);
        store.insert_job(job.clone()).await.unwrap();

        store.claim_next_job().await.unwrap().unwrap();
        store
            .transition_job(job.id, JobStatus::Running, JobStatus::Completed)
            .await
            .unwrap();

        let stored = store.get_pipeline(pipeline.id).await.unwrap();
        assert_eq!(stored.job_count, 1);
        assert_eq!(stored.success_count, 1);
        assert!(stored.last_run_at.is_some());
    }

    #[tokio::test]
    async fn pending_cancel_keeps_timestamps_unset() {
        let store = MemoryStore::new();
        let pipeline = test_pipeline();
        store.insert_pipeline(pipeline.clone()).await.unwrap();
        let job = Job::new(&pipeline);
        store.insert_job(job.clone()).await.unwrap();

        let cancelled = store
            .transition_job(job.id, JobStatus::Pending, JobStatus::Cancelled)
            .await
            .unwrap();
        assert!(cancelled.started_at.is_none());
        assert!(cancelled.completed_at.is_none());
    }
}
