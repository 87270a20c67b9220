//! Runs one claimed job through extract, transform, and load.

use std::sync::Arc;
use std::time::Duration;

use conveyor_config::shared::RecordRetryConfig;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::adapters::base::{DestinationAdapter, SourceAdapter};
use crate::adapters::registry::AdapterRegistry;
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::store::base::JobStore;
use crate::transform;
use crate::types::{Job, JobError, JobStatus, LogEntry, LogLevel, Record};

/// How a job execution ended, short of a fatal error.
enum Outcome {
    /// The stream was exhausted; counters hold the final totals.
    Completed,
    /// A cancellation was observed at a batch boundary.
    Cancelled,
}

/// Adapter instances owned by one job execution.
///
/// Held behind a mutex shared with the cleanup path so connections are closed
/// even when the executing future is dropped by the job timeout.
#[derive(Default)]
struct Adapters {
    source: Option<Box<dyn SourceAdapter>>,
    destination: Option<Box<dyn DestinationAdapter>>,
}

impl Adapters {
    async fn close(&mut self, job_id: crate::types::JobId) {
        if let Some(mut source) = self.source.take()
            && let Err(err) = source.close().await
        {
            warn!(%job_id, %err, "failed to close source adapter");
        }
        if let Some(mut destination) = self.destination.take()
            && let Err(err) = destination.close().await
        {
            warn!(%job_id, %err, "failed to close destination adapter");
        }
    }
}

/// Drives one claimed job to a terminal state.
///
/// The runner owns no job state of its own; every observable effect goes
/// through the store, and the store's terminal guard makes post-cancellation
/// effects no-ops.
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    registry: Arc<AdapterRegistry>,
    record_retry: RecordRetryConfig,
    batch_size: usize,
    job_timeout: Duration,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<AdapterRegistry>,
        record_retry: RecordRetryConfig,
        batch_size: usize,
        job_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            record_retry,
            batch_size,
            job_timeout,
        }
    }

    /// Runs a job that was already claimed (transitioned to running).
    ///
    /// Always leaves the job in a terminal state unless a concurrent cancel
    /// got there first, and always releases adapter resources.
    pub async fn run(&self, job: Job) -> EngineResult<()> {
        info!(job_id = %job.id, pipeline_id = %job.pipeline_id, "starting job execution");
        self.log(&job, LogLevel::Info, "Pipeline execution started")
            .await;

        let adapters = Arc::new(Mutex::new(Adapters::default()));

        let outcome = tokio::time::timeout(
            self.job_timeout,
            self.execute(&job, Arc::clone(&adapters)),
        )
        .await;

        // Runs on every path, including timeout: the timed-out future has been
        // dropped, so the lock is free and holds whatever was constructed.
        adapters.lock().await.close(job.id).await;

        match outcome {
            Ok(Ok(Outcome::Completed)) => {
                self.log(&job, LogLevel::Info, "Pipeline execution completed")
                    .await;
                self.finish(&job, JobStatus::Completed).await;
            }
            Ok(Ok(Outcome::Cancelled)) => {
                // The cancel request already moved the job to cancelled; there
                // is nothing left to transition.
                info!(job_id = %job.id, "job cancelled, stopping execution");
            }
            Ok(Err(err)) => {
                warn!(job_id = %job.id, %err, "job execution failed");
                self.record_failure(&job, &err).await;
                self.finish(&job, JobStatus::Failed).await;
            }
            Err(_elapsed) => {
                warn!(
                    job_id = %job.id,
                    timeout_secs = self.job_timeout.as_secs(),
                    "job execution timed out"
                );
                let err = engine_error!(
                    ErrorKind::JobTimeout,
                    "job exceeded its configured timeout",
                    format!("no progress after {} seconds", self.job_timeout.as_secs())
                );
                self.record_failure(&job, &err).await;
                self.finish(&job, JobStatus::Failed).await;
            }
        }

        Ok(())
    }

    /// The fallible, timeout-bounded part of job execution.
    async fn execute(&self, job: &Job, adapters: Arc<Mutex<Adapters>>) -> EngineResult<Outcome> {
        let snapshot = &job.snapshot;
        let mut guard = adapters.lock().await;

        self.log(job, LogLevel::Info, "Initializing source adapter")
            .await;
        guard.source = Some(
            self.registry
                .create_source(&snapshot.source_type, &snapshot.source_config)?,
        );

        self.log(job, LogLevel::Info, "Initializing destination adapter")
            .await;
        guard.destination = Some(
            self.registry
                .create_destination(&snapshot.destination_type, &snapshot.destination_config)?,
        );

        // Reborrow once so both field borrows come from the same reference;
        // the options were just populated.
        let adapters = &mut *guard;
        let source = adapters.source.as_mut().ok_or_else(missing_adapter)?;
        let destination = adapters.destination.as_mut().ok_or_else(missing_adapter)?;

        source.test_connection().await?;
        destination.test_connection().await?;

        self.log(job, LogLevel::Info, "Fetching data from source").await;
        let mut stream = source.extract().await?;

        let mut source_count: u64 = 0;
        let mut destination_count: u64 = 0;
        let mut since_flush: usize = 0;

        while let Some(record) = stream.next().await {
            let record = record?;
            source_count += 1;

            match transform::apply(snapshot.transformation.as_ref(), record) {
                Ok(record) => {
                    match self
                        .load_with_policy(job, destination.as_mut(), &record)
                        .await
                    {
                        Ok(true) => destination_count += 1,
                        Ok(false) => {}
                        Err(err) => {
                            // Counters are flushed before escalating so a job
                            // failed under the fail policy still reports how
                            // far it got.
                            self.flush_progress(job, source_count, destination_count)
                                .await;
                            return Err(err);
                        }
                    }
                }
                Err(err) => {
                    // Conversion failures are deterministic, so the retry
                    // policy degrades to counting them like skip does.
                    if snapshot.error_policy == crate::types::ErrorPolicy::Fail {
                        self.flush_progress(job, source_count, destination_count)
                            .await;
                        return Err(err);
                    }
                    self.store
                        .append_error(
                            job.id,
                            JobError::new(
                                "record transformation failed",
                                err.detail().map(str::to_owned),
                            ),
                        )
                        .await
                        .ok();
                }
            }

            since_flush += 1;
            if since_flush >= self.batch_size {
                since_flush = 0;
                self.flush_progress(job, source_count, destination_count)
                    .await;

                if self.is_cancelled(job).await {
                    return Ok(Outcome::Cancelled);
                }
            }
        }

        self.flush_progress(job, source_count, destination_count)
            .await;
        self.log(
            job,
            LogLevel::Info,
            format!("Uploaded {destination_count} of {source_count} records to destination"),
        )
        .await;

        Ok(Outcome::Completed)
    }

    /// Loads one record under the pipeline's error policy.
    ///
    /// Returns `Ok(true)` when the record reached the destination, `Ok(false)`
    /// when it was counted as an error and execution continues, and `Err` when
    /// the policy escalates the failure to job failure.
    async fn load_with_policy(
        &self,
        job: &Job,
        destination: &mut dyn DestinationAdapter,
        record: &Record,
    ) -> EngineResult<bool> {
        use crate::types::ErrorPolicy;

        let policy = job.snapshot.error_policy;
        let attempts = match policy {
            ErrorPolicy::Retry => self.record_retry.max_attempts + 1,
            ErrorPolicy::Skip | ErrorPolicy::Fail => 1,
        };

        let mut last_error = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.record_retry.backoff_for_attempt(attempt - 1)).await;
            }
            match destination.load(record).await {
                Ok(()) => return Ok(true),
                Err(err) => {
                    debug!(
                        job_id = %job.id,
                        record_id = %err.record_id,
                        attempt,
                        "record load attempt failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        // All attempts exhausted.
        let err = last_error.ok_or_else(|| {
            engine_error!(ErrorKind::Unknown, "record load ended without a result")
        })?;

        if policy == ErrorPolicy::Fail {
            // `record_failure` in the caller writes the single job error.
            return Err(engine_error!(
                ErrorKind::RecordLoadFailed,
                "record load failed under fail policy",
                format!("record `{}`: {}", err.record_id, err.message)
            ));
        }

        self.store
            .append_error(
                job.id,
                JobError::new(err.message.clone(), Some(format!("record `{}`", err.record_id))),
            )
            .await
            .ok();

        Ok(false)
    }

    async fn is_cancelled(&self, job: &Job) -> bool {
        match self.store.get_job(job.id).await {
            Ok(current) => current.status == JobStatus::Cancelled,
            Err(err) => {
                warn!(job_id = %job.id, %err, "failed to poll job status");
                false
            }
        }
    }

    async fn flush_progress(&self, job: &Job, source_count: u64, destination_count: u64) {
        if let Err(err) = self
            .store
            .record_progress(job.id, source_count, destination_count)
            .await
        {
            warn!(job_id = %job.id, %err, "failed to record job progress");
        }
    }

    async fn record_failure(&self, job: &Job, err: &EngineError) {
        self.log(job, LogLevel::Error, err.description().to_owned())
            .await;
        self.store
            .append_error(
                job.id,
                JobError::new(err.description().to_owned(), err.detail().map(str::to_owned)),
            )
            .await
            .ok();
    }

    /// Moves the job to a terminal state, tolerating a concurrent cancel.
    async fn finish(&self, job: &Job, next: JobStatus) {
        match self
            .store
            .transition_job(job.id, JobStatus::Running, next)
            .await
        {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::InvalidTransition => {
                // A cancel won the race; the job is already terminal.
                debug!(job_id = %job.id, "job reached a terminal state concurrently");
            }
            Err(err) => {
                warn!(job_id = %job.id, %err, "failed to finalize job");
            }
        }
    }

    async fn log(&self, job: &Job, level: LogLevel, message: impl Into<String>) {
        if let Err(err) = self
            .store
            .append_log(job.id, LogEntry::new(level, message))
            .await
        {
            warn!(job_id = %job.id, %err, "failed to append job log");
        }
    }
}

fn missing_adapter() -> EngineError {
    engine_error!(ErrorKind::Unknown, "adapter instance missing after construction")
}
