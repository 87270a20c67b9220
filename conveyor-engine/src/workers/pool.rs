//! Bounded pool of executor workers.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::store::base::JobStore;
use crate::workers::runner::JobRunner;

/// A fixed-size pool of workers that claim and run pending jobs.
///
/// Each worker loops on the store's atomic claim: the compare-and-set inside
/// [`JobStore::claim_next_job`] guarantees that two workers can never both own
/// the same job. An idle worker sleeps for the poll interval before trying
/// again; a shutdown signal stops every worker after its current job.
pub struct ExecutorPool {
    join_set: JoinSet<EngineResult<()>>,
}

impl ExecutorPool {
    /// Spawns `workers` worker tasks claiming jobs from `store`.
    pub fn start(
        workers: u16,
        store: Arc<dyn JobStore>,
        runner: Arc<JobRunner>,
        poll_interval: Duration,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        let mut join_set = JoinSet::new();

        for worker_id in 0..workers {
            let store = Arc::clone(&store);
            let runner = Arc::clone(&runner);
            let shutdown_rx = shutdown_rx.clone();

            join_set.spawn(worker_loop(
                worker_id,
                store,
                runner,
                poll_interval,
                shutdown_rx,
            ));
        }

        info!(workers, "started executor pool");

        Self { join_set }
    }

    /// Waits for every worker to finish.
    ///
    /// Collects worker errors and panics; a panic surfaces as
    /// [`ErrorKind::ExecutorWorkerPanic`].
    pub async fn wait_all(mut self) -> EngineResult<()> {
        let mut errors: Vec<EngineError> = Vec::new();

        while let Some(joined) = self.join_set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => errors.push(err),
                Err(join_err) => errors.push(engine_error!(
                    ErrorKind::ExecutorWorkerPanic,
                    "executor worker panicked",
                    detail = join_err.to_string()
                )),
            }
        }

        if !errors.is_empty() {
            return Err(EngineError::from(errors));
        }

        Ok(())
    }
}

/// The claim-run loop of a single worker.
async fn worker_loop(
    worker_id: u16,
    store: Arc<dyn JobStore>,
    runner: Arc<JobRunner>,
    poll_interval: Duration,
    mut shutdown_rx: ShutdownRx,
) -> EngineResult<()> {
    debug!(worker_id, "executor worker started");

    loop {
        // Check for shutdown between jobs without blocking on it.
        if shutdown_rx.has_changed().unwrap_or(true) {
            break;
        }

        match store.claim_next_job().await {
            Ok(Some(job)) => {
                debug!(worker_id, job_id = %job.id, "claimed job");
                if let Err(err) = runner.run(job).await {
                    warn!(worker_id, %err, "job run failed unexpectedly");
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(jittered(poll_interval)) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
            Err(err) => {
                warn!(worker_id, %err, "failed to claim a job");
                tokio::select! {
                    _ = tokio::time::sleep(jittered(poll_interval)) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
        }
    }

    debug!(worker_id, "executor worker stopped");

    Ok(())
}

/// Adds up to 25% of random jitter so idle workers do not poll in lockstep.
fn jittered(poll_interval: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=poll_interval.as_millis() as u64 / 4);
    poll_interval + Duration::from_millis(jitter)
}
