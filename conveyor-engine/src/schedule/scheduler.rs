//! Scheduling loop that turns cron schedules into queued jobs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::EngineResult;
use crate::schedule::cron::CronSchedule;
use crate::store::base::JobStore;
use crate::types::Job;

/// Periodic evaluator of pipeline cron schedules.
///
/// On every tick the scheduler checks each active pipeline with a schedule and
/// enqueues one pending job per pipeline whose cron expression fired inside
/// the window since the previous tick. A pipeline that already has a pending
/// or running job is skipped, so a stalled executor can never cause unbounded
/// queue growth. Missed ticks are not backfilled.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    tick_interval: std::time::Duration,
    shutdown_rx: ShutdownRx,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        tick_interval: std::time::Duration,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            store,
            tick_interval,
            shutdown_rx,
        }
    }

    /// Runs the scheduling loop until shutdown is signaled.
    pub async fn run(mut self) -> EngineResult<()> {
        info!(
            tick_interval_secs = self.tick_interval.as_secs(),
            "starting scheduler"
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately; consume it so
        // the first evaluated window is a real tick apart from startup.
        interval.tick().await;

        let mut previous_tick = Utc::now();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Utc::now();
                    match self.evaluate_tick(previous_tick, now).await {
                        Ok(enqueued) if enqueued > 0 => {
                            info!(enqueued, "scheduler tick enqueued jobs");
                        }
                        Ok(_) => {
                            debug!("scheduler tick enqueued no jobs");
                        }
                        Err(err) => {
                            warn!(%err, "scheduler tick failed");
                        }
                    }
                    previous_tick = now;
                }
                _ = self.shutdown_rx.changed() => {
                    info!("shutting down scheduler");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Evaluates one scheduling window `(window_start, window_end]`.
    ///
    /// Returns the number of jobs enqueued. Pipelines with an unparseable
    /// schedule are skipped with a warning; they can only be fixed through a
    /// pipeline update, and failing the whole tick for one bad expression
    /// would starve every other pipeline.
    pub async fn evaluate_tick(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> EngineResult<usize> {
        let pipelines = self.store.list_pipelines().await?;
        let mut enqueued = 0;

        for pipeline in pipelines {
            if !pipeline.is_schedulable() {
                continue;
            }
            let Some(expression) = pipeline.schedule.as_deref() else {
                continue;
            };

            let schedule = match CronSchedule::parse(expression) {
                Ok(schedule) => schedule,
                Err(err) => {
                    warn!(
                        pipeline_id = %pipeline.id,
                        pipeline_name = %pipeline.name,
                        %err,
                        "skipping pipeline with invalid schedule"
                    );
                    continue;
                }
            };

            if !schedule.fires_between(window_start, window_end) {
                continue;
            }

            // At most one job per pipeline may be in flight at a time.
            if self.store.has_live_job(pipeline.id).await? {
                debug!(
                    pipeline_id = %pipeline.id,
                    "schedule fired but a job is already in flight"
                );
                continue;
            }

            let job = Job::new(&pipeline);
            info!(
                pipeline_id = %pipeline.id,
                pipeline_name = %pipeline.name,
                job_id = %job.id,
                "enqueueing scheduled job"
            );
            self.store.insert_job(job).await?;
            enqueued += 1;
        }

        Ok(enqueued)
    }
}
