#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use conveyor_config::shared::{EngineConfig, RecordRetryConfig};
use conveyor_engine::adapters::AdapterRegistry;
use conveyor_engine::engine::{Engine, PipelineDefinition};
use conveyor_engine::store::{JobStore, MemoryStore};
use conveyor_engine::types::{AdapterConfig, ErrorPolicy, Job, JobId};
use serde_json::Value;

/// Engine settings tuned for fast tests: short polls, small batches, and a
/// record retry backoff measured in milliseconds.
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        workers: 2,
        poll_interval_ms: 20,
        tick_interval_secs: 1,
        job_timeout_secs: 5,
        batch_size: 10,
        record_retry: RecordRetryConfig {
            max_attempts: 2,
            backoff_ms: 5,
        },
    }
}

pub fn test_engine(store: MemoryStore) -> Engine {
    test_engine_with_config(store, test_engine_config())
}

pub fn test_engine_with_config(store: MemoryStore, config: EngineConfig) -> Engine {
    Engine::new(
        config,
        Arc::new(store),
        Arc::new(AdapterRegistry::with_builtins()),
    )
    .expect("test engine configuration is valid")
}

fn adapter_config(value: Value) -> AdapterConfig {
    serde_json::from_value(value).expect("adapter config literal is a JSON object")
}

/// A memory-to-memory pipeline definition with the given adapter settings.
pub fn memory_pipeline(
    name: &str,
    source: Value,
    destination: Value,
    error_policy: ErrorPolicy,
) -> PipelineDefinition {
    PipelineDefinition {
        name: name.to_owned(),
        description: None,
        source_type: "memory".to_owned(),
        source_config: adapter_config(source),
        destination_type: "memory".to_owned(),
        destination_config: adapter_config(destination),
        transformation: None,
        schedule: None,
        error_policy,
    }
}

/// Polls the store until the job reaches a terminal state or the deadline passes.
pub async fn wait_for_terminal(store: &dyn JobStore, job_id: JobId, deadline: Duration) -> Job {
    let started = tokio::time::Instant::now();

    loop {
        let job = store.get_job(job_id).await.expect("job exists");
        if job.status.is_terminal() {
            return job;
        }
        if started.elapsed() > deadline {
            panic!("job {job_id} still `{}` after {deadline:?}", job.status);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Polls the store until the predicate holds for the job or the deadline passes.
pub async fn wait_for_job<F>(
    store: &dyn JobStore,
    job_id: JobId,
    deadline: Duration,
    mut predicate: F,
) -> Job
where
    F: FnMut(&Job) -> bool,
{
    let started = tokio::time::Instant::now();

    loop {
        let job = store.get_job(job_id).await.expect("job exists");
        if predicate(&job) {
            return job;
        }
        if started.elapsed() > deadline {
            panic!("job {job_id} did not reach the expected state after {deadline:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
