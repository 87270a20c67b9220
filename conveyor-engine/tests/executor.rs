mod common;

use std::time::Duration;

use conveyor_engine::store::{JobStore, MemoryStore};
use conveyor_engine::types::{ErrorPolicy, JobStatus};
use conveyor_telemetry::tracing::init_test_tracing;
use serde_json::json;

use crate::common::{
    memory_pipeline, test_engine, test_engine_config, test_engine_with_config, wait_for_job,
    wait_for_terminal,
};

const DEADLINE: Duration = Duration::from_secs(10);

#[tokio::test(flavor = "multi_thread")]
async fn skip_policy_counts_failures_and_completes() {
    init_test_tracing();

    let store = MemoryStore::new();
    let mut engine = test_engine(store.clone());

    let pipeline = engine
        .create_pipeline(memory_pipeline(
            "orders",
            json!({"record_count": 150}),
            json!({"fail_ids": ["record-10", "record-97"]}),
            ErrorPolicy::Skip,
        ))
        .await
        .unwrap();

    engine.start().unwrap();
    let job_id = engine.execute_pipeline(pipeline.id).await.unwrap();

    let job = wait_for_terminal(&store, job_id, DEADLINE).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.source_record_count, 150);
    assert_eq!(job.destination_record_count, 148);
    assert_eq!(job.error_count, 2);
    assert_eq!(job.errors.len(), 2);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());

    engine.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn fail_policy_aborts_on_first_record_error() {
    init_test_tracing();

    let store = MemoryStore::new();
    let mut engine = test_engine(store.clone());

    let pipeline = engine
        .create_pipeline(memory_pipeline(
            "strict",
            json!({"record_count": 150}),
            json!({"fail_ids": ["record-0"]}),
            ErrorPolicy::Fail,
        ))
        .await
        .unwrap();

    engine.start().unwrap();
    let job_id = engine.execute_pipeline(pipeline.id).await.unwrap();

    let job = wait_for_terminal(&store, job_id, DEADLINE).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_count, 1);
    assert_eq!(job.errors.len(), 1);
    // The failing record was the first one; nothing made it to the destination.
    assert_eq!(job.destination_record_count, 0);
    assert_eq!(job.source_record_count, 1);

    engine.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn retry_policy_recovers_transient_record_failures() {
    init_test_tracing();

    let store = MemoryStore::new();
    let mut engine = test_engine(store.clone());

    let pipeline = engine
        .create_pipeline(memory_pipeline(
            "flaky destination",
            json!({"record_count": 20}),
            json!({"flaky_ids": ["record-3", "record-11"]}),
            ErrorPolicy::Retry,
        ))
        .await
        .unwrap();

    engine.start().unwrap();
    let job_id = engine.execute_pipeline(pipeline.id).await.unwrap();

    let job = wait_for_terminal(&store, job_id, DEADLINE).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.source_record_count, 20);
    assert_eq!(job.destination_record_count, 20);
    assert_eq!(job.error_count, 0);

    engine.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_failure_fails_the_job_without_processing_records() {
    init_test_tracing();

    let store = MemoryStore::new();
    let mut engine = test_engine(store.clone());

    let pipeline = engine
        .create_pipeline(memory_pipeline(
            "unreachable",
            json!({"record_count": 10, "fail_connection": true}),
            json!({"sink": "default"}),
            ErrorPolicy::Retry,
        ))
        .await
        .unwrap();

    engine.start().unwrap();
    let job_id = engine.execute_pipeline(pipeline.id).await.unwrap();

    let job = wait_for_terminal(&store, job_id, DEADLINE).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.source_record_count, 0);
    assert_eq!(job.destination_record_count, 0);
    assert!(!job.errors.is_empty());
    assert!(
        job.logs
            .iter()
            .any(|entry| entry.message == "Initializing source adapter")
    );

    engine.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stuck_job_is_failed_with_a_timeout_error() {
    init_test_tracing();

    let store = MemoryStore::new();
    let mut config = test_engine_config();
    config.job_timeout_secs = 1;
    let mut engine = test_engine_with_config(store.clone(), config);

    // 50ms per record for 100 records is well past the 1s timeout.
    let pipeline = engine
        .create_pipeline(memory_pipeline(
            "molasses",
            json!({"record_count": 100, "delay_ms": 50}),
            json!({"sink": "default"}),
            ErrorPolicy::Retry,
        ))
        .await
        .unwrap();

    engine.start().unwrap();
    let job_id = engine.execute_pipeline(pipeline.id).await.unwrap();

    let job = wait_for_terminal(&store, job_id, DEADLINE).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.completed_at.is_some());
    assert!(
        job.errors
            .iter()
            .any(|error| error.message.contains("timeout")),
        "errors: {:?}",
        job.errors
    );

    engine.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelling_a_running_job_stops_it_and_freezes_counters() {
    init_test_tracing();

    let store = MemoryStore::new();
    let mut config = test_engine_config();
    config.batch_size = 5;
    let mut engine = test_engine_with_config(store.clone(), config);

    let pipeline = engine
        .create_pipeline(memory_pipeline(
            "long haul",
            json!({"record_count": 1000, "delay_ms": 10}),
            json!({"sink": "default"}),
            ErrorPolicy::Retry,
        ))
        .await
        .unwrap();

    engine.start().unwrap();
    let job_id = engine.execute_pipeline(pipeline.id).await.unwrap();

    // Wait until the job is running and has made some progress.
    wait_for_job(&store, job_id, DEADLINE, |job| {
        job.status == JobStatus::Running && job.source_record_count > 0
    })
    .await;

    let cancelled = engine.cancel_job(job_id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());
    assert!(
        cancelled
            .logs
            .iter()
            .any(|entry| entry.message == "Job cancelled by user")
    );

    // Counters must not move after cancellation, no matter what the worker
    // still had in flight.
    let frozen = store.get_job(job_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let later = store.get_job(job_id).await.unwrap();
    assert_eq!(later.source_record_count, frozen.source_record_count);
    assert_eq!(later.destination_record_count, frozen.destination_record_count);
    assert_eq!(later.error_count, frozen.error_count);
    assert_eq!(later.logs.len(), frozen.logs.len());

    engine.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn running_jobs_use_the_snapshot_taken_at_creation() {
    init_test_tracing();

    let store = MemoryStore::new();
    let mut engine = test_engine(store.clone());

    let pipeline = engine
        .create_pipeline(memory_pipeline(
            "point in time",
            json!({"record_count": 30, "delay_ms": 20}),
            json!({"sink": "default"}),
            ErrorPolicy::Retry,
        ))
        .await
        .unwrap();

    engine.start().unwrap();
    let job_id = engine.execute_pipeline(pipeline.id).await.unwrap();

    // Shrink the pipeline while the job is in flight.
    engine
        .update_pipeline(
            pipeline.id,
            memory_pipeline(
                "point in time",
                json!({"record_count": 1}),
                json!({"sink": "default"}),
                ErrorPolicy::Retry,
            ),
        )
        .await
        .unwrap();

    let job = wait_for_terminal(&store, job_id, DEADLINE).await;
    assert_eq!(job.status, JobStatus::Completed);
    // The job saw the 30-record config frozen at creation, not the update.
    assert_eq!(job.source_record_count, 30);

    engine.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn retried_job_runs_from_scratch() {
    init_test_tracing();

    let store = MemoryStore::new();
    let mut engine = test_engine(store.clone());

    // First run fails on connection; after fixing the pipeline, the retry
    // re-extracts everything.
    let pipeline = engine
        .create_pipeline(memory_pipeline(
            "fix and retry",
            json!({"record_count": 12, "fail_connection": true}),
            json!({"sink": "default"}),
            ErrorPolicy::Retry,
        ))
        .await
        .unwrap();

    engine.start().unwrap();
    let job_id = engine.execute_pipeline(pipeline.id).await.unwrap();
    let failed = wait_for_terminal(&store, job_id, DEADLINE).await;
    assert_eq!(failed.status, JobStatus::Failed);

    engine
        .update_pipeline(
            pipeline.id,
            memory_pipeline(
                "fix and retry",
                json!({"record_count": 12}),
                json!({"sink": "default"}),
                ErrorPolicy::Retry,
            ),
        )
        .await
        .unwrap();

    let retry_id = engine.retry_job(job_id).await.unwrap();
    let retried = wait_for_terminal(&store, retry_id, DEADLINE).await;
    assert_eq!(retried.status, JobStatus::Completed);
    assert_eq!(retried.source_record_count, 12);
    assert_eq!(retried.destination_record_count, 12);

    // The failed original is untouched.
    let original = store.get_job(job_id).await.unwrap();
    assert_eq!(original.status, JobStatus::Failed);

    engine.shutdown_and_wait().await.unwrap();
}
