use actix_web::{
    HttpResponse, Responder, ResponseError, get,
    http::{StatusCode, header::ContentType},
    post,
    web::{Data, Json, Path, Query},
};
use chrono::{DateTime, Utc};
use conveyor_engine::engine::Engine;
use conveyor_engine::error::EngineError;
use conveyor_engine::store::JobFilter;
use conveyor_engine::types::{Job, JobId, JobStatus, LogLevel, PipelineId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::{IntoParams, ToSchema};

use crate::routes::{ErrorMessage, engine_error_message, engine_status_code};

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl JobError {
    pub fn to_message(&self) -> String {
        match self {
            JobError::Engine(err) => engine_error_message(err),
        }
    }
}

impl ResponseError for JobError {
    fn status_code(&self) -> StatusCode {
        match self {
            JobError::Engine(err) => engine_status_code(err.kind()),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_message = ErrorMessage {
            error: self.to_message(),
        };
        let body =
            serde_json::to_string(&error_message).expect("failed to serialize error message");
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(body)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobLogResponse {
    #[schema(value_type = String)]
    pub timestamp: DateTime<Utc>,
    #[schema(value_type = String, example = "info")]
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobErrorResponse {
    #[schema(value_type = String)]
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadJobResponse {
    #[schema(value_type = String)]
    pub id: JobId,
    #[schema(value_type = String)]
    pub pipeline_id: PipelineId,
    pub pipeline_name: String,
    #[schema(value_type = String, example = "completed")]
    pub status: JobStatus,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = Option<String>)]
    pub started_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub source_record_count: u64,
    pub destination_record_count: u64,
    pub error_count: u64,
    pub logs: Vec<JobLogResponse>,
    pub errors: Vec<JobErrorResponse>,
}

impl From<Job> for ReadJobResponse {
    fn from(job: Job) -> Self {
        let duration_seconds = job.duration_seconds();
        Self {
            id: job.id,
            pipeline_id: job.pipeline_id,
            pipeline_name: job.snapshot.pipeline_name,
            status: job.status,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            duration_seconds,
            source_record_count: job.source_record_count,
            destination_record_count: job.destination_record_count,
            error_count: job.error_count,
            logs: job
                .logs
                .into_iter()
                .map(|entry| JobLogResponse {
                    timestamp: entry.timestamp,
                    level: entry.level,
                    message: entry.message,
                })
                .collect(),
            errors: job
                .errors
                .into_iter()
                .map(|error| JobErrorResponse {
                    timestamp: error.timestamp,
                    message: error.message,
                    details: error.details,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadJobsResponse {
    pub jobs: Vec<ReadJobResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GetJobStatusResponse {
    #[schema(value_type = String)]
    pub id: JobId,
    #[schema(value_type = String, example = "running")]
    pub status: JobStatus,
    pub source_record_count: u64,
    pub destination_record_count: u64,
    pub error_count: u64,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryJobResponse {
    #[schema(value_type = String)]
    pub job_id: JobId,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct JobsFilterQuery {
    /// Restrict the listing to one pipeline.
    #[param(value_type = Option<String>)]
    pub pipeline_id: Option<PipelineId>,
    /// Restrict the listing to one lifecycle state.
    #[param(value_type = Option<String>, example = "completed")]
    pub status: Option<JobStatus>,
}

#[utoipa::path(
    summary = "List jobs",
    description = "Returns jobs newest first, optionally filtered by pipeline and status.",
    params(JobsFilterQuery),
    responses(
        (status = 200, description = "Jobs retrieved successfully", body = ReadJobsResponse),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Jobs"
)]
#[get("/jobs")]
pub async fn read_all_jobs(
    engine: Data<Engine>,
    filter: Query<JobsFilterQuery>,
) -> Result<impl Responder, JobError> {
    let filter = filter.into_inner();
    let jobs = engine
        .list_jobs(&JobFilter {
            pipeline_id: filter.pipeline_id,
            status: filter.status,
        })
        .await?
        .into_iter()
        .map(ReadJobResponse::from)
        .collect();

    Ok(Json(ReadJobsResponse { jobs }))
}

#[utoipa::path(
    summary = "Retrieve a job",
    description = "Returns a job with its full log and error history.",
    params(
        ("job_id" = String, Path, description = "Unique ID of the job")
    ),
    responses(
        (status = 200, description = "Job retrieved successfully", body = ReadJobResponse),
        (status = 404, description = "Job not found", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Jobs"
)]
#[get("/jobs/{job_id}")]
pub async fn read_job(
    engine: Data<Engine>,
    job_id: Path<JobId>,
) -> Result<impl Responder, JobError> {
    let job = engine.get_job(job_id.into_inner()).await?;

    Ok(Json(ReadJobResponse::from(job)))
}

#[utoipa::path(
    summary = "Retrieve a job's status",
    description = "Returns a lightweight status view of a job, suitable for polling.",
    params(
        ("job_id" = String, Path, description = "Unique ID of the job")
    ),
    responses(
        (status = 200, description = "Job status retrieved successfully", body = GetJobStatusResponse),
        (status = 404, description = "Job not found", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Jobs"
)]
#[get("/jobs/{job_id}/status")]
pub async fn get_job_status(
    engine: Data<Engine>,
    job_id: Path<JobId>,
) -> Result<impl Responder, JobError> {
    let job = engine.get_job(job_id.into_inner()).await?;

    Ok(Json(GetJobStatusResponse {
        id: job.id,
        status: job.status,
        source_record_count: job.source_record_count,
        destination_record_count: job.destination_record_count,
        error_count: job.error_count,
        duration_seconds: job.duration_seconds(),
    }))
}

#[utoipa::path(
    summary = "Retry a failed job",
    description = "Creates a fresh pending job for the same pipeline. Only failed jobs can be retried; the original job is never mutated.",
    params(
        ("job_id" = String, Path, description = "Unique ID of the failed job")
    ),
    responses(
        (status = 200, description = "Retry job created successfully", body = RetryJobResponse),
        (status = 400, description = "Job is not failed", body = ErrorMessage),
        (status = 404, description = "Job not found", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Jobs"
)]
#[post("/jobs/{job_id}/retry")]
pub async fn retry_job(
    engine: Data<Engine>,
    job_id: Path<JobId>,
) -> Result<impl Responder, JobError> {
    let job_id = engine.retry_job(job_id.into_inner()).await?;

    Ok(Json(RetryJobResponse { job_id }))
}

#[utoipa::path(
    summary = "Cancel a job",
    description = "Cancels a pending or running job. Running jobs stop cooperatively at the next batch boundary.",
    params(
        ("job_id" = String, Path, description = "Unique ID of the job")
    ),
    responses(
        (status = 200, description = "Job cancelled successfully", body = ReadJobResponse),
        (status = 400, description = "Job is already terminal", body = ErrorMessage),
        (status = 404, description = "Job not found", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Jobs"
)]
#[post("/jobs/{job_id}/cancel")]
pub async fn cancel_job(
    engine: Data<Engine>,
    job_id: Path<JobId>,
) -> Result<impl Responder, JobError> {
    let job = engine.cancel_job(job_id.into_inner()).await?;

    Ok(Json(ReadJobResponse::from(job)))
}
