use actix_web::{
    HttpResponse, Responder, ResponseError, delete, get,
    http::{StatusCode, header::ContentType},
    post, put,
    web::{Data, Json, Path},
};
use chrono::{DateTime, Utc};
use conveyor_engine::engine::{Engine, PipelineDefinition};
use conveyor_engine::error::EngineError;
use conveyor_engine::store::JobFilter;
use conveyor_engine::types::{
    AdapterConfig, ErrorPolicy, Pipeline, PipelineId, PipelineStatus, TransformationConfig,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::routes::jobs::{ReadJobResponse, ReadJobsResponse};
use crate::routes::{ErrorMessage, engine_error_message, engine_status_code};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl PipelineError {
    pub fn to_message(&self) -> String {
        match self {
            PipelineError::Engine(err) => engine_error_message(err),
        }
    }
}

impl ResponseError for PipelineError {
    fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Engine(err) => engine_status_code(err.kind()),
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
pub struct CreatePipelineRequest {
    #[schema(example = "ALM to Jira sync", required = true)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[schema(example = "alm", required = true)]
    pub source_type: String,
    #[schema(value_type = Object, required = true)]
    pub source_config: AdapterConfig,
    #[schema(example = "jira", required = true)]
    pub destination_type: String,
    #[schema(value_type = Object, required = true)]
    pub destination_config: AdapterConfig,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub transformation: Option<TransformationConfig>,
    /// 5-field cron expression; omit for manual-only execution.
    #[serde(default)]
    #[schema(example = "0 3 * * *")]
    pub schedule: Option<String>,
    #[serde(default)]
    #[schema(value_type = String, example = "retry")]
    pub error_policy: ErrorPolicy,
}

impl From<CreatePipelineRequest> for PipelineDefinition {
    fn from(request: CreatePipelineRequest) -> Self {
        Self {
            name: request.name,
            description: request.description,
            source_type: request.source_type,
            source_config: request.source_config,
            destination_type: request.destination_type,
            destination_config: request.destination_config,
            transformation: request.transformation,
            schedule: request.schedule,
            error_policy: request.error_policy,
        }
    }
}

/// Updates carry the full definition; partial updates are not supported.
pub type UpdatePipelineRequest = CreatePipelineRequest;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadPipelineResponse {
    #[schema(value_type = String)]
    pub id: PipelineId,
    pub name: String,
    pub description: Option<String>,
    pub source_type: String,
    #[schema(value_type = Object)]
    pub source_config: AdapterConfig,
    pub destination_type: String,
    #[schema(value_type = Object)]
    pub destination_config: AdapterConfig,
    #[schema(value_type = Option<Object>)]
    pub transformation: Option<TransformationConfig>,
    pub schedule: Option<String>,
    #[schema(value_type = String, example = "active")]
    pub status: PipelineStatus,
    #[schema(value_type = String, example = "retry")]
    pub error_policy: ErrorPolicy,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
    pub job_count: u64,
    pub success_count: u64,
    #[schema(value_type = Option<String>)]
    pub last_run_at: Option<DateTime<Utc>>,
}

impl From<Pipeline> for ReadPipelineResponse {
    fn from(pipeline: Pipeline) -> Self {
        Self {
            id: pipeline.id,
            name: pipeline.name,
            description: pipeline.description,
            source_type: pipeline.source_type,
            source_config: pipeline.source_config,
            destination_type: pipeline.destination_type,
            destination_config: pipeline.destination_config,
            transformation: pipeline.transformation,
            schedule: pipeline.schedule,
            status: pipeline.status,
            error_policy: pipeline.error_policy,
            created_at: pipeline.created_at,
            updated_at: pipeline.updated_at,
            job_count: pipeline.job_count,
            success_count: pipeline.success_count,
            last_run_at: pipeline.last_run_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadPipelinesResponse {
    pub pipelines: Vec<ReadPipelineResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExecutePipelineResponse {
    #[schema(value_type = String)]
    pub job_id: uuid::Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TestConnectionRequest {
    #[serde(rename = "type")]
    #[schema(example = "jira", required = true)]
    pub adapter_type: String,
    #[schema(value_type = Object, required = true)]
    pub config: AdapterConfig,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TestConnectionResponse {
    #[schema(example = "success")]
    pub status: String,
    pub message: String,
}

impl TestConnectionResponse {
    fn from_result(result: Result<(), EngineError>) -> Self {
        match result {
            Ok(()) => Self {
                status: "success".to_owned(),
                message: "connection test passed".to_owned(),
            },
            // Connection failures are the expected outcome here, so the
            // message is reported verbatim instead of being masked as an
            // internal error.
            Err(err) => Self {
                status: "failed".to_owned(),
                message: match err.detail() {
                    Some(detail) => format!("{}: {detail}", err.description()),
                    None => err.description().to_owned(),
                },
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdapterTypeResponse {
    #[schema(example = "jira")]
    pub id: String,
    #[schema(example = "Jira")]
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadPipelineTypesResponse {
    pub source_types: Vec<AdapterTypeResponse>,
    pub destination_types: Vec<AdapterTypeResponse>,
}

#[utoipa::path(
    summary = "Create a pipeline",
    description = "Creates an active pipeline from the given definition.",
    request_body = CreatePipelineRequest,
    responses(
        (status = 200, description = "Pipeline created successfully", body = ReadPipelineResponse),
        (status = 400, description = "Bad request", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Pipelines"
)]
#[post("/pipelines")]
pub async fn create_pipeline(
    engine: Data<Engine>,
    pipeline: Json<CreatePipelineRequest>,
) -> Result<impl Responder, PipelineError> {
    let pipeline = engine.create_pipeline(pipeline.into_inner().into()).await?;

    Ok(Json(ReadPipelineResponse::from(pipeline)))
}

#[utoipa::path(
    summary = "Retrieve a pipeline",
    description = "Returns a pipeline identified by its ID.",
    params(
        ("pipeline_id" = String, Path, description = "Unique ID of the pipeline")
    ),
    responses(
        (status = 200, description = "Pipeline retrieved successfully", body = ReadPipelineResponse),
        (status = 404, description = "Pipeline not found", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Pipelines"
)]
#[get("/pipelines/{pipeline_id}")]
pub async fn read_pipeline(
    engine: Data<Engine>,
    pipeline_id: Path<PipelineId>,
) -> Result<impl Responder, PipelineError> {
    let pipeline = engine.get_pipeline(pipeline_id.into_inner()).await?;

    Ok(Json(ReadPipelineResponse::from(pipeline)))
}

#[utoipa::path(
    summary = "List pipelines",
    description = "Returns all pipelines.",
    responses(
        (status = 200, description = "Pipelines retrieved successfully", body = ReadPipelinesResponse),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Pipelines"
)]
#[get("/pipelines")]
pub async fn read_all_pipelines(engine: Data<Engine>) -> Result<impl Responder, PipelineError> {
    let pipelines = engine
        .list_pipelines()
        .await?
        .into_iter()
        .map(ReadPipelineResponse::from)
        .collect();

    Ok(Json(ReadPipelinesResponse { pipelines }))
}

#[utoipa::path(
    summary = "Update a pipeline",
    description = "Replaces the pipeline's definition. In-flight jobs keep the configuration frozen at their creation.",
    request_body = UpdatePipelineRequest,
    params(
        ("pipeline_id" = String, Path, description = "Unique ID of the pipeline")
    ),
    responses(
        (status = 200, description = "Pipeline updated successfully", body = ReadPipelineResponse),
        (status = 400, description = "Bad request", body = ErrorMessage),
        (status = 404, description = "Pipeline not found", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Pipelines"
)]
#[put("/pipelines/{pipeline_id}")]
pub async fn update_pipeline(
    engine: Data<Engine>,
    pipeline_id: Path<PipelineId>,
    pipeline: Json<UpdatePipelineRequest>,
) -> Result<impl Responder, PipelineError> {
    let pipeline = engine
        .update_pipeline(pipeline_id.into_inner(), pipeline.into_inner().into())
        .await?;

    Ok(Json(ReadPipelineResponse::from(pipeline)))
}

#[utoipa::path(
    summary = "Delete a pipeline",
    description = "Deletes a pipeline. Rejected while the pipeline has pending or running jobs.",
    params(
        ("pipeline_id" = String, Path, description = "Unique ID of the pipeline")
    ),
    responses(
        (status = 200, description = "Pipeline deleted successfully"),
        (status = 404, description = "Pipeline not found", body = ErrorMessage),
        (status = 409, description = "Pipeline has jobs in flight", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Pipelines"
)]
#[delete("/pipelines/{pipeline_id}")]
pub async fn delete_pipeline(
    engine: Data<Engine>,
    pipeline_id: Path<PipelineId>,
) -> Result<impl Responder, PipelineError> {
    engine.delete_pipeline(pipeline_id.into_inner()).await?;

    Ok(HttpResponse::Ok().finish())
}

#[utoipa::path(
    summary = "Execute a pipeline",
    description = "Enqueues a manual execution of an active pipeline and returns the new job's ID.",
    params(
        ("pipeline_id" = String, Path, description = "Unique ID of the pipeline")
    ),
    responses(
        (status = 200, description = "Job enqueued successfully", body = ExecutePipelineResponse),
        (status = 404, description = "Pipeline not found", body = ErrorMessage),
        (status = 409, description = "Pipeline is not active", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Pipelines"
)]
#[post("/pipelines/{pipeline_id}/execute")]
pub async fn execute_pipeline(
    engine: Data<Engine>,
    pipeline_id: Path<PipelineId>,
) -> Result<impl Responder, PipelineError> {
    let job_id = engine.execute_pipeline(pipeline_id.into_inner()).await?;

    Ok(Json(ExecutePipelineResponse { job_id }))
}

#[utoipa::path(
    summary = "Test a source connection",
    description = "Creates a source adapter from the given configuration and tests its connection. Nothing is persisted.",
    request_body = TestConnectionRequest,
    responses(
        (status = 200, description = "Test executed", body = TestConnectionResponse),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Pipelines"
)]
#[post("/pipelines/test-source-connection")]
pub async fn test_source_connection(
    engine: Data<Engine>,
    request: Json<TestConnectionRequest>,
) -> Result<impl Responder, PipelineError> {
    let request = request.into_inner();
    let result = engine
        .test_source_connection(&request.adapter_type, &request.config)
        .await;

    Ok(Json(TestConnectionResponse::from_result(result)))
}

#[utoipa::path(
    summary = "Test a destination connection",
    description = "Creates a destination adapter from the given configuration and tests its connection. Nothing is persisted.",
    request_body = TestConnectionRequest,
    responses(
        (status = 200, description = "Test executed", body = TestConnectionResponse),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Pipelines"
)]
#[post("/pipelines/test-destination-connection")]
pub async fn test_destination_connection(
    engine: Data<Engine>,
    request: Json<TestConnectionRequest>,
) -> Result<impl Responder, PipelineError> {
    let request = request.into_inner();
    let result = engine
        .test_destination_connection(&request.adapter_type, &request.config)
        .await;

    Ok(Json(TestConnectionResponse::from_result(result)))
}

#[utoipa::path(
    summary = "List adapter types",
    description = "Returns the registered source and destination adapter kinds.",
    responses(
        (status = 200, description = "Adapter types retrieved successfully", body = ReadPipelineTypesResponse),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Pipelines"
)]
#[get("/pipelines/types")]
pub async fn read_pipeline_types(engine: Data<Engine>) -> Result<impl Responder, PipelineError> {
    let to_response = |info: conveyor_engine::adapters::AdapterKindInfo| AdapterTypeResponse {
        id: info.id,
        name: info.name,
        description: info.description,
    };

    let response = ReadPipelineTypesResponse {
        source_types: engine
            .registry()
            .source_kinds()
            .into_iter()
            .map(to_response)
            .collect(),
        destination_types: engine
            .registry()
            .destination_kinds()
            .into_iter()
            .map(to_response)
            .collect(),
    };

    Ok(Json(response))
}

#[utoipa::path(
    summary = "List a pipeline's jobs",
    description = "Returns all jobs of a pipeline, newest first.",
    params(
        ("pipeline_id" = String, Path, description = "Unique ID of the pipeline")
    ),
    responses(
        (status = 200, description = "Jobs retrieved successfully", body = ReadJobsResponse),
        (status = 404, description = "Pipeline not found", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Pipelines"
)]
#[get("/pipelines/{pipeline_id}/jobs")]
pub async fn read_pipeline_jobs(
    engine: Data<Engine>,
    pipeline_id: Path<PipelineId>,
) -> Result<impl Responder, PipelineError> {
    let pipeline_id = pipeline_id.into_inner();

    // Listing with a filter alone would silently return an empty list for an
    // unknown pipeline.
    engine.get_pipeline(pipeline_id).await?;

    let jobs = engine
        .list_jobs(&JobFilter {
            pipeline_id: Some(pipeline_id),
            status: None,
        })
        .await?
        .into_iter()
        .map(ReadJobResponse::from)
        .collect();

    Ok(Json(ReadJobsResponse { jobs }))
}
