use actix_web::http::StatusCode;
use conveyor_engine::error::{EngineError, ErrorKind};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod health_check;
pub mod jobs;
pub mod pipelines;

/// Error response body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorMessage {
    pub error: String,
}

/// Maps an engine error kind onto an HTTP status code.
pub(crate) fn engine_status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ConfigError
        | ErrorKind::InvalidCronExpression
        | ErrorKind::InvalidTransition
        | ErrorKind::DeserializationError => StatusCode::BAD_REQUEST,
        ErrorKind::PipelineNotFound | ErrorKind::JobNotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Renders an engine error for a response body.
///
/// Uses the description and detail rather than the full `Display` rendering,
/// which carries callsite locations meant for logs.
pub(crate) fn engine_error_message(err: &EngineError) -> String {
    // Internal errors are not exposed to clients.
    if engine_status_code(err.kind()) == StatusCode::INTERNAL_SERVER_ERROR {
        return "internal server error".to_owned();
    }

    match err.detail() {
        Some(detail) => format!("{}: {detail}", err.description()),
        None => err.description().to_owned(),
    }
}
