use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::error::EngineResult;
use crate::types::Record;

/// Lazy, finite sequence of records produced by a source adapter.
///
/// Restartable only from the beginning; no cursor survives across job attempts.
pub type RecordStream = Pin<Box<dyn Stream<Item = EngineResult<Record>> + Send>>;

/// A per-record load failure.
///
/// Structurally separate from [`crate::error::EngineError`] because record
/// failures do not abort the batch by themselves; the pipeline's error policy
/// decides whether they are retried, counted, or escalated to job failure.
#[derive(Debug, Clone, Error)]
#[error("record `{record_id}` failed to load: {message}")]
pub struct RecordLoadError {
    pub record_id: String,
    pub message: String,
}

impl RecordLoadError {
    pub fn new(record_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            message: message.into(),
        }
    }
}

/// A connection-scoped adapter that extracts records from an external system.
#[async_trait]
pub trait SourceAdapter: Send {
    /// Performs a non-destructive round trip to the source system.
    ///
    /// Used both for interactive connection checks and as the first step of
    /// every job execution.
    async fn test_connection(&mut self) -> EngineResult<()>;

    /// Starts extraction and returns the record stream.
    async fn extract(&mut self) -> EngineResult<RecordStream>;

    /// Releases any underlying connection.
    ///
    /// Called on every exit path of a job, including cancellation and timeout.
    async fn close(&mut self) -> EngineResult<()>;
}

/// A connection-scoped adapter that loads records into an external system.
#[async_trait]
pub trait DestinationAdapter: Send {
    /// Performs a non-destructive round trip to the destination system.
    async fn test_connection(&mut self) -> EngineResult<()>;

    /// Writes one record.
    ///
    /// Failures are per-record and reported as [`RecordLoadError`]; they never
    /// tear down the adapter itself.
    async fn load(&mut self, record: &Record) -> Result<(), RecordLoadError>;

    /// Releases any underlying connection.
    async fn close(&mut self) -> EngineResult<()>;
}
