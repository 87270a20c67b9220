mod engine;

pub use engine::*;

use thiserror::Error;

/// Errors produced when validating shared configuration values.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The executor must run at least one worker.
    #[error("the number of executor workers must be greater than zero")]
    WorkersZero,

    /// A zero batch size would stall progress flushing and cancellation checks.
    #[error("the record batch size must be greater than zero")]
    BatchSizeZero,

    /// A job timeout of zero would fail every job immediately.
    #[error("the job timeout must be greater than zero seconds")]
    JobTimeoutZero,

    /// The scheduler tick interval must be non-zero.
    #[error("the scheduler tick interval must be greater than zero seconds")]
    TickIntervalZero,
}
