//! Executor worker pool and per-job execution.

pub mod pool;
pub mod runner;

pub use pool::ExecutorPool;
pub use runner::JobRunner;
