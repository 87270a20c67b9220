//! Concurrency primitives for coordinating the scheduler and executor workers.

pub mod shutdown;
