//! Execution engine for data migration pipelines.
//!
//! A pipeline pairs a source adapter with a destination adapter and an optional
//! transformation chain. Each execution of a pipeline is a job with a strict
//! lifecycle, run by a pool of executor workers that claim pending jobs from a
//! shared store. A scheduler turns cron expressions into queued jobs.

pub mod adapters;
pub mod concurrency;
pub mod engine;
pub mod error;
#[macro_use]
mod macros;
pub mod schedule;
pub mod store;
pub mod transform;
pub mod types;
pub mod workers;
