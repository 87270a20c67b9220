//! Authoritative state for pipelines and jobs.
//!
//! All coordination between the scheduler, the executor workers, and the API
//! goes through a [`base::JobStore`]; workers never share in-memory job objects.

pub mod base;
pub mod memory;

pub use base::{JobFilter, JobStore};
pub use memory::MemoryStore;
