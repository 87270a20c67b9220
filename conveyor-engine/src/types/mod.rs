//! Core data model shared across the engine.

mod job;
mod pipeline;
mod record;

pub use job::*;
pub use pipeline::*;
pub use record::*;
