//! Pluggable source and destination adapters.
//!
//! Every adapter kind is registered in the [`registry::AdapterRegistry`] with a
//! factory that validates the configuration blob and produces a connection-scoped
//! adapter instance. Adapter instances are ephemeral: one per job execution or
//! per interactive connection test, never persisted.

pub mod base;
pub mod http;
pub mod memory;
pub mod registry;

pub use base::{DestinationAdapter, RecordLoadError, RecordStream, SourceAdapter};
pub use registry::{AdapterKindInfo, AdapterRegistry};
