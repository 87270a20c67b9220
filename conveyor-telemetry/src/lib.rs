//! Tracing initialization shared by the engine binaries and their tests.

pub mod tracing;
