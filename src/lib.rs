//! Topic Fetcher Library
//!
//! A Rust library for managing offline downloads of topic content bundles
//! on resource-constrained clients under an intermittent network. Provides
//! bounded-concurrency scheduling with priority ordering, pause/resume/
//! cancel semantics, durable state across process restarts, and fan-out
//! progress notification.

pub mod app;
pub mod cli;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
