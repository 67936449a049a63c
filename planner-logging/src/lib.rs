//! Logging infrastructure for the mission planner
//!
//! Two concerns live here: installing the global `tracing` subscriber, and
//! forwarding the worker's stdout/stderr lines into the application log.

pub mod init;
pub mod worker_output;

pub use init::{init_logging_from_config, init_simple_tracing};
pub use worker_output::{MemorySink, NullSink, OutputSink, OutputStream, TracingSink};

/// Tracing target used for lines captured from the worker process
pub const WORKER_TARGET: &str = "worker";
