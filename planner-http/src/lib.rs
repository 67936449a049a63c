//! Request bridge to the mission planner worker
//!
//! Issues calls against the worker's loopback HTTP API and turns every
//! non-success response into a classified, human-readable error.

pub mod client;
pub mod config;
pub mod errors;
pub mod normalize;
pub mod types;

// Re-export main types
pub use client::{HttpBridge, WorkerClient};
pub use config::BridgeSettings;
pub use errors::BridgeError;
pub use normalize::{ServiceFailure, ValidationIssue};
