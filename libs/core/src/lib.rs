//! Shared plumbing for the vdbench workspace.
//!
//! - [`telemetry`] - tracing subscriber initialization
//! - [`build_info`] - git hash and build timestamp captured by `build.rs`

pub mod build_info;
pub mod telemetry;
