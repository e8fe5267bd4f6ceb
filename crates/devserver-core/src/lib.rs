//! Core domain types and traits for devserver.
//!
//! This crate contains:
//! - Action kinds and the outcome types delivered to callers
//! - Project keys and report naming
//! - Ordered pipeline logs
//! - The process runner trait used by the pipeline
//! - The pipeline error taxonomy

pub mod action;
pub mod error;
pub mod executor;
pub mod log;
pub mod project;

pub use action::{ActionKind, ActionOutcome, ProjectResult};
pub use error::{PipelineError, RunnerError};
pub use executor::{ProcessRunner, ProcessSpec};
pub use log::{LogChunk, LogStream, PipelineLog};
pub use project::{ProjectKey, sanitize_report_name};
