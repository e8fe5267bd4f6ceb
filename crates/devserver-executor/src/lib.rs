//! Process execution backends for devserver.
//!
//! Provides [`ProcessRunner`] implementations:
//! - Local processes via `tokio::process`

pub mod local;

pub use devserver_core::executor::{ProcessRunner, ProcessSpec};
pub use devserver_core::log::{LogChunk, LogStream, PipelineLog};
pub use local::LocalProcessRunner;
