//! Action coordination for devserver.
//!
//! This crate handles:
//! - The git pipeline run for one project descriptor
//! - Per-clone action queues that serialize runs and answer callers in order
//! - Persisting run logs as reports
//! - Periodic full passes over every configured project

pub mod coordinator;
pub mod pipeline;
pub mod poller;
pub mod reports;

pub use coordinator::{ActionQueue, ActionRequest, Coordinator, CoordinatorError, FullPassEntry};
pub use pipeline::{Pipeline, PipelineRun};
pub use poller::{Poller, jittered_delay};
pub use reports::{FileReportSink, ReportSink};
