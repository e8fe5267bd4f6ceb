//! Action kinds and the outcomes delivered to callers.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::PipelineError;

/// What a caller asks the coordinator to do for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Build,
    Test,
}

impl ActionKind {
    /// Upper-case label used in status strings and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Build => "BUILD",
            ActionKind::Test => "TEST",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Build => write!(f, "build"),
            ActionKind::Test => write!(f, "test"),
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "build" => Ok(ActionKind::Build),
            "test" => Ok(ActionKind::Test),
            _ => Err(format!("Unknown action kind: {}", s)),
        }
    }
}

/// Result of one project descriptor within a physical run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectResult {
    pub git_name: String,
    pub branch: String,
    pub ok: bool,
    /// `"<BUILD|TEST> COMPLETE:<epoch millis>"` on success.
    pub status: Option<String>,
    pub error: Option<PipelineError>,
    /// Where the run log was persisted, if it was.
    pub report_path: Option<PathBuf>,
    /// Persistence failure; never turns a successful run into a failure.
    pub report_error: Option<String>,
}

/// What a queued request is resolved with.
///
/// `kind_executed` may differ from the kind the caller asked for: the kind of
/// a physical run is taken from the newest queued request when the run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub kind_executed: ActionKind,
    pub error: Option<PipelineError>,
    pub results: Vec<ProjectResult>,
}

impl ActionOutcome {
    /// Build an outcome from per-project results. The outcome error is the
    /// error of the first failed project.
    pub fn from_results(kind_executed: ActionKind, results: Vec<ProjectResult>) -> Self {
        let error = results.iter().find_map(|r| r.error.clone());
        Self {
            kind_executed,
            error,
            results,
        }
    }

    /// Outcome for a request that could not run at all.
    pub fn failed(kind_executed: ActionKind, error: PipelineError) -> Self {
        Self {
            kind_executed,
            error: Some(error),
            results: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.results.iter().all(|r| r.ok)
    }
}
