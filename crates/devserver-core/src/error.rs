//! Error types for devserver.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a pipeline run.
///
/// Errors are data: the pipeline writes each one into the run log and the
/// coordinator forwards it unchanged to the caller the run resolves.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PipelineError {
    #[error("failed to spawn {command}: {message}")]
    Spawn { command: String, message: String },

    #[error("{command}: expected return code of 0, got {code}")]
    NonZeroExit { command: String, code: i32 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unable to make shell file executable: {0}")]
    Permission(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("no project configured for git name '{0}'")]
    UnknownProject(String),

    #[error("run aborted: {0}")]
    Aborted(String),
}

/// Failure of a single process invocation.
///
/// A non-zero exit code is not a `RunnerError`; callers interpret exit codes.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    /// Convert into the pipeline taxonomy, naming the command that failed.
    pub fn into_pipeline_error(self, command: &str) -> PipelineError {
        match self {
            RunnerError::Spawn { source, .. } | RunnerError::Io { source, .. } => {
                PipelineError::Spawn {
                    command: command.to_string(),
                    message: source.to_string(),
                }
            }
        }
    }
}
