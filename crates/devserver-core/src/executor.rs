//! Process runner trait and invocation spec.
//!
//! Runners launch one external command and stream its output into a
//! [`PipelineLog`] as it arrives.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::{PipelineLog, RunnerError};

/// Specification for a command to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Executable to launch.
    pub program: String,
    /// Arguments, not including the program.
    pub args: Vec<String>,
    /// Working directory of the child.
    pub working_dir: PathBuf,
    /// Complete environment of the child. `None` inherits the process
    /// environment unchanged.
    pub env: Option<HashMap<String, String>>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// `program arg1 arg2`, for error messages.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Banner written into the run log before the command starts:
    /// `<cwd>> <program> <args as JSON>`.
    pub fn banner(&self) -> String {
        let cwd = std::path::absolute(&self.working_dir).unwrap_or_else(|_| self.working_dir.clone());
        let args = serde_json::to_string(&self.args).unwrap_or_else(|_| "[]".to_string());
        format!("{}> {} {}\n", cwd.display(), self.program, args)
    }
}

/// Trait for launching external processes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a command to completion.
    ///
    /// Every stdout/stderr read is pushed onto `log` in arrival order before
    /// this returns. Resolves with the exit code (`-1` when the child was
    /// killed by a signal); a non-zero code is not an error here. There is no
    /// timeout: a child that never exits blocks the caller.
    async fn run(&self, spec: &ProcessSpec, log: &mut PipelineLog) -> Result<i32, RunnerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let spec = ProcessSpec::new("git", "/tmp").args(["fetch", "--all"]);
        assert_eq!(spec.command_line(), "git fetch --all");
    }

    #[test]
    fn test_banner_format() {
        let spec = ProcessSpec::new("git", "/var/repos/demo").args(["checkout", "main"]);
        assert_eq!(
            spec.banner(),
            "/var/repos/demo> git [\"checkout\",\"main\"]\n"
        );
    }

    #[test]
    fn test_env_defaults_to_inherit() {
        let spec = ProcessSpec::new("true", ".");
        assert!(spec.env.is_none());
        let spec = spec.env(HashMap::from([("A".to_string(), "1".to_string())]));
        assert_eq!(spec.env.unwrap().get("A").map(String::as_str), Some("1"));
    }
}
