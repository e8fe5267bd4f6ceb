//! Git pipeline for a single project descriptor.
//!
//! fetch → diff-check → checkout/merge → build script or test fixture.
//! Every command is echoed into the run log before it starts and every
//! failure is written into the log before it is returned.

use devserver_config::{BuildSpec, ProjectDescriptor, TemplateContext};
use devserver_core::executor::{ProcessRunner, ProcessSpec};
use devserver_core::log::{LogStream, PipelineLog};
use devserver_core::{ActionKind, PipelineError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of one pipeline execution.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub ok: bool,
    /// `"<BUILD|TEST> COMPLETE:<epoch millis>"` on success.
    pub status: Option<String>,
    pub error: Option<PipelineError>,
    pub log: PipelineLog,
}

/// Runs the git pipeline through a [`ProcessRunner`].
pub struct Pipeline {
    runner: Arc<dyn ProcessRunner>,
    scripts_dir: PathBuf,
    /// Environment every build script and fixture starts from.
    base_env: HashMap<String, String>,
}

impl Pipeline {
    /// Create a pipeline whose scripts inherit this process's environment.
    pub fn new(runner: Arc<dyn ProcessRunner>, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            scripts_dir: scripts_dir.into(),
            base_env: process_env(),
        }
    }

    /// Replace the inherited environment.
    pub fn with_base_env(mut self, env: HashMap<String, String>) -> Self {
        self.base_env = env;
        self
    }

    /// Execute the pipeline for `project` against its checkout at `repo_path`.
    ///
    /// Never fails: errors are reported through the returned run.
    pub async fn execute(
        &self,
        project: &ProjectDescriptor,
        repo_path: &Path,
        kind: ActionKind,
    ) -> PipelineRun {
        info!(git_name = %project.git_name, branch = %project.branch, %kind, "Pipeline starting");

        let mut log = PipelineLog::new();
        let result = match kind {
            ActionKind::Build => self.build(project, repo_path, &mut log).await,
            ActionKind::Test => self.test(project, repo_path, &mut log).await,
        };

        match result {
            Ok(()) => {
                let status = format!(
                    "{} COMPLETE:{}",
                    kind.label(),
                    chrono::Utc::now().timestamp_millis()
                );
                info!(git_name = %project.git_name, branch = %project.branch, %kind, %status, "Pipeline succeeded");
                PipelineRun {
                    ok: true,
                    status: Some(status),
                    error: None,
                    log,
                }
            }
            Err(e) => {
                error!(git_name = %project.git_name, branch = %project.branch, %kind, error = %e, "Pipeline failed");
                log.write_line(format!("{} FAILED: {}", kind.label(), e));
                PipelineRun {
                    ok: false,
                    status: None,
                    error: Some(e),
                    log,
                }
            }
        }
    }

    async fn build(
        &self,
        project: &ProjectDescriptor,
        repo_path: &Path,
        log: &mut PipelineLog,
    ) -> Result<(), PipelineError> {
        self.fetch(repo_path, log).await?;

        if !self.remote_differs(repo_path, &project.branch, log).await? {
            log.write_line("No Differences.");
            return Ok(());
        }
        log.write_line("Differences on Git Remote.");

        self.checkout_and_merge(repo_path, &project.branch, log).await?;

        match &project.build {
            Some(build) => self.run_build_script(build, repo_path, log).await,
            None => Ok(()),
        }
    }

    async fn test(
        &self,
        project: &ProjectDescriptor,
        repo_path: &Path,
        log: &mut PipelineLog,
    ) -> Result<(), PipelineError> {
        self.fetch(repo_path, log).await?;
        self.checkout_and_merge(repo_path, &project.branch, log).await?;

        let Some(fixture) = &project.test_fixture else {
            return Ok(());
        };

        let ctx = TemplateContext::for_repo(repo_path);
        let env = self.script_env(project.build.as_ref(), &ctx, repo_path);
        let program = absolute(&repo_path.join(fixture));
        self.run_script(&program, repo_path, env, log).await
    }

    async fn fetch(&self, repo_path: &Path, log: &mut PipelineLog) -> Result<(), PipelineError> {
        let spec = ProcessSpec::new("git", repo_path).args(["fetch", "--all"]);
        self.run_checked(&spec, log).await
    }

    /// Compare the branch head with its upstream.
    ///
    /// `git rev-parse --branch <branch> @{u}` prints three lines; the second
    /// and third are the remote and local hashes. Stdout is captured rather
    /// than logged.
    async fn remote_differs(
        &self,
        repo_path: &Path,
        branch: &str,
        log: &mut PipelineLog,
    ) -> Result<bool, PipelineError> {
        let spec = ProcessSpec::new("git", repo_path).args(["rev-parse", "--branch", branch, "@{u}"]);
        log.write_line(spec.banner());

        let mut capture = PipelineLog::new();
        let code = self
            .runner
            .run(&spec, &mut capture)
            .await
            .map_err(|e| e.into_pipeline_error(&spec.command_line()))?;

        let mut stdout = Vec::new();
        for chunk in capture.chunks() {
            match chunk.stream {
                LogStream::Stdout => stdout.extend_from_slice(&chunk.data),
                LogStream::Stderr => log.push(chunk.clone()),
            }
        }

        if code != 0 {
            return Err(PipelineError::NonZeroExit {
                command: spec.command_line(),
                code,
            });
        }

        let text = String::from_utf8_lossy(&stdout);
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        if lines.len() < 3 {
            return Err(PipelineError::Parse(format!(
                "unexpected git rev-parse output: {:?}",
                text
            )));
        }

        let (latest, current) = (lines[1], lines[2]);
        info!(branch, latest, current, "Compared with upstream");
        Ok(latest != current)
    }

    async fn checkout_and_merge(
        &self,
        repo_path: &Path,
        branch: &str,
        log: &mut PipelineLog,
    ) -> Result<(), PipelineError> {
        let checkout = ProcessSpec::new("git", repo_path).args(["checkout", branch]);
        self.run_checked(&checkout, log).await?;

        let merge = ProcessSpec::new("git", repo_path).arg("merge");
        self.run_checked(&merge, log).await
    }

    /// Invoke `<scripts_dir>/<build_type>.sh`, once per sub-build if any.
    ///
    /// Every sub-build is attempted; the last failure is reported.
    async fn run_build_script(
        &self,
        build: &BuildSpec,
        repo_path: &Path,
        log: &mut PipelineLog,
    ) -> Result<(), PipelineError> {
        let ctx = TemplateContext::for_repo(repo_path);
        let base_env = self.script_env(Some(build), &ctx, repo_path);
        let script = absolute(&self.scripts_dir.join(build.script_name()));

        let Some(sub_builds) = build.sub_builds.as_ref().filter(|s| !s.is_empty()) else {
            return self.run_script(&script, &self.scripts_dir, base_env, log).await;
        };

        let mut last_failure = None;
        for (index, sub_build) in sub_builds.iter().enumerate() {
            let mut env = base_env.clone();
            for (key, value) in &sub_build.env {
                env.insert(key.clone(), value.render(&ctx));
            }

            if let Err(e) = self.run_script(&script, &self.scripts_dir, env, log).await {
                warn!(build_type = %build.build_type, index, error = %e, "Sub-build failed");
                last_failure = Some(e);
            }
        }

        match last_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Process environment, then the rendered build variables, then `repo_path`.
    fn script_env(
        &self,
        build: Option<&BuildSpec>,
        ctx: &TemplateContext,
        repo_path: &Path,
    ) -> HashMap<String, String> {
        let mut env = self.base_env.clone();
        if let Some(build) = build {
            for (key, value) in &build.env {
                env.insert(key.clone(), value.render(ctx));
            }
        }
        env.insert("repo_path".to_string(), repo_path.to_string_lossy().into_owned());
        env
    }

    async fn run_script(
        &self,
        program: &Path,
        cwd: &Path,
        env: HashMap<String, String>,
        log: &mut PipelineLog,
    ) -> Result<(), PipelineError> {
        ensure_executable(program).await?;
        let spec = ProcessSpec::new(program.to_string_lossy(), cwd).env(env);
        self.run_checked(&spec, log).await
    }

    /// Echo, run, and require exit code 0.
    async fn run_checked(&self, spec: &ProcessSpec, log: &mut PipelineLog) -> Result<(), PipelineError> {
        log.write_line(spec.banner());
        let code = self
            .runner
            .run(spec, log)
            .await
            .map_err(|e| e.into_pipeline_error(&spec.command_line()))?;

        if code != 0 {
            return Err(PipelineError::NonZeroExit {
                command: spec.command_line(),
                code,
            });
        }
        Ok(())
    }
}

/// This process's environment, skipping variables that are not valid UTF-8.
fn process_env() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                warn!(key = ?key, "Skipping environment variable that is not valid UTF-8");
                None
            }
        })
        .collect()
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Make sure this process can read and execute `path`.
///
/// A script the process cannot run is made `0755` when its owner may write
/// it; otherwise nothing is spawned.
#[cfg(unix)]
pub async fn ensure_executable(path: &Path) -> Result<(), PipelineError> {
    use nix::unistd::{AccessFlags, access};
    use std::os::unix::fs::PermissionsExt;

    let denied = |reason: String| PipelineError::Permission(format!("{}: {}", path.display(), reason));

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| denied(e.to_string()))?;

    if access(path, AccessFlags::R_OK | AccessFlags::X_OK).is_ok() {
        return Ok(());
    }
    let mode = metadata.permissions().mode();
    if mode & 0o200 == 0 {
        return Err(denied(format!("mode {:o} is neither executable nor writable", mode & 0o777)));
    }

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| denied(e.to_string()))?;
    access(path, AccessFlags::R_OK | AccessFlags::X_OK).map_err(|e| denied(e.to_string()))?;
    info!(path = %path.display(), "Made script executable");
    Ok(())
}

#[cfg(not(unix))]
pub async fn ensure_executable(path: &Path) -> Result<(), PipelineError> {
    tokio::fs::metadata(path)
        .await
        .map(|_| ())
        .map_err(|e| PipelineError::Permission(format!("{}: {}", path.display(), e)))
}
