//! Per-clone action queues.
//!
//! Every git name has a FIFO of pending requests. The request that makes an
//! empty queue non-empty spawns a drain task; every other request only
//! enqueues. The drain task performs one physical run per queued request,
//! resolving requests oldest first, and exits once the queue is empty.
//! Empty queues are kept for the life of the coordinator.
//!
//! The kind of each run is taken from the newest request queued when the run
//! starts, so a caller may be answered with the result of a different kind
//! than it asked for. [`ActionOutcome::kind_executed`] says which ran.

use devserver_config::ConfigHandle;
use devserver_core::executor::ProcessRunner;
use devserver_core::{ActionKind, ActionOutcome, PipelineError, ProjectResult};
use futures::FutureExt;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::pipeline::Pipeline;
use crate::reports::ReportSink;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("request for '{0}' was dropped before it completed")]
    Dropped(String),
}

/// A caller waiting on a queue.
#[derive(Debug)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub responder: oneshot::Sender<ActionOutcome>,
}

/// Pending requests for one git name. Non-empty means a drain task owns it.
#[derive(Debug, Default)]
pub struct ActionQueue {
    pending: VecDeque<ActionRequest>,
}

impl ActionQueue {
    /// Enqueue, returning true when the queue was empty before.
    pub fn push(&mut self, request: ActionRequest) -> bool {
        let was_empty = self.pending.is_empty();
        self.pending.push_back(request);
        was_empty
    }

    /// Kind of the most recently queued request.
    pub fn newest_kind(&self) -> Option<ActionKind> {
        self.pending.back().map(|r| r.kind)
    }

    pub fn pop_oldest(&mut self) -> Option<ActionRequest> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// One request made by a full pass.
#[derive(Debug)]
pub struct FullPassEntry {
    pub git_name: String,
    pub requested: ActionKind,
    pub outcome: Result<ActionOutcome, CoordinatorError>,
}

/// Serializes pipeline runs per git name and answers callers in order.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConfigHandle,
    runner: Arc<dyn ProcessRunner>,
    reports: Arc<dyn ReportSink>,
    queues: Mutex<HashMap<String, ActionQueue>>,
    base_env: Option<HashMap<String, String>>,
}

impl Coordinator {
    pub fn new(
        config: ConfigHandle,
        runner: Arc<dyn ProcessRunner>,
        reports: Arc<dyn ReportSink>,
    ) -> Self {
        Self::build(config, runner, reports, None)
    }

    /// Like [`Coordinator::new`] but scripts start from `env` instead of this
    /// process's environment.
    pub fn with_base_env(
        config: ConfigHandle,
        runner: Arc<dyn ProcessRunner>,
        reports: Arc<dyn ReportSink>,
        env: HashMap<String, String>,
    ) -> Self {
        Self::build(config, runner, reports, Some(env))
    }

    fn build(
        config: ConfigHandle,
        runner: Arc<dyn ProcessRunner>,
        reports: Arc<dyn ReportSink>,
        base_env: Option<HashMap<String, String>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                runner,
                reports,
                queues: Mutex::new(HashMap::new()),
                base_env,
            }),
        }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.inner.config
    }

    /// Enqueue a request and return the receiver it will be resolved on.
    ///
    /// Enqueueing happens before this returns, so submission order is
    /// resolution order. Must be called within a tokio runtime.
    pub fn submit(&self, git_name: &str, kind: ActionKind) -> oneshot::Receiver<ActionOutcome> {
        let (responder, receiver) = oneshot::channel();

        let start_drain = {
            let mut queues = self.inner.lock_queues();
            let queue = queues.entry(git_name.to_string()).or_default();
            let was_empty = queue.push(ActionRequest { kind, responder });
            debug!(git_name, %kind, queued = queue.len(), "Request queued");
            was_empty
        };

        if start_drain {
            let inner = self.inner.clone();
            let git_name = git_name.to_string();
            tokio::spawn(async move { inner.drain(git_name).await });
        }

        receiver
    }

    /// Enqueue a request and wait for its outcome.
    pub async fn request(
        &self,
        git_name: &str,
        kind: ActionKind,
    ) -> Result<ActionOutcome, CoordinatorError> {
        self.submit(git_name, kind)
            .await
            .map_err(|_| CoordinatorError::Dropped(git_name.to_string()))
    }

    pub async fn request_build(&self, git_name: &str) -> Result<ActionOutcome, CoordinatorError> {
        self.request(git_name, ActionKind::Build).await
    }

    pub async fn request_test(&self, git_name: &str) -> Result<ActionOutcome, CoordinatorError> {
        self.request(git_name, ActionKind::Test).await
    }

    /// Build then test every configured clone; completes when all have been
    /// answered.
    pub async fn request_full_pass(&self) -> Vec<FullPassEntry> {
        let git_names = self.inner.config.current().git_names();
        info!(projects = git_names.len(), "Starting full pass");

        let mut pending = Vec::new();
        for git_name in git_names {
            for kind in [ActionKind::Build, ActionKind::Test] {
                let receiver = self.submit(&git_name, kind);
                pending.push((git_name.clone(), kind, receiver));
            }
        }

        let entries = futures::future::join_all(pending.into_iter().map(
            |(git_name, requested, receiver)| async move {
                let outcome = receiver
                    .await
                    .map_err(|_| CoordinatorError::Dropped(git_name.clone()));
                FullPassEntry {
                    git_name,
                    requested,
                    outcome,
                }
            },
        ))
        .await;

        let failed = entries
            .iter()
            .filter(|e| !matches!(&e.outcome, Ok(o) if o.is_success()))
            .count();
        info!(requests = entries.len(), failed, "Full pass complete");
        entries
    }

    /// Number of git names that have ever been requested.
    pub fn known_queues(&self) -> usize {
        self.inner.lock_queues().len()
    }

    /// Number of requests waiting or running for `git_name`.
    pub fn queued(&self, git_name: &str) -> usize {
        self.inner
            .lock_queues()
            .get(git_name)
            .map(ActionQueue::len)
            .unwrap_or(0)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

impl Inner {
    fn lock_queues(&self) -> MutexGuard<'_, HashMap<String, ActionQueue>> {
        // Queue state stays consistent across a panic: every mutation is a
        // single push or pop.
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn drain(self: Arc<Self>, git_name: String) {
        loop {
            let kind = self
                .lock_queues()
                .get(&git_name)
                .and_then(ActionQueue::newest_kind);
            let Some(kind) = kind else {
                return;
            };

            // A panicking run still answers its caller and leaves the queue
            // draining.
            let outcome = match AssertUnwindSafe(self.run_once(&git_name, kind))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(git_name = %git_name, %kind, panic = %message, "Run panicked");
                    ActionOutcome::failed(kind, PipelineError::Aborted(message))
                }
            };

            let (request, more) = {
                let mut queues = self.lock_queues();
                match queues.get_mut(&git_name) {
                    Some(queue) => (queue.pop_oldest(), !queue.is_empty()),
                    None => (None, false),
                }
            };

            if let Some(request) = request {
                if request.kind != kind {
                    debug!(git_name = %git_name, requested = %request.kind, executed = %kind, "Answering with a different kind");
                }
                if request.responder.send(outcome).is_err() {
                    debug!(git_name = %git_name, "Caller went away before its outcome was ready");
                }
            }

            if !more {
                debug!(git_name = %git_name, "Queue drained");
                return;
            }
        }
    }

    /// One physical run: every descriptor of the clone, in config order.
    async fn run_once(&self, git_name: &str, kind: ActionKind) -> ActionOutcome {
        let config = self.config.current();
        let projects = config.projects_for(git_name);
        if projects.is_empty() {
            warn!(git_name, %kind, "No project configured");
            return ActionOutcome::failed(kind, PipelineError::UnknownProject(git_name.to_string()));
        }

        if let Err(e) = tokio::fs::create_dir_all(&config.repos_path).await {
            warn!(path = %config.repos_path.display(), error = %e, "Failed to create repos directory");
        }

        let repo_path = config.repo_path(git_name);
        let mut pipeline = Pipeline::new(self.runner.clone(), config.scripts_path.clone());
        if let Some(env) = &self.base_env {
            pipeline = pipeline.with_base_env(env.clone());
        }

        let mut results = Vec::with_capacity(projects.len());
        for project in &projects {
            let run = pipeline.execute(project, &repo_path, kind).await;

            let (report_path, report_error) = match self
                .reports
                .persist(&project.git_name, &project.branch, kind, &run.log)
                .await
            {
                Ok(path) => (Some(path), None),
                Err(e) => {
                    error!(git_name, branch = %project.branch, %kind, error = %e, "Failed to persist report");
                    (None, Some(e.to_string()))
                }
            };

            results.push(ProjectResult {
                git_name: project.git_name.clone(),
                branch: project.branch.clone(),
                ok: run.ok,
                status: run.status,
                error: run.error,
                report_path,
                report_error,
            });
        }

        ActionOutcome::from_results(kind, results)
    }
}
