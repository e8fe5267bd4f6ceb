//! Report persistence.

use async_trait::async_trait;
use devserver_core::log::PipelineLog;
use devserver_core::{ActionKind, PipelineError, ProjectKey};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Destination for run logs.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Write `log` as the report of `(git_name, branch, kind)`, replacing any
    /// previous report. Returns where it was written.
    async fn persist(
        &self,
        git_name: &str,
        branch: &str,
        kind: ActionKind,
        log: &PipelineLog,
    ) -> Result<PathBuf, PipelineError>;

    /// Load a report back, `None` if none was written yet.
    async fn read(&self, key: &ProjectKey, kind: ActionKind) -> Result<Option<Vec<u8>>, PipelineError>;
}

/// Writes reports as files: build reports under one root, test reports
/// under another.
#[derive(Debug, Clone)]
pub struct FileReportSink {
    reports_root: PathBuf,
    tests_root: PathBuf,
}

impl FileReportSink {
    pub fn new(reports_root: impl Into<PathBuf>, tests_root: impl Into<PathBuf>) -> Self {
        Self {
            reports_root: reports_root.into(),
            tests_root: tests_root.into(),
        }
    }

    pub fn root(&self, kind: ActionKind) -> &Path {
        match kind {
            ActionKind::Build => &self.reports_root,
            ActionKind::Test => &self.tests_root,
        }
    }

    /// `<root(kind)>/<branch>.<git_name>` with path separators replaced.
    pub fn report_path(&self, key: &ProjectKey, kind: ActionKind) -> PathBuf {
        self.root(kind).join(key.report_name())
    }
}

#[async_trait]
impl ReportSink for FileReportSink {
    async fn persist(
        &self,
        git_name: &str,
        branch: &str,
        kind: ActionKind,
        log: &PipelineLog,
    ) -> Result<PathBuf, PipelineError> {
        let path = self.report_path(&ProjectKey::new(branch, git_name), kind);

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(path = %parent.display(), error = %e, "Failed to create report directory");
            }
        }

        let storage = |e: std::io::Error| PipelineError::Storage(format!("{}: {}", path.display(), e));

        let mut file = tokio::fs::File::create(&path).await.map_err(storage)?;
        for chunk in log.chunks() {
            file.write_all(&chunk.data).await.map_err(storage)?;
        }
        file.flush().await.map_err(storage)?;

        debug!(path = %path.display(), chunks = log.len(), "Report written");
        Ok(path)
    }

    async fn read(&self, key: &ProjectKey, kind: ActionKind) -> Result<Option<Vec<u8>>, PipelineError> {
        let path = self.report_path(key, kind);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::Storage(format!("{}: {}", path.display(), e))),
        }
    }
}
