//! Application state.

use devserver_config::ConfigHandle;
use devserver_core::executor::ProcessRunner;
use devserver_executor::LocalProcessRunner;
use devserver_scheduler::{Coordinator, FileReportSink, ReportSink};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ConfigHandle,
    pub coordinator: Coordinator,
    pub reports: Arc<dyn ReportSink>,
}

impl AppState {
    /// State backed by local processes and report files.
    ///
    /// Report directories are fixed at startup; changing them needs a restart.
    pub fn new(config: ConfigHandle) -> Self {
        let current = config.current();
        let reports: Arc<dyn ReportSink> = Arc::new(FileReportSink::new(
            current.reports_path.clone(),
            current.tests_path.clone(),
        ));
        Self::with_parts(config, Arc::new(LocalProcessRunner::new()), reports)
    }

    pub fn with_parts(
        config: ConfigHandle,
        runner: Arc<dyn ProcessRunner>,
        reports: Arc<dyn ReportSink>,
    ) -> Self {
        let coordinator = Coordinator::new(config.clone(), runner, reports.clone());
        Self {
            config,
            coordinator,
            reports,
        }
    }
}
