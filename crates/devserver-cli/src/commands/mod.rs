//! CLI command implementations.
//!
//! Each command returns whether everything it ran succeeded.

use anyhow::{Context, Result};
use devserver_config::{ConfigHandle, load_config};
use devserver_core::ActionKind;
use devserver_executor::LocalProcessRunner;
use devserver_scheduler::{Coordinator, FileReportSink};
use serde_json::json;
use std::sync::Arc;

fn coordinator(config_path: &str) -> Result<Coordinator> {
    let config = ConfigHandle::load(config_path)
        .with_context(|| format!("Failed to load config file: {}", config_path))?;
    let current = config.current();
    let reports = FileReportSink::new(current.reports_path.clone(), current.tests_path.clone());
    Ok(Coordinator::new(
        config,
        Arc::new(LocalProcessRunner::new()),
        Arc::new(reports),
    ))
}

pub fn validate(config_path: &str) -> Result<bool> {
    match load_config(config_path) {
        Ok(config) => {
            println!("Configuration is valid");
            for project in &config.projects {
                let build = project
                    .build
                    .as_ref()
                    .map(|b| b.build_type.as_str())
                    .unwrap_or("-");
                println!("  {} ({}) build={}", project.key(), project.display_name(), build);
            }
            Ok(true)
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            Ok(false)
        }
    }
}

pub async fn run(config_path: &str, git_name: &str, kind: ActionKind) -> Result<bool> {
    let coordinator = coordinator(config_path)?;
    let outcome = coordinator.request(git_name, kind).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome.is_success())
}

pub async fn full_pass(config_path: &str) -> Result<bool> {
    let coordinator = coordinator(config_path)?;
    let entries = coordinator.request_full_pass().await;

    let mut ok = true;
    let mut summary = Vec::with_capacity(entries.len());
    for entry in entries {
        let value = match entry.outcome {
            Ok(outcome) => {
                ok &= outcome.is_success();
                json!({ "git_name": entry.git_name, "requested": entry.requested, "outcome": outcome })
            }
            Err(e) => {
                ok = false;
                json!({ "git_name": entry.git_name, "requested": entry.requested, "error": e.to_string() })
            }
        };
        summary.push(value);
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ok)
}
