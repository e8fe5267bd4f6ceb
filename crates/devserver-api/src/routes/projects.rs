//! Manual trigger endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use devserver_core::{ActionKind, ActionOutcome, PipelineError};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects))
        .route("/projects/{git_name}/build", post(build_project))
        .route("/projects/{git_name}/test", post(test_project))
        .route("/full-pass", post(full_pass))
}

#[derive(Debug, Serialize)]
struct ProjectSummary {
    git_name: String,
    branch: String,
    name: String,
    key: String,
    build_type: Option<String>,
    development_url: Option<String>,
}

async fn list_projects(State(state): State<AppState>) -> Json<Vec<ProjectSummary>> {
    let config = state.config.current();
    let projects = config
        .projects
        .iter()
        .map(|p| ProjectSummary {
            git_name: p.git_name.clone(),
            branch: p.branch.clone(),
            name: p.display_name().to_string(),
            key: p.key().report_name(),
            build_type: p.build.as_ref().map(|b| b.build_type.clone()),
            development_url: p.development_url.clone(),
        })
        .collect();
    Json(projects)
}

async fn build_project(
    State(state): State<AppState>,
    Path(git_name): Path<String>,
) -> Result<Json<ActionOutcome>, ApiError> {
    run_action(&state, &git_name, ActionKind::Build).await
}

async fn test_project(
    State(state): State<AppState>,
    Path(git_name): Path<String>,
) -> Result<Json<ActionOutcome>, ApiError> {
    run_action(&state, &git_name, ActionKind::Test).await
}

async fn run_action(
    state: &AppState,
    git_name: &str,
    kind: ActionKind,
) -> Result<Json<ActionOutcome>, ApiError> {
    // Queues exist only for configured clones
    if state.config.current().projects_for(git_name).is_empty() {
        return Err(PipelineError::UnknownProject(git_name.to_string()).into());
    }

    info!(git_name, %kind, "Manual trigger");
    let outcome = state.coordinator.request(git_name, kind).await?;

    // Removed by a reload while queued
    if let Some(err @ PipelineError::UnknownProject(_)) = &outcome.error {
        return Err(err.clone().into());
    }
    Ok(Json(outcome))
}

async fn full_pass(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        coordinator.request_full_pass().await;
    });
    (StatusCode::ACCEPTED, Json(json!({ "status": "started" })))
}
