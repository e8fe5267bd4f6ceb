//! UI routes serving HTML templates.

use askama::Template;
use axum::Router;
use axum::extract::{Path, Request, State};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::{Authorization, HeaderMapExt};
use devserver_core::ActionKind;

use crate::AppState;
use crate::ansi;
use crate::error::{ApiError, basic_auth_challenge};

// ============================================================================
// Template structs
// ============================================================================

#[derive(Template)]
#[template(path = "pages/index.html")]
struct IndexTemplate {
    hostname: String,
    projects: Vec<ProjectRow>,
}

struct ProjectRow {
    name: String,
    git_name: String,
    branch: String,
    development_url: Option<String>,
    build_report_url: String,
    test_report_url: String,
}

#[derive(Template)]
#[template(path = "pages/report.html")]
struct ReportTemplate {
    title: String,
    project_name: String,
    key: String,
    content: String,
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(index_page))
        .route("/buildlog/{key}", get(build_log_page))
        .route("/testreport/{key}", get(test_report_page))
        .route_layer(middleware::from_fn_with_state(state, require_site_auth))
}

/// Basic auth against the configured site credentials, when there are any.
async fn require_site_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let config = state.config.current();
    if let Some(auth) = &config.site_auth {
        let authorized = request
            .headers()
            .typed_get::<Authorization<Basic>>()
            .is_some_and(|creds| creds.username() == auth.user && creds.password() == auth.pass);
        if !authorized {
            return basic_auth_challenge();
        }
    }
    next.run(request).await
}

// ============================================================================
// Page handlers
// ============================================================================

async fn index_page(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let config = state.config.current();

    let projects = config
        .projects
        .iter()
        .map(|p| {
            let key = p.key().report_name();
            ProjectRow {
                name: p.display_name().to_string(),
                git_name: p.git_name.clone(),
                branch: p.branch.clone(),
                development_url: p.development_url.clone(),
                build_report_url: format!("buildlog/{}", key),
                test_report_url: format!("testreport/{}", key),
            }
        })
        .collect();

    let template = IndexTemplate {
        hostname: config.hostname.clone().unwrap_or_else(|| "devserver".to_string()),
        projects,
    };
    Ok(Html(template.render()?))
}

async fn build_log_page(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    report_page(&state, &key, ActionKind::Build).await
}

async fn test_report_page(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    report_page(&state, &key, ActionKind::Test).await
}

async fn report_page(state: &AppState, key: &str, kind: ActionKind) -> Result<Html<String>, ApiError> {
    // Only configured projects have reports; this also keeps `key` from
    // naming arbitrary files.
    let config = state.config.current();
    let project = config
        .projects
        .iter()
        .find(|p| p.key().report_name() == key)
        .ok_or_else(|| ApiError::NotFound(format!("No project '{}'", key)))?;

    let data = state
        .reports
        .read(&project.key(), kind)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No {} report for '{}'", kind, key)))?;

    let title = match kind {
        ActionKind::Build => "Build Log",
        ActionKind::Test => "Test Report",
    };
    let template = ReportTemplate {
        title: title.to_string(),
        project_name: project.display_name().to_string(),
        key: key.to_string(),
        content: ansi::to_html(&String::from_utf8_lossy(&data)),
    };
    Ok(Html(template.render()?))
}
