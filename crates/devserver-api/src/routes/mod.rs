//! HTTP routes.

pub mod health;
pub mod projects;
pub mod ui;
pub mod webhooks;

use crate::AppState;
use axum::Router;
use tower_http::services::ServeDir;

/// Build the main router.
pub fn router(state: AppState) -> Router {
    let web_path = state.config.current().web_path.clone();

    Router::new()
        .merge(ui::router(state.clone()))
        .nest("/api/v1", api_router())
        .nest("/webhooks", webhooks::router())
        .nest_service("/static", ServeDir::new(web_path))
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new().merge(projects::router())
}
