//! devserver HTTP server

use devserver_api::{AppState, routes};
use devserver_config::{ConfigHandle, watch_config};
use devserver_scheduler::Poller;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "/var/lib/devserver/config.kdl";
const CONFIG_WATCH_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Get config path from environment
    let config_path = PathBuf::from(
        std::env::var("DEVSERVER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
    );

    info!(path = %config_path.display(), "Loading configuration...");
    let config = ConfigHandle::load(&config_path)?;
    let current = config.current();
    info!(projects = ?current.git_names(), "Configuration loaded");

    // Create app state
    let state = AppState::new(config.clone());

    // Background work: reload on change, poll projects
    tokio::spawn(watch_config(config, config_path, CONFIG_WATCH_INTERVAL));
    tokio::spawn(Poller::new(state.coordinator.clone()).run());

    // Build router
    let app = routes::router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], current.port));
    info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
