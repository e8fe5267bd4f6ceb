//! GitHub webhook endpoint.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use devserver_scheduler::Coordinator;
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;
use tracing::{error, info, warn};

use crate::AppState;
use crate::error::ApiError;

/// Larger deliveries are rejected with 413.
pub const MAX_PAYLOAD_BYTES: usize = 100_000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/github", post(github_webhook))
        .layer(DefaultBodyLimit::max(MAX_PAYLOAD_BYTES))
}

/// Handle GitHub webhook events.
async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    // Get event type
    let event_type = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    // Get signature
    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok());

    let config = state.config.current();
    let Some(secret) = config.github_webhook_secret.as_deref() else {
        warn!(event = %event_type, "Webhook received but no secret is configured");
        return Err(ApiError::Unauthorized(
            "webhook secret not configured".to_string(),
        ));
    };

    if !verify_github_signature(secret, &body, signature) {
        warn!(event = %event_type, "Webhook secret mismatch, check configuration");
        return Err(ApiError::Unauthorized("invalid signature".to_string()));
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?;

    match event_type {
        "push" => {
            let repo_name = payload
                .get("repository")
                .and_then(|r| r.get("name"))
                .and_then(|n| n.as_str());

            match repo_name {
                Some(name) if !config.projects_for(name).is_empty() => {
                    info!(git_name = %name, "Push received, scheduling build and test");
                    tokio::spawn(build_then_test(
                        state.coordinator.clone(),
                        name.to_string(),
                    ));
                }
                _ => {
                    info!(repo = ?repo_name, "Push for an unmonitored repository");
                }
            }
        }
        "ping" => {
            info!("Received ping event");
        }
        _ => {
            info!(event = %event_type, "Ignoring webhook event");
        }
    }

    Ok(Json(json!({})))
}

async fn build_then_test(coordinator: Coordinator, git_name: String) {
    for result in [
        coordinator.request_build(&git_name).await,
        coordinator.request_test(&git_name).await,
    ] {
        match result {
            Ok(outcome) if outcome.is_success() => {}
            Ok(outcome) => {
                warn!(git_name = %git_name, kind = %outcome.kind_executed, error = ?outcome.error, "Webhook-triggered run failed");
            }
            Err(e) => error!(git_name = %git_name, error = %e, "Webhook-triggered run was dropped"),
        }
    }
}

/// Verify an `X-Hub-Signature-256` header against the raw body.
pub fn verify_github_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    // Signature format: "sha256=<hex>"
    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}
