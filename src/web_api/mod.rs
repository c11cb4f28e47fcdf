//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes
//! - Request validation
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_sec = (chrono::Utc::now() - state.started_at).num_seconds().max(0) as u64;
    let device_resolved = state.feed.locator().cached_ip().await.is_some();

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec,
        device_resolved,
        monitoring: state.orchestrator.is_running().await,
        clients: state.hub.connection_count(),
    };

    Json(response)
}

/// Status endpoint (device banner)
pub async fn device_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "device_type": "network-camera-monitor",
        "camera_hostname": state.config.camera_hostname,
        "firmware_version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
