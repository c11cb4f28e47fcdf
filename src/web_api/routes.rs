//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;

use crate::models::{AlertStateResponse, ApiResponse, BaselineResponse, ThresholdPayload};
use crate::realtime_hub::ClientReport;
use crate::state::AppState;
use crate::Error;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(super::device_status))
        // Alerts
        .route("/api/alerts", get(get_alerts))
        .route("/api/alerts/enable", post(enable_alerts))
        .route("/api/alerts/disable", post(disable_alerts))
        .route("/api/alerts/toggle", post(toggle_alerts))
        .route("/api/alerts/enabled", get(alerts_enabled))
        .route("/api/alerts/audio-threshold", get(get_audio_threshold))
        .route("/api/alerts/audio-threshold", put(set_audio_threshold))
        // Calibration
        .route("/api/baseline", post(recalibrate_baseline))
        // Time sync (clients compare against their own clock to report latency)
        .route("/api/server-time", get(server_time))
        // WebSocket
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

// ========================================
// Alert Handlers
// ========================================

/// Combined alert state
async fn get_alerts(State(state): State<AppState>) -> impl IntoResponse {
    let aggregator = state.aggregator.read().await;

    let response = AlertStateResponse {
        enabled: aggregator.is_enabled(),
        alert: aggregator.status(),
        level: aggregator.level(),
        audio: aggregator.detector_level(state.audio_id),
        video: aggregator.detector_level(state.motion_id),
    };

    Json(ApiResponse::success(response))
}

async fn enable_alerts(State(state): State<AppState>) -> impl IntoResponse {
    state.aggregator.write().await.enable();
    tracing::info!("Alerting enabled");
    Json(json!({"ok": true, "enabled": true}))
}

async fn disable_alerts(State(state): State<AppState>) -> impl IntoResponse {
    state.aggregator.write().await.disable();
    tracing::info!("Alerting disabled");
    Json(json!({"ok": true, "enabled": false}))
}

async fn toggle_alerts(State(state): State<AppState>) -> impl IntoResponse {
    let enabled = state.aggregator.write().await.toggle();
    tracing::info!(enabled = enabled, "Alerting toggled");
    Json(json!({"ok": true, "enabled": enabled}))
}

async fn alerts_enabled(State(state): State<AppState>) -> impl IntoResponse {
    let enabled = state.aggregator.read().await.is_enabled();
    Json(ApiResponse::success(json!({"enabled": enabled})))
}

// ========================================
// Threshold Handlers
// ========================================

async fn get_audio_threshold(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
    let threshold = state
        .aggregator
        .read()
        .await
        .threshold(state.audio_id)
        .ok_or_else(|| Error::NotFound("audio detector".to_string()))?;

    Ok(Json(ApiResponse::success(ThresholdPayload { threshold })))
}

async fn set_audio_threshold(
    State(state): State<AppState>,
    Json(payload): Json<ThresholdPayload>,
) -> Result<impl IntoResponse, Error> {
    if !(0.0..=1.0).contains(&payload.threshold) {
        return Err(Error::Validation(format!(
            "threshold must be within 0.0..=1.0, got {}",
            payload.threshold
        )));
    }

    state
        .aggregator
        .write()
        .await
        .set_threshold(state.audio_id, payload.threshold);

    tracing::info!(threshold = payload.threshold, "Audio alert threshold updated");

    Ok(Json(ApiResponse::success(ThresholdPayload {
        threshold: payload.threshold,
    })))
}

// ========================================
// Calibration Handler
// ========================================

/// Recalibrate the audio baseline and reseed motion detection.
/// POST /api/baseline
///
/// Blocks until a fresh baseline has been captured, which takes several
/// seconds of audio plus any device re-resolution retries.
async fn recalibrate_baseline(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
    let baseline_db = state.feed.recalibrate().await?;

    state.motion.lock().await.reset();
    state
        .aggregator
        .write()
        .await
        .reset_threshold(state.motion_id);

    tracing::info!(baseline_db = baseline_db, "Baseline recalibrated");

    Ok(Json(ApiResponse::success(BaselineResponse { baseline_db })))
}

// ========================================
// Time Sync Handler
// ========================================

async fn server_time() -> impl IntoResponse {
    Json(json!({"time": chrono::Utc::now().to_rfc3339()}))
}

// ========================================
// WebSocket Handler
// ========================================

/// WebSocket upgrade handler
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Register with RealtimeHub
    let (conn_id, mut rx) = state.hub.register().await;

    tracing::info!(connection_id = %conn_id, "WebSocket client connected");

    // Forward hub messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Inbound traffic carries the client's latency reports
    let hub = state.hub.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientReport>(&text) {
                    Ok(report) => hub.update_latency(&conn_id, report.time_diff).await,
                    Err(e) => {
                        tracing::debug!(
                            connection_id = %conn_id,
                            error = %e,
                            "Unrecognized client message"
                        );
                    }
                },
                Ok(Message::Close(_)) => {
                    tracing::info!(connection_id = %conn_id, "WebSocket client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    // Either direction ending tears the connection down
    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    state.hub.unregister(&conn_id).await;
}
