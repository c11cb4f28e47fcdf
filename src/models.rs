//! Shared models and types for Camsentry

use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub device_resolved: bool,
    pub monitoring: bool,
    pub clients: u64,
}

/// Combined alert state (GET /api/alerts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStateResponse {
    pub enabled: bool,
    pub alert: bool,
    pub level: f64,
    pub audio: f64,
    pub video: f64,
}

/// Audio detector threshold payload (GET/PUT /api/alerts/audio-threshold)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdPayload {
    pub threshold: f64,
}

/// Baseline recalibration result (POST /api/baseline)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineResponse {
    pub baseline_db: f64,
}
