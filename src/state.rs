//! Application state
//!
//! Holds all shared components and state

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::alert_engine::{
    AlertAggregator, DetectorId, ScoringStrategy, DEFAULT_AUDIO_THRESHOLD,
    DEFAULT_MOTION_THRESHOLD,
};
use crate::camera_feed::CameraFeed;
use crate::motion::MotionSampler;
use crate::orchestrator::MonitorOrchestrator;
use crate::realtime_hub::RealtimeHub;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Camera hostname to locate on the LAN
    pub camera_hostname: String,
    /// Subnet swept before the local interfaces (CIDR, optional hint)
    pub camera_subnet: Option<String>,
    /// Camera basic-auth credentials
    pub camera_username: Option<String>,
    pub camera_password: Option<String>,
    /// Stream paths on the camera
    pub video_path: String,
    pub audio_path: String,
    /// Pre-supplied audio baseline in dB (skips boot calibration)
    pub audio_baseline: Option<f64>,
    /// Audio detector alert threshold
    pub audio_threshold: f64,
    /// Audio detector scoring strategy
    pub audio_scoring: ScoringStrategy,
    /// Motion detector alert threshold
    pub motion_threshold: f64,
    /// Per-port timeout while probing swept hosts (ms)
    pub probe_timeout_ms: u32,
    /// Stream recovery attempts before reporting the device unavailable
    pub max_recovery_attempts: u32,
}

impl AppConfig {
    /// Read configuration from the environment
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            camera_hostname: std::env::var("CAMERA_HOSTNAME")
                .unwrap_or_else(|_| "DCS-932LB".to_string()),
            camera_subnet: std::env::var("CAMERA_SUBNET").ok(),
            camera_username: std::env::var("CAMERA_USERNAME").ok(),
            camera_password: std::env::var("CAMERA_PASSWORD").ok(),
            video_path: std::env::var("CAMERA_VIDEO_PATH")
                .unwrap_or_else(|_| "/video.cgi".to_string()),
            audio_path: std::env::var("CAMERA_AUDIO_PATH")
                .unwrap_or_else(|_| "/audio.cgi".to_string()),
            audio_baseline: std::env::var("AUDIO_BASELINE")
                .ok()
                .and_then(|v| v.parse().ok()),
            audio_threshold: std::env::var("AUDIO_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_AUDIO_THRESHOLD),
            audio_scoring: std::env::var("AUDIO_SCORING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(ScoringStrategy::AreaRatio),
            motion_threshold: std::env::var("MOTION_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MOTION_THRESHOLD),
            probe_timeout_ms: std::env::var("PROBE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(250),
            max_recovery_attempts: std::env::var("MAX_RECOVERY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Camera transport (device resolution, streams, audio monitor)
    pub feed: Arc<CameraFeed>,
    /// Frame differencing state
    pub motion: Arc<Mutex<MotionSampler>>,
    /// Alert detectors behind one lock
    pub aggregator: Arc<RwLock<AlertAggregator>>,
    /// Audio detector handle within the aggregator
    pub audio_id: DetectorId,
    /// Motion detector handle within the aggregator
    pub motion_id: DetectorId,
    /// WebSocket fan-out
    pub hub: Arc<RealtimeHub>,
    /// Monitoring loop
    pub orchestrator: Arc<MonitorOrchestrator>,
    /// Process start time, for uptime reporting
    pub started_at: DateTime<Utc>,
}
