//! Camsentry - Network Camera Monitoring Service
//!
//! Main entry point for the monitoring service.

use std::sync::Arc;

use camsentry::{
    alert_engine::{AlertAggregator, Detector},
    audio_monitor::{AudioMonitor, AudioMonitorConfig},
    camera_feed::{CameraFeed, CameraFeedConfig},
    device_locator::{DeviceLocator, DeviceLocatorConfig},
    motion::MotionSampler,
    orchestrator::MonitorOrchestrator,
    realtime_hub::RealtimeHub,
    state::{AppConfig, AppState},
    web_api,
};
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camsentry=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Camsentry v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::from_env();
    tracing::info!(
        camera_hostname = %config.camera_hostname,
        subnet_hint = ?config.camera_subnet,
        audio_threshold = config.audio_threshold,
        motion_threshold = config.motion_threshold,
        "Configuration loaded"
    );

    // Device discovery
    let locator = DeviceLocator::new(DeviceLocatorConfig {
        hostname: config.camera_hostname.clone(),
        subnet_hint: config.camera_subnet.clone(),
        probe_timeout_ms: config.probe_timeout_ms,
        ..DeviceLocatorConfig::default()
    });

    // Audio sampling; a pre-supplied baseline skips boot calibration
    let monitor = AudioMonitor::new(AudioMonitorConfig::default(), config.audio_baseline);
    if let Some(baseline) = config.audio_baseline {
        tracing::info!(baseline_db = baseline, "Using pre-supplied audio baseline");
    }

    // Camera transports
    let feed = Arc::new(CameraFeed::new(
        CameraFeedConfig {
            username: config.camera_username.clone(),
            password: config.camera_password.clone(),
            video_path: config.video_path.clone(),
            audio_path: config.audio_path.clone(),
            max_recovery_attempts: config.max_recovery_attempts,
            ..CameraFeedConfig::default()
        },
        locator,
        monitor,
    )?);

    // Detectors
    let mut aggregator = AlertAggregator::new();
    let audio_id =
        aggregator.add_detector(Detector::audio(config.audio_threshold, config.audio_scoring));
    let motion_id = aggregator.add_detector(Detector::motion(config.motion_threshold));
    let aggregator = Arc::new(RwLock::new(aggregator));
    tracing::info!("AlertAggregator initialized (audio + motion detectors)");

    let motion = Arc::new(Mutex::new(MotionSampler::new()));
    let hub = Arc::new(RealtimeHub::new());

    // Monitoring loop
    let orchestrator = Arc::new(MonitorOrchestrator::new(
        Arc::clone(&feed),
        Arc::clone(&motion),
        Arc::clone(&aggregator),
        audio_id,
        motion_id,
        Arc::clone(&hub),
    ));
    orchestrator.start().await;
    tracing::info!("MonitorOrchestrator started");

    // Create application state
    let state = AppState {
        config,
        feed,
        motion,
        aggregator,
        audio_id,
        motion_id,
        hub,
        orchestrator,
        started_at: chrono::Utc::now(),
    };

    // Create router
    let app = web_api::create_router(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
