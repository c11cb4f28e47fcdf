//! Camsentry Library
//!
//! Continuous monitoring and alert aggregation for a flaky network camera.
//!
//! ## Architecture (9 Components)
//!
//! 1. DeviceLocator - Finds the camera on the LAN by hostname
//! 2. CameraFeed - MJPEG/PCM transport with stream recovery
//! 3. AudioMonitor - Background dB sampling against a calibrated baseline
//! 4. MotionSampler - Per-frame differencing
//! 5. AlertEngine - Sliding-window detectors behind one aggregator
//! 6. MonitorOrchestrator - The frame-driven monitoring loop
//! 7. RealtimeHub - WebSocket distribution with latency bookkeeping
//! 8. WebAPI - REST control surface
//! 9. SampleBuffer - Bounded time-series storage shared by samplers
//!
//! ## Design Principles
//!
//! - The camera is flaky: every transport failure is recoverable
//! - Detectors own their state; the aggregator owns the detectors
//! - No globals: everything reachable from AppState

pub mod alert_engine;
pub mod audio_monitor;
pub mod camera_feed;
pub mod device_locator;
pub mod error;
pub mod models;
pub mod motion;
pub mod orchestrator;
pub mod realtime_hub;
pub mod sample_buffer;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
