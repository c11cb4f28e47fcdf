//! MonitorOrchestrator - Acquisition and Publishing Loop
//!
//! ## Responsibilities
//!
//! - Drive frame acquisition and motion scoring
//! - Pull audio batches and evaluate detectors
//! - Fan frames out per client, sized to reported latency
//! - Broadcast combined alert state each cycle

pub mod compress;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::alert_engine::{AlertAggregator, DetectorId};
use crate::camera_feed::CameraFeed;
use crate::motion::MotionSampler;
use crate::realtime_hub::{AlertMessage, FrameMessage, HubMessage, RealtimeHub};

struct LoopTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// MonitorOrchestrator instance
///
/// Cadence is frame-driven: the MJPEG read blocks at camera fps, so each
/// loop iteration publishes one frame plus the alert state derived from
/// the freshest sampler histories.
pub struct MonitorOrchestrator {
    feed: Arc<CameraFeed>,
    motion: Arc<Mutex<MotionSampler>>,
    aggregator: Arc<RwLock<AlertAggregator>>,
    audio_id: DetectorId,
    motion_id: DetectorId,
    hub: Arc<RealtimeHub>,
    task: Mutex<Option<LoopTask>>,
}

impl MonitorOrchestrator {
    pub fn new(
        feed: Arc<CameraFeed>,
        motion: Arc<Mutex<MotionSampler>>,
        aggregator: Arc<RwLock<AlertAggregator>>,
        audio_id: DetectorId,
        motion_id: DetectorId,
        hub: Arc<RealtimeHub>,
    ) -> Self {
        Self {
            feed,
            motion,
            aggregator,
            audio_id,
            motion_id,
            hub,
            task: Mutex::new(None),
        }
    }

    /// Start the acquisition loop. Idempotent while running.
    pub async fn start(&self) {
        let mut slot = self.task.lock().await;
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                tracing::warn!("Monitoring already running");
                return;
            }
        }
        if let Some(task) = slot.take() {
            let _ = task.handle.await;
        }

        tracing::info!("Starting monitor orchestrator");

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let feed = Arc::clone(&self.feed);
        let motion = Arc::clone(&self.motion);
        let aggregator = Arc::clone(&self.aggregator);
        let hub = Arc::clone(&self.hub);
        let audio_id = self.audio_id;
        let motion_id = self.motion_id;

        let handle = tokio::spawn(async move {
            loop {
                // Video: acquire, score motion.
                let frame = tokio::select! {
                    _ = stop_rx.changed() => break,
                    frame = feed.frame() => frame,
                };
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(error = %e, "Frame acquisition failed, retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };

                {
                    let mut sampler = motion.lock().await;
                    sampler.ingest(&frame);
                    let history = sampler.samples();
                    drop(sampler);
                    aggregator.write().await.evaluate(motion_id, &history);
                }

                // Frame fan-out, sized per client.
                let now = Utc::now().to_rfc3339();
                for (client, latency) in hub.clients().await {
                    let data = match compress::quality_for_latency(latency) {
                        Some(quality) => match compress::encode_frame(&frame, quality) {
                            Ok(b64) => Some(b64),
                            Err(e) => {
                                tracing::warn!(error = %e, "Frame encode failed");
                                None
                            }
                        },
                        None => None,
                    };
                    hub.send_to(
                        &client,
                        HubMessage::Frame(FrameMessage {
                            time: now.clone(),
                            data,
                        }),
                    )
                    .await;
                }

                // Audio: pull the history and evaluate.
                let batch = tokio::select! {
                    _ = stop_rx.changed() => break,
                    batch = feed.audio_batch() => batch,
                };
                match batch {
                    Ok(batch) if !batch.is_empty() => {
                        aggregator.write().await.evaluate(audio_id, &batch);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Audio acquisition failed");
                    }
                }

                // Alert broadcast carries the detectors' current levels.
                let (alert, audio_level, video_level, enabled) = {
                    let agg = aggregator.read().await;
                    (
                        agg.status(),
                        agg.detector_level(audio_id),
                        agg.detector_level(motion_id),
                        agg.is_enabled(),
                    )
                };
                hub.broadcast(HubMessage::Alert(AlertMessage {
                    time: Utc::now().to_rfc3339(),
                    alert,
                    audio: audio_level,
                    video: video_level,
                    enabled,
                }))
                .await;
            }

            feed.shutdown().await;
            tracing::info!("Monitor orchestrator stopped");
        });

        *slot = Some(LoopTask {
            stop: stop_tx,
            handle,
        });
    }

    /// Stop the loop and wait for it to wind down.
    pub async fn stop(&self) {
        let task = self.task.lock().await.take();
        let Some(task) = task else {
            return;
        };
        tracing::info!("Stopping monitor orchestrator");
        let _ = task.stop.send(true);
        if let Err(e) = task.handle.await {
            tracing::error!(error = %e, "Monitor loop panicked");
        }
    }

    pub async fn is_running(&self) -> bool {
        let slot = self.task.lock().await;
        slot.as_ref().map(|t| !t.handle.is_finished()).unwrap_or(false)
    }
}
