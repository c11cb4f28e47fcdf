//! AudioMonitor - Ambient Sound Level Sampler
//!
//! ## Responsibilities
//!
//! - Read fixed-size PCM chunks from the camera audio stream
//! - Record a dB baseline over a calibration capture
//! - Push levels relative to (baseline + threshold) into the ring buffer
//! - Start/stop the sampling task with join semantics

pub mod level;

use std::sync::Arc;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::camera_feed::audio::AudioChunkStream;
use crate::sample_buffer::{Sample, SampleBuffer};

/// Audio capture parameters.
#[derive(Debug, Clone)]
pub struct AudioMonitorConfig {
    /// PCM sample rate of the camera stream (Hz)
    pub sample_rate: u32,
    /// Samples per chunk read (2 bytes each on the wire)
    pub chunk_samples: usize,
    /// Calibration capture length (seconds)
    pub baseline_secs: u32,
    /// dB offset added to the baseline when normalizing samples
    pub threshold_db: f64,
    /// Ring buffer history length (seconds)
    pub history_secs: u32,
}

impl Default for AudioMonitorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            chunk_samples: 1024,
            baseline_secs: 6,
            threshold_db: 1.5,
            history_secs: 600,
        }
    }
}

impl AudioMonitorConfig {
    /// Whole chunks covering one calibration capture.
    pub fn baseline_chunks(&self) -> usize {
        (self.baseline_secs as usize * self.sample_rate as usize) / self.chunk_samples
    }

    /// Ring buffer capacity covering `history_secs` of chunks.
    pub fn history_capacity(&self) -> usize {
        (self.history_secs as usize * self.sample_rate as usize) / self.chunk_samples
    }

    /// Wire size of one chunk read.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_samples * 2
    }
}

struct SamplerTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Background dB sampler for one camera audio stream.
///
/// State machine: Idle -> Running -> Idle. `start` is idempotent while
/// Running; `stop` joins the task, so no sample lands after it returns.
/// The task also ends on its own when the stream closes, which callers
/// observe via `is_running`.
pub struct AudioMonitor {
    config: AudioMonitorConfig,
    buffer: Arc<RwLock<SampleBuffer>>,
    baseline: Arc<RwLock<Option<f64>>>,
    current_db: Arc<RwLock<Option<f64>>>,
    task: Mutex<Option<SamplerTask>>,
}

impl AudioMonitor {
    /// Create a monitor. A pre-measured baseline (from config) skips the
    /// first calibration capture.
    pub fn new(config: AudioMonitorConfig, initial_baseline: Option<f64>) -> Self {
        let capacity = config.history_capacity();
        Self {
            config,
            buffer: Arc::new(RwLock::new(SampleBuffer::new(capacity))),
            baseline: Arc::new(RwLock::new(initial_baseline)),
            current_db: Arc::new(RwLock::new(None)),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AudioMonitorConfig {
        &self.config
    }

    /// Record a fresh baseline from the stream.
    ///
    /// Reads `baseline_chunks()` whole chunks. If any read fails or the
    /// stream ends early, the capture aborts and nothing changes; callers
    /// detect the still-unset baseline and retry with a new stream. A
    /// completed capture sets the baseline (possibly to `None` when the
    /// signal was unmeasurable) and resets the sample history.
    pub async fn record_baseline(&self, stream: &mut AudioChunkStream) -> Option<f64> {
        let chunks = self.config.baseline_chunks();
        let mut pcm: Vec<i16> = Vec::with_capacity(chunks * self.config.chunk_samples);

        for n in 0..chunks {
            match stream.read_chunk().await {
                Ok(Some(bytes)) => pcm.extend(level::decode_pcm_i16le(&bytes)),
                Ok(None) => {
                    tracing::warn!(read = n, needed = chunks, "Baseline capture ended early");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(read = n, error = %e, "Baseline capture failed");
                    return None;
                }
            }
        }

        let db = level::signal_db(&pcm);
        *self.baseline.write().await = db;
        self.buffer.write().await.clear();

        match db {
            Some(db) => tracing::info!(baseline_db = format!("{:.2}", db), "Audio baseline recorded"),
            None => tracing::warn!("Baseline capture yielded no measurable signal"),
        }
        db
    }

    /// Start sampling from the stream. Returns true if the task is running
    /// after the call.
    ///
    /// An unset baseline triggers a calibration capture first; if that
    /// fails the monitor stays Idle. A monitor that is already Running
    /// keeps its existing stream and ignores the new one.
    pub async fn start(&self, mut stream: AudioChunkStream) -> bool {
        let mut slot = self.task.lock().await;
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                tracing::debug!("Audio monitor already running");
                return true;
            }
        }
        // Reap a task that exited on its own (stream EOF).
        if let Some(task) = slot.take() {
            let _ = task.handle.await;
        }

        if self.baseline.read().await.is_none() {
            self.record_baseline(&mut stream).await;
            if self.baseline.read().await.is_none() {
                tracing::warn!("Audio monitor not started: calibration failed");
                return false;
            }
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let buffer = Arc::clone(&self.buffer);
        let baseline = Arc::clone(&self.baseline);
        let current_db = Arc::clone(&self.current_db);
        let threshold_db = self.config.threshold_db;

        let handle = tokio::spawn(async move {
            tracing::info!("Audio sampling started");
            loop {
                let read = tokio::select! {
                    _ = stop_rx.changed() => break,
                    read = stream.read_chunk() => read,
                };
                let bytes = match read {
                    Ok(Some(bytes)) => bytes,
                    Ok(None) => {
                        tracing::warn!("Audio stream ended");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Audio chunk read failed");
                        break;
                    }
                };

                let pcm = level::decode_pcm_i16le(&bytes);
                let Some(db) = level::signal_db(&pcm) else {
                    // Unmeasurable chunk, skip it.
                    continue;
                };
                *current_db.write().await = Some(db);

                let Some(base) = *baseline.read().await else {
                    continue;
                };
                buffer
                    .write()
                    .await
                    .push(Sample::now(db - (base + threshold_db)));
            }
            tracing::info!("Audio sampling stopped");
        });

        *slot = Some(SamplerTask {
            stop: stop_tx,
            handle,
        });
        true
    }

    /// Signal the sampling task and wait for it to finish.
    pub async fn stop(&self) {
        let task = self.task.lock().await.take();
        let Some(task) = task else {
            return;
        };
        let _ = task.stop.send(true);
        if let Err(e) = task.handle.await {
            tracing::error!(error = %e, "Audio sampler task panicked");
        }
    }

    pub async fn is_running(&self) -> bool {
        let slot = self.task.lock().await;
        slot.as_ref().map(|t| !t.handle.is_finished()).unwrap_or(false)
    }

    /// Snapshot of the full sample history, oldest first.
    pub async fn batch(&self) -> Vec<Sample> {
        self.buffer.read().await.snapshot()
    }

    pub async fn baseline(&self) -> Option<f64> {
        *self.baseline.read().await
    }

    pub async fn clear_baseline(&self) {
        *self.baseline.write().await = None;
    }

    /// Drop the sample history. The baseline is untouched.
    pub async fn reset(&self) {
        self.buffer.write().await.clear();
    }

    /// Raw dB of the most recent measurable chunk.
    pub async fn current_db(&self) -> Option<f64> {
        *self.current_db.read().await
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use futures::StreamExt;
    use std::time::Duration;

    fn test_config() -> AudioMonitorConfig {
        AudioMonitorConfig {
            sample_rate: 800,
            chunk_samples: 80,
            baseline_secs: 1,
            threshold_db: 1.5,
            history_secs: 60,
        }
    }

    fn pcm_chunk(amplitude: i16, samples: usize) -> Bytes {
        let mut bytes = Vec::with_capacity(samples * 2);
        for _ in 0..samples {
            bytes.extend_from_slice(&amplitude.to_le_bytes());
        }
        Bytes::from(bytes)
    }

    fn stream_of(chunks: Vec<Bytes>, chunk_bytes: usize) -> AudioChunkStream {
        let items: Vec<reqwest::Result<Bytes>> = chunks.into_iter().map(Ok).collect();
        AudioChunkStream::from_stream(stream::iter(items).boxed(), chunk_bytes)
    }

    async fn wait_until_idle(monitor: &AudioMonitor) {
        for _ in 0..100 {
            if !monitor.is_running().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("sampler did not go idle");
    }

    #[tokio::test]
    async fn baseline_of_constant_signal() {
        let config = test_config();
        let monitor = AudioMonitor::new(config.clone(), None);
        // 10 chunks of constant amplitude 100 -> RMS 100 -> 40 dB.
        let chunks = vec![pcm_chunk(100, config.chunk_samples); config.baseline_chunks()];
        let mut stream = stream_of(chunks, config.chunk_bytes());

        let db = monitor.record_baseline(&mut stream).await.unwrap();
        assert!((db - 40.0).abs() < 1e-9);
        assert_eq!(monitor.baseline().await, Some(db));
    }

    #[tokio::test]
    async fn short_capture_aborts_without_setting_baseline() {
        let config = test_config();
        let monitor = AudioMonitor::new(config.clone(), None);
        let chunks = vec![pcm_chunk(100, config.chunk_samples); config.baseline_chunks() - 1];
        let mut stream = stream_of(chunks, config.chunk_bytes());

        assert!(monitor.record_baseline(&mut stream).await.is_none());
        assert_eq!(monitor.baseline().await, None);
    }

    #[tokio::test]
    async fn silent_capture_leaves_baseline_unset() {
        let config = test_config();
        let monitor = AudioMonitor::new(config.clone(), None);
        let chunks = vec![pcm_chunk(0, config.chunk_samples); config.baseline_chunks()];
        let mut stream = stream_of(chunks, config.chunk_bytes());

        assert!(monitor.record_baseline(&mut stream).await.is_none());
        assert_eq!(monitor.baseline().await, None);
    }

    #[tokio::test]
    async fn start_refuses_when_calibration_fails() {
        let config = test_config();
        let monitor = AudioMonitor::new(config.clone(), None);
        let stream = stream_of(vec![], config.chunk_bytes());

        assert!(!monitor.start(stream).await);
        assert!(!monitor.is_running().await);
    }

    #[tokio::test]
    async fn sampling_pushes_levels_relative_to_alert_point() {
        let config = test_config();
        // Baseline 40 dB preset, threshold 1.5 dB.
        let monitor = AudioMonitor::new(config.clone(), Some(40.0));
        // Constant amplitude 1000 -> 60 dB -> level 18.5.
        let chunks = vec![pcm_chunk(1000, config.chunk_samples); 5];
        let stream = stream_of(chunks, config.chunk_bytes());

        assert!(monitor.start(stream).await);
        wait_until_idle(&monitor).await;

        let batch = monitor.batch().await;
        assert_eq!(batch.len(), 5);
        for sample in batch {
            assert!((sample.level - 18.5).abs() < 1e-9);
        }
        assert!((monitor.current_db().await.unwrap() - 60.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn stop_joins_and_no_sample_lands_after() {
        let config = test_config();
        let monitor = AudioMonitor::new(config.clone(), Some(40.0));
        let chunk = pcm_chunk(500, config.chunk_samples);
        let endless = stream::repeat_with(move || Ok(chunk.clone())).boxed();
        let stream = AudioChunkStream::from_stream(endless, config.chunk_bytes());

        assert!(monitor.start(stream).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        monitor.stop().await;
        assert!(!monitor.is_running().await);

        let len_after_stop = monitor.batch().await.len();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(monitor.batch().await.len(), len_after_stop);
    }

    #[tokio::test]
    async fn restart_does_not_recalibrate() {
        let config = test_config();
        let monitor = AudioMonitor::new(config.clone(), Some(40.0));

        let first = stream_of(vec![pcm_chunk(1000, config.chunk_samples); 2], config.chunk_bytes());
        assert!(monitor.start(first).await);
        wait_until_idle(&monitor).await;
        monitor.stop().await;

        // Restart consumes no calibration chunks: both chunks of the new
        // stream show up as samples.
        let second = stream_of(vec![pcm_chunk(1000, config.chunk_samples); 2], config.chunk_bytes());
        assert!(monitor.start(second).await);
        wait_until_idle(&monitor).await;
        assert_eq!(monitor.batch().await.len(), 4);

        monitor.reset().await;
        assert!(monitor.batch().await.is_empty());
        assert_eq!(monitor.baseline().await, Some(40.0));
    }
}
