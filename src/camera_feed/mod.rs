//! CameraFeed - Camera Transports and Recovery
//!
//! ## Responsibilities
//!
//! - Build camera endpoint URLs from the resolved device address
//! - Own the MJPEG stream and the audio monitor
//! - Recover both paths by re-resolving the device
//! - Blocking baseline recalibration

pub mod audio;
pub mod mjpeg;

use std::net::IpAddr;
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::Mutex;

use crate::audio_monitor::AudioMonitor;
use crate::camera_feed::audio::AudioChunkStream;
use crate::camera_feed::mjpeg::MjpegStream;
use crate::device_locator::DeviceLocator;
use crate::error::{Error, Result};
use crate::sample_buffer::Sample;

/// Patience for a silent but running sampler before it is torn down.
const AUDIO_POLL_TRIES: u32 = 50;
const AUDIO_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Camera endpoint parameters.
#[derive(Debug, Clone)]
pub struct CameraFeedConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub video_path: String,
    pub audio_path: String,
    /// Per-frame read timeout (seconds)
    pub frame_timeout_secs: u64,
    /// Reopen/re-resolve rounds per call before surfacing an error
    pub max_recovery_attempts: u32,
}

impl Default for CameraFeedConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            video_path: "/video.cgi".to_string(),
            audio_path: "/audio.cgi".to_string(),
            frame_timeout_secs: 10,
            max_recovery_attempts: 10,
        }
    }
}

/// Owner of both camera transports.
///
/// The video stream lives behind a Mutex taken for the whole frame read;
/// the acquisition loop is the only caller, so the lock orders reopen
/// against read. Audio runs inside the monitor's own task.
pub struct CameraFeed {
    config: CameraFeedConfig,
    locator: DeviceLocator,
    client: reqwest::Client,
    monitor: AudioMonitor,
    video: Mutex<Option<MjpegStream>>,
}

impl CameraFeed {
    pub fn new(
        config: CameraFeedConfig,
        locator: DeviceLocator,
        monitor: AudioMonitor,
    ) -> Result<Self> {
        // Connect timeout only: the streaming bodies are long-lived and
        // must not be cut by a whole-request deadline.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            config,
            locator,
            client,
            monitor,
            video: Mutex::new(None),
        })
    }

    pub fn locator(&self) -> &DeviceLocator {
        &self.locator
    }

    pub fn monitor(&self) -> &AudioMonitor {
        &self.monitor
    }

    fn auth(&self) -> Option<(&str, &str)> {
        match (&self.config.username, &self.config.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    fn video_url(&self, ip: IpAddr) -> String {
        format!("http://{}{}", ip, self.config.video_path)
    }

    fn audio_url(&self, ip: IpAddr) -> String {
        format!("http://{}{}", ip, self.config.audio_path)
    }

    async fn open_video(&self) -> Result<MjpegStream> {
        let ip = self.locator.get_ip().await?;
        MjpegStream::open(
            &self.client,
            &self.video_url(ip),
            self.auth(),
            Duration::from_secs(self.config.frame_timeout_secs),
        )
        .await
    }

    async fn open_audio(&self) -> Result<AudioChunkStream> {
        let ip = self.locator.get_ip().await?;
        AudioChunkStream::open(
            &self.client,
            &self.audio_url(ip),
            self.auth(),
            self.monitor.config().chunk_bytes(),
        )
        .await
    }

    /// Next decoded video frame.
    ///
    /// Transient failures never surface: a dead stream is dropped, the
    /// device re-resolved and the stream reopened. Only the recovery
    /// ceiling maps to an error.
    pub async fn frame(&self) -> Result<DynamicImage> {
        let mut video = self.video.lock().await;

        for _ in 0..self.config.max_recovery_attempts {
            if video.is_none() {
                match self.open_video().await {
                    Ok(stream) => *video = Some(stream),
                    Err(e) => {
                        tracing::warn!(error = %e, "Video stream open failed, re-resolving");
                        self.locator.invalidate().await;
                        continue;
                    }
                }
            }
            let Some(stream) = video.as_mut() else {
                continue;
            };

            match stream.next_frame().await {
                Ok(Some(jpeg)) => match image::load_from_memory(&jpeg) {
                    Ok(frame) => return Ok(frame),
                    Err(e) => {
                        // Corrupt frame; the stream itself is fine.
                        tracing::debug!(error = %e, "Dropping undecodable frame");
                    }
                },
                Ok(None) => {
                    tracing::warn!("Video stream ended, re-resolving device");
                    *video = None;
                    self.locator.invalidate().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Video stream failed, re-resolving device");
                    *video = None;
                    self.locator.invalidate().await;
                }
            }
        }

        Err(Error::DeviceUnavailable(format!(
            "no video frame after {} recovery attempts",
            self.config.max_recovery_attempts
        )))
    }

    /// Snapshot of the audio history, starting the monitor on first use.
    ///
    /// A dead or persistently silent sampler is torn down and restarted
    /// against a freshly resolved address.
    pub async fn audio_batch(&self) -> Result<Vec<Sample>> {
        for _ in 0..self.config.max_recovery_attempts {
            if !self.monitor.is_running().await {
                match self.open_audio().await {
                    Ok(stream) => {
                        self.monitor.start(stream).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Audio stream open failed, re-resolving");
                        self.locator.invalidate().await;
                        continue;
                    }
                }
                if !self.monitor.is_running().await {
                    // Calibration failed on this stream.
                    self.locator.invalidate().await;
                    continue;
                }
            }

            for _ in 0..AUDIO_POLL_TRIES {
                let batch = self.monitor.batch().await;
                if !batch.is_empty() {
                    return Ok(batch);
                }
                if !self.monitor.is_running().await {
                    break;
                }
                tokio::time::sleep(AUDIO_POLL_INTERVAL).await;
            }

            // Running but silent past patience counts as stale too.
            tracing::warn!("Audio sampler yielded no data, restarting");
            self.monitor.stop().await;
            self.locator.invalidate().await;
        }

        Err(Error::DeviceUnavailable(format!(
            "no audio data after {} recovery attempts",
            self.config.max_recovery_attempts
        )))
    }

    /// Record a fresh audio baseline, blocking until done.
    ///
    /// The running sampler is stopped, the baseline cleared, and a new
    /// stream opened; starting with a cleared baseline performs the
    /// calibration capture before sampling resumes. The sample history
    /// resets with the baseline.
    pub async fn recalibrate(&self) -> Result<f64> {
        self.monitor.stop().await;
        self.monitor.clear_baseline().await;

        for _ in 0..self.config.max_recovery_attempts {
            match self.open_audio().await {
                Ok(stream) => {
                    if self.monitor.start(stream).await {
                        if let Some(db) = self.monitor.baseline().await {
                            return Ok(db);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Audio stream open failed during recalibration");
                }
            }
            self.locator.invalidate().await;
        }

        Err(Error::Calibration(format!(
            "baseline capture failed after {} attempts",
            self.config.max_recovery_attempts
        )))
    }

    /// Stop the audio sampler and drop the video stream.
    pub async fn shutdown(&self) {
        self.monitor.stop().await;
        *self.video.lock().await = None;
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_monitor::AudioMonitorConfig;
    use crate::device_locator::DeviceLocatorConfig;

    fn feed(config: CameraFeedConfig) -> CameraFeed {
        CameraFeed::new(
            config,
            DeviceLocator::new(DeviceLocatorConfig::default()),
            AudioMonitor::new(AudioMonitorConfig::default(), None),
        )
        .unwrap()
    }

    #[test]
    fn endpoint_urls_follow_the_resolved_address() {
        let f = feed(CameraFeedConfig::default());
        let ip: IpAddr = "192.168.1.42".parse().unwrap();
        assert_eq!(f.video_url(ip), "http://192.168.1.42/video.cgi");
        assert_eq!(f.audio_url(ip), "http://192.168.1.42/audio.cgi");
    }

    #[test]
    fn auth_requires_both_credentials() {
        let f = feed(CameraFeedConfig {
            username: Some("admin".to_string()),
            password: None,
            ..Default::default()
        });
        assert!(f.auth().is_none());

        let f = feed(CameraFeedConfig {
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        });
        assert_eq!(f.auth(), Some(("admin", "secret")));
    }
}
