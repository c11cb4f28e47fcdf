//! SampleBuffer - Timestamped Level History (Ring Buffer)
//!
//! ## Responsibilities
//!
//! - Store level samples from the audio and motion samplers
//! - Evict oldest samples at capacity
//! - Provide windowed snapshots for detector evaluation

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One observation from a sampler.
///
/// Audio samplers store dB relative to (baseline + threshold), signed.
/// Motion samplers store the changed-pixel ratio in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub level: f64,
}

impl Sample {
    pub fn new(time: DateTime<Utc>, level: f64) -> Self {
        Self { time, level }
    }

    pub fn now(level: f64) -> Self {
        Self {
            time: Utc::now(),
            level,
        }
    }
}

/// Bounded ring buffer of samples.
///
/// Single-writer, append-only. Owners that share it across tasks wrap it
/// in `tokio::sync::RwLock`; reads hand out owned snapshots so callers
/// never hold the lock while evaluating.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
        }
    }

    /// Append a sample, evicting the oldest at capacity.
    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Samples whose timestamp falls within `window` of the newest sample.
    ///
    /// The window is anchored to the newest sample, not the wall clock, so
    /// a stalled producer still yields its tail. Empty buffer yields an
    /// empty vec.
    pub fn recent(&self, window: Duration) -> Vec<Sample> {
        let Some(newest) = self.samples.back() else {
            return Vec::new();
        };
        let cutoff = newest.time - window;
        self.samples
            .iter()
            .filter(|s| s.time >= cutoff)
            .copied()
            .collect()
    }

    /// Full copy, oldest first.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

// ============================================================
// Tests
// ============================================================
