//! MotionSampler - Frame Differencing
//!
//! ## Responsibilities
//!
//! - Convert frames to blurred grayscale
//! - Diff consecutive frames and score the changed-pixel ratio
//! - Keep a bounded history of motion samples

use image::{imageops, DynamicImage, GrayImage};

use crate::sample_buffer::{Sample, SampleBuffer};

/// Per-pixel delta (0-255) above which a pixel counts as changed.
const PIXEL_DELTA: u8 = 25;
/// Gaussian blur sigma applied before differencing, to suppress sensor noise.
const BLUR_SIGMA: f32 = 1.5;
/// History capacity: ~10 minutes at a nominal 4 fps.
const HISTORY_CAPACITY: usize = 600 * 4;

/// Synchronous per-frame motion scorer.
///
/// Driven by the acquisition loop; one sample per frame after the first.
pub struct MotionSampler {
    prev: Option<GrayImage>,
    buffer: SampleBuffer,
}

impl MotionSampler {
    pub fn new() -> Self {
        Self {
            prev: None,
            buffer: SampleBuffer::new(HISTORY_CAPACITY),
        }
    }

    /// Ingest one frame. Returns the changed-pixel ratio, or `None` for
    /// the first frame (or after a resolution change), which only seeds
    /// the differencer.
    pub fn ingest(&mut self, frame: &DynamicImage) -> Option<f64> {
        let gray = imageops::blur(&frame.to_luma8(), BLUR_SIGMA);

        let ratio = match &self.prev {
            Some(prev) if prev.dimensions() == gray.dimensions() => {
                let total = (gray.width() * gray.height()) as f64;
                let changed = prev
                    .as_raw()
                    .iter()
                    .zip(gray.as_raw().iter())
                    .filter(|&(a, b)| a.abs_diff(*b) > PIXEL_DELTA)
                    .count();
                Some(changed as f64 / total)
            }
            _ => None,
        };

        self.prev = Some(gray);
        if let Some(ratio) = ratio {
            self.buffer.push(Sample::now(ratio));
        }
        ratio
    }

    /// Snapshot of the motion history, oldest first.
    pub fn samples(&self) -> Vec<Sample> {
        self.buffer.snapshot()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop the history and the seeded previous frame.
    pub fn reset(&mut self) {
        self.prev = None;
        self.buffer.clear();
    }
}

impl Default for MotionSampler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_frame(width: u32, height: u32, lum: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, image::Luma([lum])))
    }

    #[test]
    fn first_frame_seeds_without_sampling() {
        let mut sampler = MotionSampler::new();
        assert_eq!(sampler.ingest(&flat_frame(20, 20, 0)), None);
        assert!(sampler.is_empty());
    }

    #[test]
    fn identical_frames_score_zero() {
        let mut sampler = MotionSampler::new();
        sampler.ingest(&flat_frame(20, 20, 128));
        let ratio = sampler.ingest(&flat_frame(20, 20, 128)).unwrap();
        assert_eq!(ratio, 0.0);
        assert_eq!(sampler.len(), 1);
    }

    #[test]
    fn full_change_scores_near_one() {
        let mut sampler = MotionSampler::new();
        sampler.ingest(&flat_frame(20, 20, 0));
        let ratio = sampler.ingest(&flat_frame(20, 20, 255)).unwrap();
        assert!(ratio > 0.9, "ratio was {ratio}");
    }

    #[test]
    fn small_luminance_shift_is_noise() {
        let mut sampler = MotionSampler::new();
        sampler.ingest(&flat_frame(20, 20, 100));
        let ratio = sampler.ingest(&flat_frame(20, 20, 110)).unwrap();
        assert_eq!(ratio, 0.0);
    }

    #[test]
    fn resolution_change_reseeds() {
        let mut sampler = MotionSampler::new();
        sampler.ingest(&flat_frame(20, 20, 0));
        assert_eq!(sampler.ingest(&flat_frame(40, 30, 255)), None);
        assert!(sampler.is_empty());
        // Next frame at the new resolution diffs normally again.
        assert!(sampler.ingest(&flat_frame(40, 30, 255)).is_some());
    }

    #[test]
    fn reset_drops_history_and_seed() {
        let mut sampler = MotionSampler::new();
        sampler.ingest(&flat_frame(20, 20, 0));
        sampler.ingest(&flat_frame(20, 20, 255));
        sampler.reset();
        assert!(sampler.is_empty());
        assert_eq!(sampler.ingest(&flat_frame(20, 20, 0)), None);
    }
}
