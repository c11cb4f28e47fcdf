//! AlertEngine - Detector Evaluation and Aggregation
//!
//! ## Responsibilities
//!
//! - Score sample windows into normalized alert levels
//! - Hold per-detector state (level, status, threshold)
//! - Aggregate detector statuses behind one enable/disable gate

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::sample_buffer::Sample;

/// Sliding evaluation window, anchored to the newest sample.
const WINDOW_SECS: i64 = 30;
/// Minimum total history before audio evaluation does anything.
const MIN_AUDIO_SAMPLES: usize = 11;

/// Default audio detector threshold on the [0,1] alert level.
pub const DEFAULT_AUDIO_THRESHOLD: f64 = 0.4;
/// Default motion detector threshold on the mean changed-pixel ratio.
pub const DEFAULT_MOTION_THRESHOLD: f64 = 0.1;

// ============================================================
// Scoring
// ============================================================

/// Audio scoring algorithm, selectable at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStrategy {
    /// Area above the alert point vs. total excursion area.
    AreaRatio,
    /// Fraction of window samples above the alert point.
    PositiveRatio,
}

impl std::str::FromStr for ScoringStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "area_ratio" => Ok(ScoringStrategy::AreaRatio),
            "positive_ratio" => Ok(ScoringStrategy::PositiveRatio),
            other => Err(format!("unknown scoring strategy: {}", other)),
        }
    }
}

/// Trapezoidal area under a level-vs-time polyline. Fewer than two points
/// span no time and contribute nothing.
fn trapezoid_area(points: &[(f64, f64)]) -> f64 {
    points
        .windows(2)
        .map(|w| {
            let (t0, v0) = w[0];
            let (t1, v1) = w[1];
            (t1 - t0) * (v0 + v1) / 2.0
        })
        .sum()
}

/// Share of the window's excursion area spent above the alert point.
///
/// Positive and negative samples each integrate on their own time axis,
/// so sustained excursions outweigh brief spikes of the same height.
/// Result is in [0, 1]; a window with no net area scores 0.
pub fn area_ratio_score(window: &[Sample]) -> f64 {
    let Some(first) = window.first() else {
        return 0.0;
    };
    let secs = |s: &Sample| (s.time - first.time).num_milliseconds() as f64 / 1000.0;

    let above: Vec<(f64, f64)> = window
        .iter()
        .filter(|s| s.level > 0.0)
        .map(|s| (secs(s), s.level))
        .collect();
    let below: Vec<(f64, f64)> = window
        .iter()
        .filter(|s| s.level < 0.0)
        .map(|s| (secs(s), s.level))
        .collect();

    let area_above = trapezoid_area(&above).abs();
    let area_below = trapezoid_area(&below).abs();
    let total = area_above + area_below;
    if total > 0.0 {
        area_above / total
    } else {
        0.0
    }
}

/// Fraction of window samples above the alert point.
pub fn positive_ratio_score(window: &[Sample]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let positive = window.iter().filter(|s| s.level > 0.0).count();
    positive as f64 / window.len() as f64
}

/// Samples within `window` of the newest entry. History is append-ordered,
/// so the newest entry is the last.
fn recent_window(history: &[Sample], window: Duration) -> Vec<Sample> {
    let Some(newest) = history.last() else {
        return Vec::new();
    };
    let cutoff = newest.time - window;
    history.iter().filter(|s| s.time >= cutoff).copied().collect()
}

// ============================================================
// Detectors
// ============================================================

/// Sound alert detector over normalized audio levels.
#[derive(Debug, Clone)]
pub struct AudioDetector {
    threshold: f64,
    strategy: ScoringStrategy,
    alert_level: f64,
    status: bool,
}

impl AudioDetector {
    pub fn new(threshold: f64, strategy: ScoringStrategy) -> Self {
        Self {
            threshold,
            strategy,
            alert_level: 0.0,
            status: false,
        }
    }

    /// Evaluate against the full available history.
    ///
    /// Fewer than `MIN_AUDIO_SAMPLES` total samples is a no-op regardless
    /// of window content: there is too little history to integrate. Once
    /// history is deep enough, an empty window scores zero and clears the
    /// status.
    pub fn evaluate(&mut self, history: &[Sample]) {
        if history.len() < MIN_AUDIO_SAMPLES {
            return;
        }
        let window = recent_window(history, Duration::seconds(WINDOW_SECS));
        if window.is_empty() {
            self.alert_level = 0.0;
            self.status = false;
            return;
        }
        self.alert_level = match self.strategy {
            ScoringStrategy::AreaRatio => area_ratio_score(&window),
            ScoringStrategy::PositiveRatio => positive_ratio_score(&window),
        };
        self.status = self.alert_level > self.threshold;
    }
}

/// Motion alert detector over changed-pixel ratios.
#[derive(Debug, Clone)]
pub struct MotionDetector {
    threshold: f64,
    alert_level: f64,
    status: bool,
}

impl MotionDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            alert_level: 0.0,
            status: false,
        }
    }

    /// Evaluate against the motion history.
    ///
    /// An empty window keeps the previous state, so a stalled or
    /// restarting video feed does not flap the alert.
    pub fn evaluate(&mut self, history: &[Sample]) {
        let window = recent_window(history, Duration::seconds(WINDOW_SECS));
        if window.is_empty() {
            return;
        }
        let mean = window.iter().map(|s| s.level).sum::<f64>() / window.len() as f64;
        self.alert_level = mean;
        self.status = mean > self.threshold;
    }
}

/// One alert source. The aggregator stores these homogeneously and only
/// uses the shared capability surface below.
#[derive(Debug, Clone)]
pub enum Detector {
    Audio(AudioDetector),
    Motion(MotionDetector),
}

impl Detector {
    pub fn audio(threshold: f64, strategy: ScoringStrategy) -> Self {
        Detector::Audio(AudioDetector::new(threshold, strategy))
    }

    pub fn motion(threshold: f64) -> Self {
        Detector::Motion(MotionDetector::new(threshold))
    }

    pub fn evaluate(&mut self, history: &[Sample]) {
        match self {
            Detector::Audio(d) => d.evaluate(history),
            Detector::Motion(d) => d.evaluate(history),
        }
    }

    pub fn alert_level(&self) -> f64 {
        match self {
            Detector::Audio(d) => d.alert_level,
            Detector::Motion(d) => d.alert_level,
        }
    }

    pub fn status(&self) -> bool {
        match self {
            Detector::Audio(d) => d.status,
            Detector::Motion(d) => d.status,
        }
    }

    pub fn threshold(&self) -> f64 {
        match self {
            Detector::Audio(d) => d.threshold,
            Detector::Motion(d) => d.threshold,
        }
    }

    pub fn set_threshold(&mut self, value: f64) {
        match self {
            Detector::Audio(d) => d.threshold = value,
            Detector::Motion(d) => d.threshold = value,
        }
    }

    /// Restore the variant's default threshold (recalibration path).
    pub fn reset_threshold(&mut self) {
        match self {
            Detector::Audio(d) => d.threshold = DEFAULT_AUDIO_THRESHOLD,
            Detector::Motion(d) => d.threshold = DEFAULT_MOTION_THRESHOLD,
        }
    }
}

// ============================================================
// Aggregation
// ============================================================

/// Handle returned at registration; routes sampler batches to their
/// detector without exposing the detector itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorId(usize);

/// Combined alert state over all registered detectors.
#[derive(Debug)]
pub struct AlertAggregator {
    enabled: bool,
    detectors: Vec<Detector>,
}

impl AlertAggregator {
    pub fn new() -> Self {
        Self {
            enabled: true,
            detectors: Vec::new(),
        }
    }

    /// Register a detector. The enum argument is the capability contract:
    /// anything registered evaluates, scores and reports status.
    pub fn add_detector(&mut self, detector: Detector) -> DetectorId {
        self.detectors.push(detector);
        DetectorId(self.detectors.len() - 1)
    }

    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// Feed a sampler batch to one detector.
    pub fn evaluate(&mut self, id: DetectorId, history: &[Sample]) {
        if let Some(d) = self.detectors.get_mut(id.0) {
            d.evaluate(history);
        }
    }

    /// Combined status. Disabled reports false unconditionally; detector
    /// histories keep accumulating underneath.
    pub fn status(&self) -> bool {
        if !self.enabled {
            return false;
        }
        self.detectors.iter().any(|d| d.status())
    }

    /// Highest detector level, 0 with none attached. Not gated on
    /// `enabled`: levels stay observable while alerts are muted.
    pub fn level(&self) -> f64 {
        self.detectors
            .iter()
            .map(|d| d.alert_level())
            .fold(0.0, f64::max)
    }

    pub fn detector_level(&self, id: DetectorId) -> f64 {
        self.detectors.get(id.0).map(|d| d.alert_level()).unwrap_or(0.0)
    }

    pub fn detector_status(&self, id: DetectorId) -> bool {
        self.detectors.get(id.0).map(|d| d.status()).unwrap_or(false)
    }

    pub fn threshold(&self, id: DetectorId) -> Option<f64> {
        self.detectors.get(id.0).map(|d| d.threshold())
    }

    pub fn set_threshold(&mut self, id: DetectorId, value: f64) {
        if let Some(d) = self.detectors.get_mut(id.0) {
            d.set_threshold(value);
        }
    }

    pub fn reset_threshold(&mut self, id: DetectorId) {
        if let Some(d) = self.detectors.get_mut(id.0) {
            d.reset_threshold();
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Flip the gate; returns the new state.
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64, level: f64) -> Sample {
        let time = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        Sample::new(time, level)
    }

    /// History deep enough to clear the cold-start guard, with only the
    /// given samples inside the 30s window.
    fn padded(recent: Vec<Sample>) -> Vec<Sample> {
        let mut history: Vec<Sample> = (0..9).map(|i| at(-500 + i, 1.0)).collect();
        history.extend(recent);
        history
    }

    #[test]
    fn audio_short_history_is_a_no_op() {
        let mut det = AudioDetector::new(DEFAULT_AUDIO_THRESHOLD, ScoringStrategy::AreaRatio);
        det.evaluate(&[at(0, -2.0), at(1, -1.0), at(2, 3.0), at(3, 4.0)]);
        assert_eq!(det.alert_level, 0.0);
        assert!(!det.status);
    }

    #[test]
    fn audio_short_history_preserves_prior_state() {
        let mut det = AudioDetector::new(DEFAULT_AUDIO_THRESHOLD, ScoringStrategy::AreaRatio);
        det.evaluate(&padded(vec![at(0, 1.0), at(10, 1.0)]));
        assert!(det.status);
        let prior_level = det.alert_level;

        det.evaluate(&[at(20, -5.0), at(21, -5.0)]);
        assert_eq!(det.alert_level, prior_level);
        assert!(det.status);
    }

    #[test]
    fn mixed_window_scores_area_fraction() {
        // Negative leg area 1.5, positive leg area 3.5 -> 0.7.
        let mut det = AudioDetector::new(0.4, ScoringStrategy::AreaRatio);
        det.evaluate(&padded(vec![
            at(0, -2.0),
            at(1, -1.0),
            at(2, 3.0),
            at(3, 4.0),
        ]));
        assert!((det.alert_level - 0.7).abs() < 1e-9);
        assert!(det.status);
    }

    #[test]
    fn all_positive_window_scores_one() {
        let mut det = AudioDetector::new(0.4, ScoringStrategy::AreaRatio);
        det.evaluate(&padded(vec![at(0, 2.0), at(1, 3.0), at(2, 2.5)]));
        assert_eq!(det.alert_level, 1.0);
        assert!(det.status);
    }

    #[test]
    fn all_negative_window_scores_zero() {
        let mut det = AudioDetector::new(0.4, ScoringStrategy::AreaRatio);
        det.evaluate(&padded(vec![at(0, -2.0), at(1, -3.0), at(2, -2.5)]));
        assert_eq!(det.alert_level, 0.0);
        assert!(!det.status);
    }

    #[test]
    fn single_point_legs_span_no_area() {
        // One positive and one negative sample: both legs integrate to 0,
        // so the score falls back to 0.
        let mut det = AudioDetector::new(0.4, ScoringStrategy::AreaRatio);
        det.evaluate(&padded(vec![at(0, 5.0), at(1, -5.0)]));
        assert_eq!(det.alert_level, 0.0);
        assert!(!det.status);
    }

    #[test]
    fn samples_outside_window_are_ignored() {
        // The padding at t=-500s is positive; only the in-window negative
        // samples should count.
        let mut det = AudioDetector::new(0.4, ScoringStrategy::AreaRatio);
        det.evaluate(&padded(vec![at(0, -1.0), at(1, -1.0), at(2, -1.0)]));
        assert_eq!(det.alert_level, 0.0);
    }

    #[test]
    fn positive_ratio_counts_samples() {
        let mut det = AudioDetector::new(0.5, ScoringStrategy::PositiveRatio);
        det.evaluate(&padded(vec![
            at(0, 1.0),
            at(1, -1.0),
            at(2, 2.0),
            at(3, -2.0),
            at(4, 3.0),
        ]));
        assert!((det.alert_level - 0.6).abs() < 1e-9);
        assert!(det.status);
    }

    #[test]
    fn motion_mean_over_window() {
        let mut det = MotionDetector::new(0.1);
        det.evaluate(&[at(0, 0.2), at(1, 0.4)]);
        assert!((det.alert_level - 0.3).abs() < 1e-9);
        assert!(det.status);
    }

    #[test]
    fn motion_empty_history_holds_state() {
        let mut det = MotionDetector::new(0.1);
        det.evaluate(&[at(0, 0.5)]);
        assert!(det.status);
        det.evaluate(&[]);
        assert!(det.status);
        assert!((det.alert_level - 0.5).abs() < 1e-9);
    }

    #[test]
    fn aggregator_disabled_reports_false() {
        let mut agg = AlertAggregator::new();
        let id = agg.add_detector(Detector::motion(0.1));
        agg.evaluate(id, &[at(0, 0.9)]);
        assert!(agg.status());

        agg.disable();
        assert!(!agg.status());
        // Levels stay visible while muted.
        assert!((agg.level() - 0.9).abs() < 1e-9);

        agg.enable();
        assert!(agg.status());
    }

    #[test]
    fn aggregator_or_and_max_semantics() {
        let mut agg = AlertAggregator::new();
        let audio = agg.add_detector(Detector::audio(0.4, ScoringStrategy::AreaRatio));
        let motion = agg.add_detector(Detector::motion(0.5));

        // Audio quiet, motion firing.
        agg.evaluate(audio, &padded(vec![at(0, -1.0), at(1, -1.0)]));
        agg.evaluate(motion, &[at(0, 0.8), at(1, 0.8)]);

        assert!(agg.status());
        assert!((agg.level() - 0.8).abs() < 1e-9);
        assert!(!agg.detector_status(audio));
        assert!(agg.detector_status(motion));
    }

    #[test]
    fn aggregator_without_detectors_is_quiet() {
        let agg = AlertAggregator::new();
        assert!(!agg.status());
        assert_eq!(agg.level(), 0.0);
    }

    #[test]
    fn toggle_flips_the_gate() {
        let mut agg = AlertAggregator::new();
        assert!(agg.is_enabled());
        assert!(!agg.toggle());
        assert!(!agg.is_enabled());
        assert!(agg.toggle());
    }

    #[test]
    fn threshold_roundtrip_through_handles() {
        let mut agg = AlertAggregator::new();
        let id = agg.add_detector(Detector::audio(0.4, ScoringStrategy::AreaRatio));
        assert_eq!(agg.threshold(id), Some(0.4));
        agg.set_threshold(id, 0.75);
        assert_eq!(agg.threshold(id), Some(0.75));
        agg.reset_threshold(id);
        assert_eq!(agg.threshold(id), Some(DEFAULT_AUDIO_THRESHOLD));
    }

    #[test]
    fn strategy_parses_from_config_names() {
        assert_eq!(
            "area_ratio".parse::<ScoringStrategy>(),
            Ok(ScoringStrategy::AreaRatio)
        );
        assert_eq!(
            "positive_ratio".parse::<ScoringStrategy>(),
            Ok(ScoringStrategy::PositiveRatio)
        );
        assert!("loudness".parse::<ScoringStrategy>().is_err());
    }
}
