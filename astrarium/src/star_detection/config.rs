//! Star detector configuration.

use super::constants::{MIN_REGION_PIXELS, ROUNDNESS_TOLERANCE, SADDLE_FRACTION, STAR_MAX_SIZE};

/// How the detection threshold is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdMode {
    /// Fixed luminance threshold percent in [0, 100]: a pixel is a candidate
    /// seed when it exceeds `background + percent/100 × (max − background)`.
    Fixed(f32),
    /// Search for a threshold that lands the star count in the target band;
    /// the found value is cached and reused for the rest of the session so
    /// thresholds stay comparable across frames.
    Auto,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StarDetectorConfig {
    /// Threshold selection mode.
    pub threshold: ThresholdMode,
    /// Maximum bounding-box side of a star blob in pixels.
    pub max_star_size: usize,
    /// Accepted σx/σy band is `[1/roundness_tolerance, roundness_tolerance]`.
    pub roundness_tolerance: f32,
    /// Region growth stops below `background + saddle_fraction × (peak − background)`.
    pub saddle_fraction: f32,
    /// Minimum pixels per accepted blob.
    pub min_region_pixels: usize,
}

impl Default for StarDetectorConfig {
    fn default() -> Self {
        Self {
            threshold: ThresholdMode::Auto,
            max_star_size: STAR_MAX_SIZE,
            roundness_tolerance: ROUNDNESS_TOLERANCE,
            saddle_fraction: SADDLE_FRACTION,
            min_region_pixels: MIN_REGION_PIXELS,
        }
    }
}

impl StarDetectorConfig {
    /// Fixed-threshold configuration.
    pub fn with_threshold_percent(percent: f32) -> Self {
        Self {
            threshold: ThresholdMode::Fixed(percent),
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self) {
        if let ThresholdMode::Fixed(percent) = self.threshold {
            assert!(
                (0.0..=100.0).contains(&percent),
                "threshold percent must be in [0, 100]"
            );
        }
        assert!(self.max_star_size >= 3, "max star size too small");
        assert!(
            self.roundness_tolerance >= 1.0,
            "roundness tolerance must be >= 1"
        );
        assert!(
            (0.0..1.0).contains(&self.saddle_fraction),
            "saddle fraction must be in [0, 1)"
        );
    }
}
