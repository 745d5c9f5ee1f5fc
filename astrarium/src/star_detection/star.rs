//! Star detection result types.

use serde::{Deserialize, Serialize};

/// A detected star with sub-pixel position and quality metrics.
///
/// Stars are value objects; equality for matching purposes is by position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Star {
    /// X coordinate (sub-pixel accurate).
    pub x: f32,
    /// Y coordinate (sub-pixel accurate).
    pub y: f32,
    /// Peak value above background.
    pub intensity: f32,
    /// Detection confidence score. Background-subtracted flux scaled by the
    /// roundness of the blob, so clean round stars outrank marginal ones.
    pub quality: f32,
    /// Second-moment-derived mean radius in pixels.
    pub mean_radius: f32,
}

/// Stars detected in one frame.
pub type StarList = Vec<Star>;

/// Sort stars by descending quality; ties broken by position for
/// deterministic ordering.
pub fn sort_by_quality(stars: &mut [Star]) {
    stars.sort_by(|a, b| {
        b.quality
            .total_cmp(&a.quality)
            .then(a.x.total_cmp(&b.x))
            .then(a.y.total_cmp(&b.y))
    });
}

/// Sort stars by position (row-major), the canonical order for comparisons.
pub fn sort_by_position(stars: &mut [Star]) {
    stars.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));
}
