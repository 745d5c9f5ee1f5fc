//! Star detection in calibrated luminance images.
//!
//! Pipeline: global background estimate (median) → seed thresholding → blob
//! growth from local maxima with bounding-box cap and saddle stop →
//! intensity-weighted sub-pixel centroid → roundness filter.
//!
//! An empty result is a valid outcome (e.g. a cloudy frame), not an error;
//! callers decide whether it is fatal.

mod background;
mod candidates;
pub(crate) mod config;
pub(crate) mod constants;
pub(crate) mod star;


pub use config::{StarDetectorConfig, ThresholdMode};
pub use star::{Star, StarList, sort_by_position, sort_by_quality};

use crate::astro_image::AstroImage;
use crate::common::Buffer2;

use background::BackgroundEstimate;
use candidates::Region;
use constants::{
    AUTO_TARGET_MAX_STARS, AUTO_TARGET_MIN_STARS, AUTO_THRESHOLD_MAX, AUTO_THRESHOLD_MIN,
    MAX_AUTO_ITERATIONS,
};

/// Star detector.
///
/// In auto-threshold mode the first detection searches for a threshold whose
/// star count lands in the target band and caches it for subsequent frames of
/// the same session, so thresholds stay comparable.
#[derive(Debug, Default)]
pub struct StarDetector {
    config: StarDetectorConfig,
    cached_threshold: Option<f32>,
}

impl StarDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: StarDetectorConfig) -> Self {
        Self {
            config,
            cached_threshold: None,
        }
    }

    pub fn config(&self) -> &StarDetectorConfig {
        &self.config
    }

    /// Threshold percent found by the auto search, if it has run.
    pub fn cached_threshold(&self) -> Option<f32> {
        self.cached_threshold
    }

    /// Forget session state (cached auto threshold).
    pub fn reset(&mut self) {
        self.cached_threshold = None;
    }

    /// Detect stars in a frame.
    ///
    /// Output order is unspecified; sort with [`sort_by_quality`] or
    /// [`sort_by_position`] as needed.
    pub fn detect(&mut self, image: &AstroImage) -> StarList {
        self.config.validate();

        let luma = image.to_luminance();
        let background = BackgroundEstimate::new(&luma);

        let stars = match self.config.threshold {
            ThresholdMode::Fixed(percent) => {
                detect_at_threshold(&luma, &background, percent, &self.config)
            }
            ThresholdMode::Auto => {
                if let Some(percent) = self.cached_threshold {
                    detect_at_threshold(&luma, &background, percent, &self.config)
                } else {
                    let (percent, stars) = auto_threshold_search(&luma, &background, &self.config);
                    tracing::debug!(
                        threshold_percent = f64::from(percent),
                        star_count = stars.len(),
                        "auto-threshold search converged"
                    );
                    self.cached_threshold = Some(percent);
                    stars
                }
            }
        };

        tracing::debug!(star_count = stars.len(), "star detection complete");
        stars
    }
}

/// Run one detection pass at a fixed threshold percent.
fn detect_at_threshold(
    luma: &Buffer2<f32>,
    background: &BackgroundEstimate,
    percent: f32,
    config: &StarDetectorConfig,
) -> StarList {
    let threshold_value = background.threshold_value(percent);
    let regions = candidates::find_regions(luma, background, threshold_value, config);

    regions
        .into_iter()
        .filter_map(|region| measure_region(&region, background, config))
        .collect()
}

/// Bisect the threshold percent until the star count lands in the target
/// band. Returns the closest attempt when the search does not converge.
fn auto_threshold_search(
    luma: &Buffer2<f32>,
    background: &BackgroundEstimate,
    config: &StarDetectorConfig,
) -> (f32, StarList) {
    let mut lo = AUTO_THRESHOLD_MIN;
    let mut hi = AUTO_THRESHOLD_MAX;
    let mut best: Option<(usize, f32, StarList)> = None;

    for _ in 0..MAX_AUTO_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        let stars = detect_at_threshold(luma, background, mid, config);
        let count = stars.len();

        let distance = if count < AUTO_TARGET_MIN_STARS {
            AUTO_TARGET_MIN_STARS - count
        } else if count > AUTO_TARGET_MAX_STARS {
            count - AUTO_TARGET_MAX_STARS
        } else {
            0
        };

        if best.as_ref().is_none_or(|(d, _, _)| distance < *d) {
            best = Some((distance, mid, stars));
        }
        if distance == 0 {
            break;
        }

        if count < AUTO_TARGET_MIN_STARS {
            // Too few stars: lower the threshold
            hi = mid;
        } else {
            // Too many stars: raise the threshold
            lo = mid;
        }
    }

    let (_, percent, stars) = best.expect("auto search runs at least one iteration");
    (percent, stars)
}

/// Compute centroid, mean radius and roundness for one region; apply the
/// size/shape filters.
fn measure_region(
    region: &Region,
    background: &BackgroundEstimate,
    config: &StarDetectorConfig,
) -> Option<Star> {
    if region.truncated || region.pixels.len() < config.min_region_pixels {
        return None;
    }

    let bg = background.background;

    // Intensity-weighted centroid
    let mut weight_sum = 0.0f64;
    let mut cx = 0.0f64;
    let mut cy = 0.0f64;
    for &(x, y, value) in &region.pixels {
        let w = f64::from((value - bg).max(0.0));
        weight_sum += w;
        cx += w * x as f64;
        cy += w * y as f64;
    }
    if weight_sum <= 0.0 {
        return None;
    }
    cx /= weight_sum;
    cy /= weight_sum;

    // Second moments for mean radius and roundness
    let mut mxx = 0.0f64;
    let mut myy = 0.0f64;
    for &(x, y, value) in &region.pixels {
        let w = f64::from((value - bg).max(0.0));
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        mxx += w * dx * dx;
        myy += w * dy * dy;
    }
    mxx /= weight_sum;
    myy /= weight_sum;

    let sigma_x = mxx.sqrt();
    let sigma_y = myy.sqrt();
    if sigma_x < 1e-6 || sigma_y < 1e-6 {
        // Degenerate row/column of pixels: a trail or defect, not a star
        return None;
    }

    let roundness = (sigma_x / sigma_y) as f32;
    let tolerance = config.roundness_tolerance;
    if roundness < 1.0 / tolerance || roundness > tolerance {
        return None;
    }

    let mean_radius = ((mxx + myy) / 2.0).sqrt() as f32;
    let flux = weight_sum as f32;
    let shape_factor = (sigma_x.min(sigma_y) / sigma_x.max(sigma_y)) as f32;

    Some(Star {
        x: cx as f32,
        y: cy as f32,
        intensity: region.peak - bg,
        quality: flux * shape_factor,
        mean_radius,
    })
}
