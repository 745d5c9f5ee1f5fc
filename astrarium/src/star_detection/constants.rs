//! Shared constants for star detection.
//!
//! These are empirically tuned values; changing them shifts the star-count
//! and match-rate balance of the whole pipeline, so they are centralized here
//! rather than scattered through the code.

/// Maximum bounding-box side of a star blob in pixels.
///
/// Region growth stops once a blob's bounding box exceeds this size; such
/// regions are extended objects or blended groups, not usable point sources.
pub const STAR_MAX_SIZE: usize = 50;

/// Roundness tolerance for accepting a blob as a star.
///
/// The ratio of the second-moment widths σx/σy must lie within
/// `[1/ROUNDNESS_TOLERANCE, ROUNDNESS_TOLERANCE]`. Filters hot pixels,
/// satellite trails and blended/elongated blobs.
pub const ROUNDNESS_TOLERANCE: f32 = 2.0;

/// Fraction of (peak − background) below which region growth stops.
///
/// Growth over a saddle point between two blended stars is cut off once
/// intensity falls back under `background + SADDLE_FRACTION × (peak − background)`.
pub const SADDLE_FRACTION: f32 = 0.15;

/// Minimum number of pixels in an accepted blob.
///
/// Single-pixel and two-pixel blobs have no meaningful second moments and
/// are almost always sensor defects.
pub const MIN_REGION_PIXELS: usize = 3;

/// Auto-threshold search range, in luminance threshold percent.
pub const AUTO_THRESHOLD_MIN: f32 = 5.0;
pub const AUTO_THRESHOLD_MAX: f32 = 90.0;

/// Target star-count band for the auto-threshold search.
///
/// Enough stars for triangle voting, few enough that the O(n²) pairwise
/// distance stage stays cheap: tens, not hundreds.
pub const AUTO_TARGET_MIN_STARS: usize = 20;
pub const AUTO_TARGET_MAX_STARS: usize = 80;

/// Maximum bisection steps in the auto-threshold search.
pub const MAX_AUTO_ITERATIONS: usize = 12;

/// Maximum number of samples used for the background median estimate.
///
/// Sampling keeps the estimate within a fraction of a percent on large
/// frames without sorting every pixel.
pub const MAX_BACKGROUND_SAMPLES: usize = 100_000;
