//! Astrarium - astrophotography stacking core.
//!
//! This library implements the numerically and concurrently hard parts of a
//! live image-stacking pipeline:
//! - Star detection in calibrated luminance images
//! - Geometric frame-to-frame matching (triangle voting + least squares)
//! - Out-of-core median combination under a bounded memory budget
//! - Cancellable worker-thread pipeline stages for continuous stacking
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use astrarium::{AstroImage, StarDetector, MatchConfig, compute_transformation};
//!
//! let reference = AstroImage::from_file("light_001.astr")?;
//! let target = AstroImage::from_file("light_002.astr")?;
//!
//! let mut detector = StarDetector::new();
//! let ref_stars = detector.detect(&reference);
//! let target_stars = detector.detect(&target);
//!
//! let transform = compute_transformation(
//!     &ref_stars,
//!     &target_stars,
//!     reference.dimensions(),
//!     &MatchConfig::default(),
//! )?;
//! println!("offset: {}", transform.translation());
//! ```

mod astro_image;
pub(crate) mod common;
pub(crate) mod math;
pub mod pipeline;
pub(crate) mod registration;
pub mod session;
pub(crate) mod stacking;
pub(crate) mod star_detection;

#[cfg(test)]
pub(crate) mod testing;

pub mod prelude;

// ============================================================================
// Core image types
// ============================================================================

pub use astro_image::hot_pixels::{DEFAULT_HOT_PIXEL_SIGMA, HotPixelMap};
pub use astro_image::sidecar::FrameSidecar;
pub use astro_image::{AstroImage, AstroImageMetadata, ImageDimensions, StorageError};
pub use common::cancel::CancelToken;

// ============================================================================
// Star detection
// ============================================================================

pub use star_detection::{
    Star, StarDetector, StarDetectorConfig, StarList, ThresholdMode, sort_by_position,
    sort_by_quality,
};

// ============================================================================
// Registration
// ============================================================================

pub use registration::{
    MatchConfig, RegistrationError, Transformation, compute_transformation, warp_into_reference,
};

// ============================================================================
// Stacking & calibration
// ============================================================================

pub use stacking::calibration::CalibrationMasters;
pub use stacking::{
    Error as StackingError, FrameStacker, FrameType, PartFile, default_spill_budget,
};

// ============================================================================
// Pipeline
// ============================================================================

pub use pipeline::{
    AccumulateJob, AccumulateProcessor, CalibrationProcessor, DarkStackJob, FrameProcessor,
    Latch, LiveStackPipeline, MasterDarkProcessor, PipelineEvent, PipelineStage,
    RegistrationProcessor, StageHandle, StageListener, StageOutcome, StageState,
};
