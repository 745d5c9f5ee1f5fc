//! Convenience re-exports for the common workflow types.

pub use crate::astro_image::{AstroImage, ImageDimensions};
pub use crate::pipeline::{LiveStackPipeline, PipelineEvent, PipelineStage, StageState};
pub use crate::registration::{MatchConfig, Transformation, compute_transformation};
pub use crate::session::SessionManifest;
pub use crate::stacking::FrameStacker;
pub use crate::star_detection::{Star, StarDetector, StarDetectorConfig};
