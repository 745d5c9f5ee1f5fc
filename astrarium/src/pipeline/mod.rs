//! Cancellable worker-thread pipeline.
//!
//! [`PipelineStage`] is the generic state machine (one worker thread, one
//! mutex-guarded job queue, a condition variable and a listener callback);
//! the four [`FrameProcessor`] specializations in [`processors`] plug the
//! stacking algorithms into it, and [`LiveStackPipeline`] wires them into a
//! continuous stacking session.

mod latch;
mod live;
mod processors;
mod stage;

pub use latch::Latch;
pub use live::{LiveStackConfig, LiveStackPipeline, PipelineEvent};
pub use processors::{
    AccumulateJob, AccumulateProcessor, CalibrationProcessor, DarkStackJob, MasterDarkProcessor,
    RegistrationProcessor, SharedMasters, REGISTERED_FLAG,
};
pub use stage::{
    FrameProcessor, PipelineStage, StageHandle, StageListener, StageOutcome, StageState,
};
