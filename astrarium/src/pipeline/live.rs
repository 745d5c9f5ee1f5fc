//! Live stacking pipeline.
//!
//! Composes the four worker stages into a producer/consumer chain for an
//! unbounded stream of incoming frames. Frame N+1 can be detected while
//! frame N is being stacked: every stage runs on its own thread, and a
//! coordinator thread (the single listener consumer) feeds each stage's
//! output filename into the next stage's queue on completion events.
//!
//! Stages never share buffers; only paths travel between threads.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::common::cancel::CancelToken;
use crate::registration::MatchConfig;
use crate::stacking::calibration::CalibrationMasters;
use crate::stacking::{FrameStacker, default_spill_budget};
use crate::star_detection::{StarDetector, StarDetectorConfig};

use super::processors::{
    AccumulateJob, AccumulateProcessor, CalibrationProcessor, DarkStackJob, MasterDarkProcessor,
    RegistrationProcessor, SharedMasters,
};
use super::stage::{PipelineStage, StageHandle, StageListener, StageOutcome};

/// Events delivered to the pipeline owner, in completion order.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The master dark has been combined and installed.
    MasterDarkReady(PathBuf),
    /// A light frame finished calibration.
    FrameCalibrated(PathBuf),
    /// A light frame was registered against the session reference.
    FrameRegistered(PathBuf),
    /// A light frame was warped and added to the stack.
    FrameAccumulated(PathBuf),
    /// A frame dropped out of the pipeline.
    FrameFailed { path: PathBuf, error: String },
    /// The combined stack was written.
    StackCompleted(PathBuf),
    /// The final combine failed (or was cancelled).
    StackFailed(String),
}

/// Configuration for [`LiveStackPipeline`].
#[derive(Debug, Clone)]
pub struct LiveStackConfig {
    /// Directory for spill files and the master dark scratch space.
    pub temp_dir: PathBuf,
    /// Spill byte budget for the out-of-core combines.
    pub max_spill_bytes: u64,
    /// Expected number of light frames (sizes the stacker's row bands).
    pub expected_lights: usize,
    /// Detector used by the registration stage.
    pub detector: StarDetectorConfig,
    /// Star matching parameters.
    pub matching: MatchConfig,
}

impl Default for LiveStackConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("astrarium_live"),
            max_spill_bytes: default_spill_budget(),
            expected_lights: 32,
            detector: StarDetectorConfig::default(),
            matching: MatchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageKind {
    Dark,
    Calibrate,
    Register,
    Accumulate,
}

enum CoordMsg {
    Stage(StageKind, StageOutcome),
    LightQueued,
    Finish(PathBuf),
}

/// Continuous stacking session over four pipeline stages.
pub struct LiveStackPipeline {
    dark_stage: PipelineStage<MasterDarkProcessor>,
    cal_stage: PipelineStage<CalibrationProcessor>,
    reg_stage: PipelineStage<RegistrationProcessor>,
    acc_stage: PipelineStage<AccumulateProcessor>,
    coordinator: Option<JoinHandle<()>>,
    coord_tx: mpsc::Sender<CoordMsg>,
    events_rx: mpsc::Receiver<PipelineEvent>,
    cancel: CancelToken,
}

impl LiveStackPipeline {
    /// Build and start all stages.
    pub fn start(config: LiveStackConfig) -> Self {
        let masters: SharedMasters = Arc::new(Mutex::new(CalibrationMasters::default()));
        let (coord_tx, coord_rx) = mpsc::channel::<CoordMsg>();
        let (event_tx, events_rx) = mpsc::channel::<PipelineEvent>();

        let listener_for = |kind: StageKind| -> StageListener {
            let tx = coord_tx.clone();
            Arc::new(move |outcome: &StageOutcome| {
                let _ = tx.send(CoordMsg::Stage(kind, outcome.clone()));
            })
        };

        let mut dark_stage = PipelineStage::new(
            MasterDarkProcessor::new(
                Arc::clone(&masters),
                config.temp_dir.clone(),
                config.max_spill_bytes,
            ),
            listener_for(StageKind::Dark),
        );
        let mut cal_stage = PipelineStage::new(
            CalibrationProcessor::new(Arc::clone(&masters)),
            listener_for(StageKind::Calibrate),
        );
        let mut reg_stage = PipelineStage::new(
            RegistrationProcessor::new(
                StarDetector::from_config(config.detector.clone()),
                config.matching,
            ),
            listener_for(StageKind::Register),
        );

        let accumulate = AccumulateProcessor::new(FrameStacker::new(
            config.expected_lights,
            &config.temp_dir,
            config.max_spill_bytes,
        ));
        let cancel = accumulate.cancel_token();
        let mut acc_stage = PipelineStage::new(accumulate, listener_for(StageKind::Accumulate))
            .with_cancel_token(cancel.clone());

        dark_stage.start();
        cal_stage.start();
        reg_stage.start();
        acc_stage.start();

        let coordinator = Some(spawn_coordinator(
            coord_rx,
            event_tx,
            reg_stage.handle(),
            acc_stage.handle(),
        ));

        Self {
            dark_stage,
            cal_stage,
            reg_stage,
            acc_stage,
            coordinator,
            coord_tx,
            events_rx,
            cancel,
        }
    }

    /// Queue dark frames for master-dark combination.
    ///
    /// Calibration only uses the master once [`PipelineEvent::MasterDarkReady`]
    /// has been observed; lights pushed earlier pass through uncalibrated.
    pub fn push_darks(&self, darks: Vec<PathBuf>, master_output: PathBuf) -> bool {
        self.dark_stage.enqueue([DarkStackJob {
            darks,
            output: master_output,
        }])
    }

    /// Queue one light frame for calibration → registration → accumulation.
    pub fn push_light(&self, light: PathBuf) -> bool {
        if self.coord_tx.send(CoordMsg::LightQueued).is_err() {
            return false;
        }
        self.cal_stage.enqueue([light])
    }

    /// Request the final combine once every pushed light has settled.
    pub fn finish(&self, output: PathBuf) -> bool {
        self.coord_tx.send(CoordMsg::Finish(output)).is_ok()
    }

    /// Next pipeline event; None when the pipeline has terminated.
    pub fn next_event(&self) -> Option<PipelineEvent> {
        self.events_rx.recv().ok()
    }

    /// Block until the stack completes or fails.
    pub fn wait_for_result(&self) -> Result<PathBuf, String> {
        loop {
            match self.next_event() {
                Some(PipelineEvent::StackCompleted(path)) => return Ok(path),
                Some(PipelineEvent::StackFailed(error)) => return Err(error),
                Some(_) => continue,
                None => return Err("pipeline terminated without a result".to_string()),
            }
        }
    }

    /// Cooperatively cancel all stages and any in-flight combine.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.dark_stage.cancel();
        self.cal_stage.cancel();
        self.reg_stage.cancel();
        self.acc_stage.cancel();
    }

    /// Gracefully drain and tear down all threads.
    pub fn shutdown(self) {
        let Self {
            mut dark_stage,
            mut cal_stage,
            mut reg_stage,
            mut acc_stage,
            coordinator,
            coord_tx,
            events_rx: _events_rx,
            cancel: _cancel,
        } = self;

        dark_stage.stop();
        cal_stage.stop();
        reg_stage.stop();
        acc_stage.stop();
        dark_stage.join();
        cal_stage.join();
        reg_stage.join();
        acc_stage.join();

        // Dropping the stages drops their listener senders; with coord_tx
        // gone too, the coordinator's channel closes and it exits
        drop(coord_tx);
        drop(dark_stage);
        drop(cal_stage);
        drop(reg_stage);
        drop(acc_stage);

        if let Some(handle) = coordinator
            && handle.join().is_err()
        {
            tracing::error!("pipeline coordinator thread panicked");
        }
    }
}

/// The single consumer of all stage listeners: routes completions into the
/// next stage's queue and forwards events to the pipeline owner.
fn spawn_coordinator(
    coord_rx: mpsc::Receiver<CoordMsg>,
    event_tx: mpsc::Sender<PipelineEvent>,
    reg_handle: StageHandle<PathBuf>,
    acc_handle: StageHandle<AccumulateJob>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("stack-coordinator".to_string())
        .spawn(move || {
            let mut lights_queued = 0usize;
            let mut lights_settled = 0usize;
            let mut finish_output: Option<PathBuf> = None;
            let mut combine_output: Option<PathBuf> = None;

            while let Ok(msg) = coord_rx.recv() {
                match msg {
                    CoordMsg::LightQueued => lights_queued += 1,
                    CoordMsg::Finish(output) => finish_output = Some(output),
                    CoordMsg::Stage(kind, outcome) => {
                        let done = route_outcome(
                            kind,
                            outcome,
                            &event_tx,
                            &reg_handle,
                            &acc_handle,
                            &mut lights_settled,
                            combine_output.as_deref(),
                        );
                        if done {
                            return;
                        }
                    }
                }

                // All pushed lights settled and a finish was requested:
                // trigger the final combine exactly once
                if combine_output.is_none()
                    && lights_settled >= lights_queued
                    && let Some(output) = finish_output.take()
                {
                    tracing::info!(lights = lights_queued, "triggering final combine");
                    acc_handle.enqueue([AccumulateJob::Combine {
                        output: output.clone(),
                    }]);
                    combine_output = Some(output);
                }
            }
        })
        .expect("failed to spawn coordinator thread")
}

/// Handle one stage completion. Returns true when the pipeline is done.
fn route_outcome(
    kind: StageKind,
    outcome: StageOutcome,
    event_tx: &mpsc::Sender<PipelineEvent>,
    reg_handle: &StageHandle<PathBuf>,
    acc_handle: &StageHandle<AccumulateJob>,
    lights_settled: &mut usize,
    combine_output: Option<&std::path::Path>,
) -> bool {
    let event = match (kind, outcome) {
        (StageKind::Dark, StageOutcome::Completed { output: Some(path), .. }) => {
            PipelineEvent::MasterDarkReady(path)
        }
        (StageKind::Dark, StageOutcome::Completed { .. }) => return false,
        (StageKind::Calibrate, StageOutcome::Completed { output: Some(path), .. }) => {
            reg_handle.enqueue([path.clone()]);
            PipelineEvent::FrameCalibrated(path)
        }
        (StageKind::Register, StageOutcome::Completed { output: Some(path), .. }) => {
            acc_handle.enqueue([AccumulateJob::Add(path.clone())]);
            PipelineEvent::FrameRegistered(path)
        }
        (StageKind::Accumulate, StageOutcome::Completed { input, output }) => match output {
            Some(path) => {
                let _ = event_tx.send(PipelineEvent::StackCompleted(path));
                return true;
            }
            None => {
                *lights_settled += 1;
                PipelineEvent::FrameAccumulated(input)
            }
        },
        (StageKind::Accumulate, StageOutcome::Failed { input, error })
            if combine_output == Some(input.as_path()) =>
        {
            let _ = event_tx.send(PipelineEvent::StackFailed(error));
            return true;
        }
        (_, StageOutcome::Failed { input, error }) => {
            if kind != StageKind::Dark {
                *lights_settled += 1;
            }
            tracing::warn!(frame = %input.display(), error = %error, "frame dropped from pipeline");
            PipelineEvent::FrameFailed { path: input, error }
        }
        (_, StageOutcome::Completed { .. }) => return false,
    };

    let _ = event_tx.send(event);
    false
}
