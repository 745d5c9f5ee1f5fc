//! The four stage specializations.
//!
//! All follow the same worker shape from [`super::stage`], differing only in
//! what one unit of work means. Jobs carry file paths, never live pixel
//! buffers: a stage that receives a path reads the file itself, so no buffer
//! is ever aliased across stage threads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::astro_image::AstroImage;
use crate::astro_image::sidecar::FrameSidecar;
use crate::registration::{MatchConfig, Transformation, compute_transformation, warp_into_reference};
use crate::stacking::FrameStacker;
use crate::stacking::calibration::CalibrationMasters;
use crate::star_detection::{StarDetector, StarList};

use super::stage::{FrameProcessor, StageOutcome};

/// Masters shared between the dark stage (producer) and the calibration
/// stage (consumer).
pub type SharedMasters = Arc<Mutex<CalibrationMasters>>;

/// Sidecar flag set by the registration stage.
pub const REGISTERED_FLAG: &str = "registered";

fn completed(input: impl Into<PathBuf>, output: Option<PathBuf>) -> StageOutcome {
    StageOutcome::Completed {
        input: input.into(),
        output,
    }
}

fn failed(input: impl Into<PathBuf>, error: impl ToString) -> StageOutcome {
    StageOutcome::Failed {
        input: input.into(),
        error: error.to_string(),
    }
}

/// Output path for a processed frame: `name.astr` → `name.<tag>.astr`.
fn tagged_path(path: &Path, tag: &str) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("frame");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("astr");
    path.with_file_name(format!("{stem}.{tag}.{ext}"))
}

// ============================================================================
// Master dark combination
// ============================================================================

/// Combine a set of dark frames into a master dark.
#[derive(Debug, Clone)]
pub struct DarkStackJob {
    /// Dark frame files to combine.
    pub darks: Vec<PathBuf>,
    /// Where the master dark is written.
    pub output: PathBuf,
}

pub struct MasterDarkProcessor {
    masters: SharedMasters,
    temp_dir: PathBuf,
    max_spill_bytes: u64,
}

impl MasterDarkProcessor {
    pub fn new(masters: SharedMasters, temp_dir: impl Into<PathBuf>, max_spill_bytes: u64) -> Self {
        Self {
            masters,
            temp_dir: temp_dir.into(),
            max_spill_bytes,
        }
    }

    fn combine(&mut self, job: &DarkStackJob) -> Result<Option<PathBuf>, String> {
        let mut frames = Vec::with_capacity(job.darks.len());
        for path in &job.darks {
            frames.push(AstroImage::from_file(path).map_err(|e| e.to_string())?);
        }

        let combined =
            CalibrationMasters::combine_darks(&frames, &self.temp_dir, self.max_spill_bytes)
                .map_err(|e| e.to_string())?;

        let written = if let Some(master) = &combined.master_dark {
            master.save_to_file(&job.output).map_err(|e| e.to_string())?;

            let mut sidecar = FrameSidecar::default();
            if let Some(map) = &combined.hot_pixel_map {
                sidecar.hot_pixels = Some(map.coords().to_vec());
            }
            sidecar.save(&job.output).map_err(|e| e.to_string())?;
            Some(job.output.clone())
        } else {
            None
        };

        *self.masters.lock() = combined;
        Ok(written)
    }
}

impl FrameProcessor for MasterDarkProcessor {
    type Job = DarkStackJob;

    fn name(&self) -> &'static str {
        "master-dark"
    }

    fn process(&mut self, job: DarkStackJob) -> StageOutcome {
        let output = job.output.clone();
        match self.combine(&job) {
            Ok(written) => completed(&output, written),
            Err(error) => failed(&output, error),
        }
    }

    fn reset(&mut self) {
        *self.masters.lock() = CalibrationMasters::default();
    }
}

impl std::fmt::Debug for MasterDarkProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterDarkProcessor")
            .field("temp_dir", &self.temp_dir)
            .field("max_spill_bytes", &self.max_spill_bytes)
            .finish()
    }
}

// ============================================================================
// Per-frame calibration
// ============================================================================

/// Subtracts the master dark and fixes hot pixels; writes `<name>.cal.astr`.
///
/// Lights arriving before a master dark is installed pass through
/// uncalibrated (logged), so a session without darks still stacks.
pub struct CalibrationProcessor {
    masters: SharedMasters,
}

impl CalibrationProcessor {
    pub fn new(masters: SharedMasters) -> Self {
        Self { masters }
    }

    fn calibrate(&self, light_path: &Path) -> Result<PathBuf, String> {
        let mut frame = AstroImage::from_file(light_path).map_err(|e| e.to_string())?;

        {
            let masters = self.masters.lock();
            if masters.is_empty() {
                tracing::warn!(frame = %light_path.display(), "no master dark installed, frame passes through uncalibrated");
            }
            masters.calibrate(&mut frame);
        }

        let output = tagged_path(light_path, "cal");
        frame.save_to_file(&output).map_err(|e| e.to_string())?;

        let mut sidecar = FrameSidecar::default();
        sidecar.set_flag("calibrated", true);
        sidecar.save(&output).map_err(|e| e.to_string())?;

        Ok(output)
    }
}

impl FrameProcessor for CalibrationProcessor {
    type Job = PathBuf;

    fn name(&self) -> &'static str {
        "calibrate"
    }

    fn process(&mut self, job: PathBuf) -> StageOutcome {
        match self.calibrate(&job) {
            Ok(output) => completed(job, Some(output)),
            Err(error) => failed(job, error),
        }
    }
}

// ============================================================================
// Per-frame registration
// ============================================================================

/// Detects stars and computes the transform against the session reference.
///
/// The first frame with enough stars becomes the reference (identity
/// transform); every later frame is matched against its star list. Stars,
/// the transform and the "registered" flag are written to the frame sidecar.
pub struct RegistrationProcessor {
    detector: StarDetector,
    match_config: MatchConfig,
    reference: Option<(PathBuf, StarList)>,
}

impl RegistrationProcessor {
    pub fn new(detector: StarDetector, match_config: MatchConfig) -> Self {
        Self {
            detector,
            match_config,
            reference: None,
        }
    }

    /// The session reference frame, once one is established.
    pub fn reference_path(&self) -> Option<&Path> {
        self.reference.as_ref().map(|(p, _)| p.as_path())
    }

    fn register(&mut self, frame_path: &Path) -> Result<Transformation, String> {
        let frame = AstroImage::from_file(frame_path).map_err(|e| e.to_string())?;
        let stars = self.detector.detect(&frame);
        if stars.len() < 3 {
            return Err(format!(
                "only {} stars detected, at least 3 required for registration",
                stars.len()
            ));
        }

        let transformation = match &self.reference {
            None => {
                let dims = frame.dimensions();
                self.reference = Some((frame_path.to_path_buf(), stars.clone()));
                tracing::info!(frame = %frame_path.display(), stars = stars.len(), "reference frame established");
                Transformation::identity(dims.width as f64, dims.height as f64)
            }
            Some((_, reference_stars)) => compute_transformation(
                reference_stars,
                &stars,
                frame.dimensions(),
                &self.match_config,
            )
            .map_err(|e| e.to_string())?,
        };

        let mut sidecar = FrameSidecar::load_or_default(frame_path).map_err(|e| e.to_string())?;
        sidecar.stars = Some(stars);
        sidecar.transformation = Some(transformation);
        sidecar.set_flag(REGISTERED_FLAG, true);
        sidecar.save(frame_path).map_err(|e| e.to_string())?;

        Ok(transformation)
    }
}

impl FrameProcessor for RegistrationProcessor {
    type Job = PathBuf;

    fn name(&self) -> &'static str {
        "register"
    }

    fn process(&mut self, job: PathBuf) -> StageOutcome {
        match self.register(&job) {
            Ok(_) => completed(job.clone(), Some(job)),
            Err(error) => failed(job, error),
        }
    }

    fn reset(&mut self) {
        // A reset starts a new registration session: new reference frame,
        // fresh auto-threshold search
        self.reference = None;
        self.detector.reset();
    }
}

// ============================================================================
// Frame accumulation / stacking
// ============================================================================

/// Accumulation stage work.
#[derive(Debug, Clone)]
pub enum AccumulateJob {
    /// Warp a registered frame into the reference system and add it to the
    /// stack.
    Add(PathBuf),
    /// Combine everything accumulated so far and write the result.
    Combine { output: PathBuf },
}

/// Warps registered frames by their sidecar transform and feeds the
/// out-of-core median stacker.
pub struct AccumulateProcessor {
    stacker: FrameStacker,
}

impl AccumulateProcessor {
    pub fn new(stacker: FrameStacker) -> Self {
        Self { stacker }
    }

    /// Token aborting an in-flight combine.
    pub fn cancel_token(&self) -> crate::common::cancel::CancelToken {
        self.stacker.cancel_token()
    }

    fn add(&mut self, frame_path: &Path) -> Result<(), String> {
        let sidecar = FrameSidecar::load_or_default(frame_path).map_err(|e| e.to_string())?;
        if !sidecar.flag(REGISTERED_FLAG) {
            return Err("frame has not been registered".to_string());
        }
        let transformation = sidecar
            .transformation
            .ok_or_else(|| "frame sidecar carries no transformation".to_string())?;

        let frame = AstroImage::from_file(frame_path).map_err(|e| e.to_string())?;
        let warped = warp_into_reference(&frame, &transformation);
        self.stacker.add_frame(&warped).map_err(|e| e.to_string())
    }

    fn combine(&mut self, output: &Path) -> Result<(), String> {
        match self.stacker.process().map_err(|e| e.to_string())? {
            Some(combined) => {
                combined.save_to_file(output).map_err(|e| e.to_string())?;
                tracing::info!(output = %output.display(), "stack combined");
                Ok(())
            }
            None => Err("stack combination was cancelled".to_string()),
        }
    }
}

impl FrameProcessor for AccumulateProcessor {
    type Job = AccumulateJob;

    fn name(&self) -> &'static str {
        "accumulate"
    }

    fn process(&mut self, job: AccumulateJob) -> StageOutcome {
        match job {
            AccumulateJob::Add(path) => match self.add(&path) {
                Ok(()) => completed(path, None),
                Err(error) => failed(path, error),
            },
            AccumulateJob::Combine { output } => match self.combine(&output) {
                Ok(()) => completed(&output, Some(output.clone())),
                Err(error) => failed(&output, error),
            },
        }
    }

    fn reset(&mut self) {
        self.stacker.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro_image::ImageDimensions;
    use crate::star_detection::StarDetectorConfig;
    use crate::testing::{render_star_field, scattered_positions, test_dir};

    fn write_star_frame(dir: &Path, name: &str, seed: u64, offset: glam::DVec2) -> PathBuf {
        let dims = ImageDimensions::new(256, 256, 1);
        let positions: Vec<glam::DVec2> = scattered_positions(25, 200.0, 200.0, 14.0, seed)
            .into_iter()
            .map(|p| p + glam::DVec2::new(14.0, 14.0) + offset)
            .collect();
        let frame = render_star_field(dims, &positions, 1.4);
        let path = dir.join(name);
        frame.save_to_file(&path).unwrap();
        path
    }

    fn registration_processor() -> RegistrationProcessor {
        RegistrationProcessor::new(
            StarDetector::from_config(StarDetectorConfig::with_threshold_percent(20.0)),
            MatchConfig::default(),
        )
    }

    #[test]
    fn test_registration_first_frame_becomes_reference() {
        let dir = test_dir("proc_reg_reference");
        let frame = write_star_frame(&dir, "light_000.astr", 50, glam::DVec2::ZERO);

        let mut processor = registration_processor();
        let outcome = processor.process(frame.clone());
        assert!(outcome.is_success());
        assert_eq!(processor.reference_path(), Some(frame.as_path()));

        let sidecar = FrameSidecar::load_or_default(&frame).unwrap();
        assert!(sidecar.flag(REGISTERED_FLAG));
        let t = sidecar.transformation.unwrap();
        assert_eq!(t, Transformation::identity(256.0, 256.0));
        assert!(sidecar.stars.unwrap().len() >= 20);
    }

    #[test]
    fn test_registration_second_frame_matches_reference() {
        let dir = test_dir("proc_reg_match");
        let offset = glam::DVec2::new(9.0, -6.0);
        let reference = write_star_frame(&dir, "light_000.astr", 60, glam::DVec2::ZERO);
        let shifted = write_star_frame(&dir, "light_001.astr", 60, offset);

        let mut processor = registration_processor();
        assert!(processor.process(reference).is_success());
        assert!(processor.process(shifted.clone()).is_success());

        let sidecar = FrameSidecar::load_or_default(&shifted).unwrap();
        let t = sidecar.transformation.unwrap();
        let recovered = t.translation();
        assert!((recovered.x - offset.x).abs() < 0.1, "dx = {}", recovered.x);
        assert!((recovered.y - offset.y).abs() < 0.1, "dy = {}", recovered.y);
    }

    #[test]
    fn test_registration_starless_frame_fails() {
        let dir = test_dir("proc_reg_starless");
        let dims = ImageDimensions::new(64, 64, 1);
        let path = dir.join("cloudy.astr");
        AstroImage::new_filled(dims, 0.1).save_to_file(&path).unwrap();

        let mut processor = registration_processor();
        let outcome = processor.process(path);
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_registration_reset_clears_reference() {
        let dir = test_dir("proc_reg_reset");
        let frame = write_star_frame(&dir, "light_000.astr", 70, glam::DVec2::ZERO);

        let mut processor = registration_processor();
        assert!(processor.process(frame).is_success());
        assert!(processor.reference_path().is_some());

        processor.reset();
        assert!(processor.reference_path().is_none());
    }

    #[test]
    fn test_accumulate_requires_registration() {
        let dir = test_dir("proc_acc_unregistered");
        let dims = ImageDimensions::new(32, 32, 1);
        let path = dir.join("raw.astr");
        AstroImage::new_filled(dims, 0.5).save_to_file(&path).unwrap();

        let stacker = FrameStacker::new(2, &dir, 1 << 20);
        let mut processor = AccumulateProcessor::new(stacker);
        let outcome = processor.process(AccumulateJob::Add(path));
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_accumulate_and_combine() {
        let dir = test_dir("proc_acc_combine");
        let dims = ImageDimensions::new(32, 32, 1);

        // Three registered identity frames with constant values 1/3/2
        for (i, value) in [1.0f32, 3.0, 2.0].iter().enumerate() {
            let path = dir.join(format!("light_{i:03}.astr"));
            AstroImage::new_filled(dims, *value).save_to_file(&path).unwrap();

            let mut sidecar = FrameSidecar::default();
            sidecar.transformation = Some(Transformation::identity(32.0, 32.0));
            sidecar.set_flag(REGISTERED_FLAG, true);
            sidecar.save(&path).unwrap();
        }

        let stacker = FrameStacker::new(3, &dir, 1 << 20);
        let mut processor = AccumulateProcessor::new(stacker);
        for i in 0..3 {
            let outcome =
                processor.process(AccumulateJob::Add(dir.join(format!("light_{i:03}.astr"))));
            assert!(outcome.is_success());
        }

        let output = dir.join("stack.astr");
        let outcome = processor.process(AccumulateJob::Combine {
            output: output.clone(),
        });
        assert!(outcome.is_success());

        let combined = AstroImage::from_file(&output).unwrap();
        assert!(combined.pixels().iter().all(|&v| v == 2.0), "median of 1/3/2");
    }

    #[test]
    fn test_master_dark_processor_installs_shared_masters() {
        let dir = test_dir("proc_dark");
        let dims = ImageDimensions::new(32, 32, 1);

        let mut darks = Vec::new();
        for (i, level) in [0.010f32, 0.012, 0.014].iter().enumerate() {
            let path = dir.join(format!("dark_{i:03}.astr"));
            let mut frame = AstroImage::new_filled(dims, *level);
            for (p, v) in frame.pixels_mut().iter_mut().enumerate() {
                *v += (p % 5) as f32 * 1e-4;
            }
            frame.save_to_file(&path).unwrap();
            darks.push(path);
        }

        let masters: SharedMasters = Arc::new(Mutex::new(CalibrationMasters::default()));
        let mut processor = MasterDarkProcessor::new(Arc::clone(&masters), &dir, 1 << 20);

        let output = dir.join("master_dark.astr");
        let outcome = processor.process(DarkStackJob {
            darks,
            output: output.clone(),
        });
        assert!(outcome.is_success());
        assert!(output.exists());
        assert!(!masters.lock().is_empty());

        processor.reset();
        assert!(masters.lock().is_empty());
    }

    #[test]
    fn test_calibration_processor_applies_masters() {
        let dir = test_dir("proc_cal");
        let dims = ImageDimensions::new(32, 32, 1);

        let masters: SharedMasters = Arc::new(Mutex::new(CalibrationMasters::from_master_dark(
            AstroImage::new_filled(dims, 0.05),
            5.0,
        )));

        let light_path = dir.join("light_000.astr");
        AstroImage::new_filled(dims, 0.30).save_to_file(&light_path).unwrap();

        let mut processor = CalibrationProcessor::new(masters);
        let outcome = processor.process(light_path.clone());

        let StageOutcome::Completed { output, .. } = outcome else {
            panic!("calibration failed");
        };
        let output = output.unwrap();
        assert_eq!(output, tagged_path(&light_path, "cal"));

        let calibrated = AstroImage::from_file(&output).unwrap();
        assert!(calibrated.pixels().iter().all(|&v| (v - 0.25).abs() < 1e-6));
        assert!(FrameSidecar::load_or_default(&output).unwrap().flag("calibrated"));
    }
}
