//! Stack a full session from a manifest file.
//!
//! Usage: stack_session <session-manifest> <output.astr>
//!
//! Reads the manifest, runs dark combination, calibration, registration and
//! accumulation through the live pipeline, and writes the combined stack.
//! Exits 0 on success, 1 on any stage failure with a single line on stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};

use astrarium::prelude::*;
use astrarium::{LiveStackPipeline, PipelineEvent};

fn run(manifest_path: &Path, output: PathBuf) -> anyhow::Result<()> {
    let manifest = SessionManifest::load(manifest_path)
        .with_context(|| format!("loading session manifest {}", manifest_path.display()))?;
    if manifest.lights.is_empty() {
        bail!("session manifest lists no light frames");
    }

    let pipeline = LiveStackPipeline::start(astrarium::pipeline::LiveStackConfig {
        expected_lights: manifest.lights.len(),
        ..Default::default()
    });

    if !manifest.darks.is_empty() {
        let master_path = output.with_file_name("master_dark.astr");
        pipeline.push_darks(manifest.darks.clone(), master_path);

        loop {
            match pipeline.next_event() {
                Some(PipelineEvent::MasterDarkReady(path)) => {
                    eprintln!("master dark: {}", path.display());
                    break;
                }
                Some(PipelineEvent::FrameFailed { error, .. }) => {
                    bail!("dark combination failed: {error}")
                }
                Some(_) => {}
                None => bail!("pipeline terminated unexpectedly"),
            }
        }
    }

    for light in &manifest.lights {
        pipeline.push_light(light.clone());
    }
    pipeline.finish(output);

    let result = pipeline.wait_for_result().map_err(anyhow::Error::msg)?;
    eprintln!("stacked {} lights into {}", manifest.lights.len(), result.display());
    pipeline.shutdown();
    Ok(())
}

fn main() -> ExitCode {
    let mut args = std::env::args_os().skip(1);
    let (Some(manifest), Some(output)) = (args.next(), args.next()) else {
        eprintln!("usage: stack_session <session-manifest> <output.astr>");
        return ExitCode::FAILURE;
    };

    match run(Path::new(&manifest), PathBuf::from(output)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
