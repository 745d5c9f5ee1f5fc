//! Detect stars in a single frame and print them.
//!
//! Usage: detect_stars <frame.astr> [threshold-percent]

use std::path::Path;
use std::process::ExitCode;

use astrarium::{AstroImage, StarDetector, StarDetectorConfig, sort_by_quality};

fn run(path: &Path, threshold: Option<f32>) -> anyhow::Result<()> {
    let frame = AstroImage::from_file(path)?;

    let config = match threshold {
        Some(percent) => StarDetectorConfig::with_threshold_percent(percent),
        None => StarDetectorConfig::default(),
    };
    let mut detector = StarDetector::from_config(config);

    let mut stars = detector.detect(&frame);
    sort_by_quality(&mut stars);

    println!(
        "{} stars in {} ({}x{})",
        stars.len(),
        path.display(),
        frame.width(),
        frame.height()
    );
    for star in stars.iter().take(20) {
        println!(
            "  ({:8.2}, {:8.2})  intensity {:.4}  radius {:.2}  quality {:.1}",
            star.x, star.y, star.intensity, star.mean_radius, star.quality
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: detect_stars <frame.astr> [threshold-percent]");
        return ExitCode::FAILURE;
    };
    let threshold = args.next().and_then(|s| s.parse().ok());

    match run(Path::new(&path), threshold) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
