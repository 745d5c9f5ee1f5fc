//! Shared helpers for unit tests: deterministic synthetic star fields.

use glam::DVec2;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::astro_image::{AstroImage, ImageDimensions};
use crate::star_detection::{Star, StarList};

/// Install a test-friendly tracing subscriber (idempotent).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Deterministic scattered star positions with a minimum pairwise separation,
/// kept `margin` pixels away from the borders.
pub fn scattered_positions(
    count: usize,
    width: f64,
    height: f64,
    margin: f64,
    seed: u64,
) -> Vec<DVec2> {
    const MIN_SEPARATION: f64 = 12.0;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut positions: Vec<DVec2> = Vec::with_capacity(count);

    let mut attempts = 0;
    while positions.len() < count && attempts < count * 1000 {
        attempts += 1;
        let candidate = DVec2::new(
            rng.random_range(margin..width - margin),
            rng.random_range(margin..height - margin),
        );
        if positions
            .iter()
            .all(|p| (*p - candidate).length() >= MIN_SEPARATION)
        {
            positions.push(candidate);
        }
    }

    assert_eq!(positions.len(), count, "field too crowded for the request");
    positions
}

/// Build a star list from positions. Quality descends with index so the
/// brightest-N cap selects the same stars from identically-ordered lists.
pub fn stars_at(positions: &[DVec2]) -> StarList {
    positions
        .iter()
        .enumerate()
        .map(|(i, p)| Star {
            x: p.x as f32,
            y: p.y as f32,
            intensity: 0.9 - 0.3 * i as f32 / positions.len().max(1) as f32,
            quality: 1000.0 - i as f32,
            mean_radius: 1.5,
        })
        .collect()
}

/// Render Gaussian star spots onto a flat background.
pub fn render_star_field(dims: ImageDimensions, positions: &[DVec2], sigma: f64) -> AstroImage {
    const BACKGROUND: f32 = 0.05;

    let mut image = AstroImage::new_filled(dims, BACKGROUND);
    let radius = (4.0 * sigma).ceil() as i64;

    for (i, p) in positions.iter().enumerate() {
        // Descending amplitudes so detected brightness ordering is known
        let amplitude = 0.9 * (1.0 - 0.4 * i as f64 / positions.len().max(1) as f64);
        let x0 = ((p.x as i64) - radius).max(0);
        let x1 = ((p.x as i64) + radius).min(dims.width as i64 - 1);
        let y0 = ((p.y as i64) - radius).max(0);
        let y1 = ((p.y as i64) + radius).min(dims.height as i64 - 1);

        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f64 - p.x;
                let dy = y as f64 - p.y;
                let value = amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
                for c in 0..dims.channels {
                    *image.sample_mut(x as usize, y as usize, c) += value as f32;
                }
            }
        }
    }

    image
}

/// Fresh per-test directory under the system temp dir.
pub fn test_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join("astrarium_tests").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
