//! Candidate blob extraction.
//!
//! Grows connected bright regions outward from local maxima. Growth stops at
//! the configured bounding-box cap and at the saddle level, so blended pairs
//! are cut apart where intensity dips between them.

use crate::common::Buffer2;

use super::background::BackgroundEstimate;
use super::config::StarDetectorConfig;

/// One connected bright region.
#[derive(Debug, Clone)]
pub(crate) struct Region {
    /// Member pixels as (x, y, value).
    pub pixels: Vec<(usize, usize, f32)>,
    /// Peak (seed) value.
    pub peak: f32,
    /// True when growth hit the bounding-box cap; such regions are rejected.
    pub truncated: bool,
}

/// Extract candidate regions above the threshold.
pub(crate) fn find_regions(
    luma: &Buffer2<f32>,
    background: &BackgroundEstimate,
    threshold_value: f32,
    config: &StarDetectorConfig,
) -> Vec<Region> {
    let width = luma.width();
    let height = luma.height();
    let mut visited = Buffer2::new_filled(width, height, false);
    let mut regions = Vec::new();

    for y in 0..height {
        for x in 0..width {
            if visited[(x, y)] {
                continue;
            }
            let value = *luma.get(x, y);
            if value <= threshold_value || !is_local_max(luma, x, y, value) {
                continue;
            }
            let region = grow_region(luma, &mut visited, x, y, value, background, config);
            if let Some(region) = region {
                regions.push(region);
            }
        }
    }

    regions
}

/// A seed must not be exceeded by any 8-connected neighbor.
fn is_local_max(luma: &Buffer2<f32>, x: usize, y: usize, value: f32) -> bool {
    let width = luma.width();
    let height = luma.height();
    neighbor_offsets().iter().all(|&(dx, dy)| {
        let nx = x as isize + dx;
        let ny = y as isize + dy;
        if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
            return true;
        }
        *luma.get(nx as usize, ny as usize) <= value
    })
}

fn neighbor_offsets() -> &'static [(isize, isize); 8] {
    &[
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ]
}

/// Flood-fill outward from a seed while intensity stays above the saddle
/// level. Returns None when the blob collapses to nothing.
fn grow_region(
    luma: &Buffer2<f32>,
    visited: &mut Buffer2<bool>,
    seed_x: usize,
    seed_y: usize,
    peak: f32,
    background: &BackgroundEstimate,
    config: &StarDetectorConfig,
) -> Option<Region> {
    let width = luma.width();
    let height = luma.height();

    let saddle_level =
        background.background + config.saddle_fraction * (peak - background.background);

    let mut pixels = Vec::new();
    let mut stack = vec![(seed_x, seed_y)];
    let (mut min_x, mut max_x) = (seed_x, seed_x);
    let (mut min_y, mut max_y) = (seed_y, seed_y);
    let mut truncated = false;

    while let Some((x, y)) = stack.pop() {
        if visited[(x, y)] {
            continue;
        }
        let value = *luma.get(x, y);
        if value < saddle_level {
            continue;
        }

        // Bounding-box cap: refuse to grow past max_star_size
        let new_min_x = min_x.min(x);
        let new_max_x = max_x.max(x);
        let new_min_y = min_y.min(y);
        let new_max_y = max_y.max(y);
        if new_max_x - new_min_x >= config.max_star_size
            || new_max_y - new_min_y >= config.max_star_size
        {
            truncated = true;
            continue;
        }
        (min_x, max_x, min_y, max_y) = (new_min_x, new_max_x, new_min_y, new_max_y);

        visited[(x, y)] = true;
        pixels.push((x, y, value));

        for &(dx, dy) in neighbor_offsets() {
            let nx = x as isize + dx;
            let ny = y as isize + dy;
            if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                continue;
            }
            let (nx, ny) = (nx as usize, ny as usize);
            if !visited[(nx, ny)] {
                stack.push((nx, ny));
            }
        }
    }

    if pixels.is_empty() {
        return None;
    }

    Some(Region {
        pixels,
        peak,
        truncated,
    })
}
