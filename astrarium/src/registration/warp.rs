//! Frame resampling into the reference coordinate system.

use glam::DVec2;

use super::transform::Transformation;
use crate::astro_image::AstroImage;

/// Warp a target frame into the reference frame's coordinate system.
///
/// Inverse mapping: each output (reference-frame) pixel samples the target
/// frame at its transformed position with bilinear interpolation. Samples
/// falling outside the target frame are zero, which the median combine later
/// excludes as "no data".
pub fn warp_into_reference(frame: &AstroImage, transform: &Transformation) -> AstroImage {
    let dims = frame.dimensions();
    let mut output = AstroImage::new_filled(dims, 0.0);
    output.metadata = frame.metadata.clone();

    for y in 0..dims.height {
        for x in 0..dims.width {
            let src = transform.apply(DVec2::new(x as f64, y as f64));
            for c in 0..dims.channels {
                *output.sample_mut(x, y, c) = sample_bilinear(frame, src, c);
            }
        }
    }

    output
}

/// Bilinear sample at a fractional position; out of bounds reads as zero.
fn sample_bilinear(frame: &AstroImage, p: DVec2, channel: usize) -> f32 {
    let width = frame.width() as i64;
    let height = frame.height() as i64;

    let x0 = p.x.floor() as i64;
    let y0 = p.y.floor() as i64;
    let fx = (p.x - x0 as f64) as f32;
    let fy = (p.y - y0 as f64) as f32;

    let mut value = 0.0f32;
    for (dy, wy) in [(0i64, 1.0 - fy), (1, fy)] {
        for (dx, wx) in [(0i64, 1.0 - fx), (1, fx)] {
            let sx = x0 + dx;
            let sy = y0 + dy;
            let weight = wx * wy;
            if weight == 0.0 || sx < 0 || sy < 0 || sx >= width || sy >= height {
                continue;
            }
            value += weight * frame.sample(sx as usize, sy as usize, channel);
        }
    }
    value
}
