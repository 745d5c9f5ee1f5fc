//! Hot pixel detection and correction.
//!
//! Detects defective sensor pixels from a master dark frame and corrects them
//! by bilinear neighbor averaging (mean of the 4-connected neighbors).
//!
//! Detection uses Median Absolute Deviation for the σ estimate: the standard
//! deviation is inflated by the very outliers being detected, while the
//! median and MAD stay accurate. Each channel is analyzed separately since
//! noise characteristics differ per channel.

use super::{AstroImage, ImageDimensions};
use crate::math;

/// Default sigma threshold for hot pixel detection.
///
/// A pixel is flagged as defective if it deviates from the per-channel median
/// by more than `sigma_threshold × σ` (σ estimated from MAD).
pub const DEFAULT_HOT_PIXEL_SIGMA: f32 = 5.0;

/// Maximum number of samples to use for median estimation.
///
/// 100K samples keeps the median estimate within ~0.5% on large frames
/// without sorting the whole channel.
const MAX_MEDIAN_SAMPLES: usize = 100_000;

/// A mask of hot (defective) pixels detected from a master dark frame.
#[derive(Debug, Clone)]
pub struct HotPixelMap {
    /// Per-pixel mask, true = hot (any channel over threshold)
    mask: Vec<bool>,
    /// Hot pixel coordinates, row-major order
    coords: Vec<(u32, u32)>,
    /// Image dimensions
    pub dimensions: ImageDimensions,
}

impl HotPixelMap {
    /// Detect hot pixels in a master dark frame.
    ///
    /// A pixel is marked hot if ANY of its channels exceeds
    /// `median + sigma_threshold × σ` for that channel.
    pub fn from_master_dark(master_dark: &AstroImage, sigma_threshold: f32) -> Self {
        assert!(sigma_threshold > 0.0, "Sigma threshold must be positive");

        let dims = master_dark.dimensions();
        let channels = dims.channels;
        let thresholds = channel_thresholds(master_dark, sigma_threshold);

        for (c, &t) in thresholds.iter().enumerate() {
            tracing::debug!(channel = c, threshold = f64::from(t), "hot pixel threshold");
        }

        let pixel_count = dims.width * dims.height;
        let mut mask = vec![false; pixel_count];
        let mut coords = Vec::new();

        for p in 0..pixel_count {
            let base = p * channels;
            let hot =
                (0..channels).any(|c| master_dark.pixels()[base + c] > thresholds[c]);
            if hot {
                mask[p] = true;
                coords.push(((p % dims.width) as u32, (p / dims.width) as u32));
            }
        }

        tracing::info!(
            hot_pixels = coords.len(),
            percentage = 100.0 * coords.len() as f64 / pixel_count as f64,
            "hot pixel detection complete"
        );

        Self {
            mask,
            coords,
            dimensions: dims,
        }
    }

    /// Rebuild a map from previously stored coordinates.
    pub fn from_coords(coords: Vec<(u32, u32)>, dimensions: ImageDimensions) -> Self {
        let mut mask = vec![false; dimensions.width * dimensions.height];
        for &(x, y) in &coords {
            mask[y as usize * dimensions.width + x as usize] = true;
        }
        Self {
            mask,
            coords,
            dimensions,
        }
    }

    #[inline]
    pub fn is_hot(&self, x: usize, y: usize) -> bool {
        self.mask[y * self.dimensions.width + x]
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Hot pixel coordinates for the sidecar record.
    pub fn coords(&self) -> &[(u32, u32)] {
        &self.coords
    }

    /// Correct hot pixels in place by bilinear neighbor averaging.
    ///
    /// Each hot channel value is replaced with the mean of its non-hot
    /// 4-connected neighbors. A hot pixel with no usable neighbor keeps its
    /// value.
    pub fn correct(&self, image: &mut AstroImage) {
        assert_eq!(
            image.dimensions(),
            self.dimensions,
            "image dimensions don't match hot pixel map"
        );

        if self.coords.is_empty() {
            return;
        }

        let width = self.dimensions.width;
        let height = self.dimensions.height;
        let channels = self.dimensions.channels;

        // Replacements are computed against the uncorrected frame, then
        // applied, so adjacent hot pixels do not feed each other's averages.
        let mut corrections: Vec<(usize, f32)> = Vec::with_capacity(self.coords.len() * channels);

        for &(x, y) in &self.coords {
            let x = x as usize;
            let y = y as usize;
            for c in 0..channels {
                let mut sum = 0.0f32;
                let mut count = 0usize;
                for (nx, ny) in neighbors4(x, y, width, height) {
                    if !self.is_hot(nx, ny) {
                        sum += image.sample(nx, ny, c);
                        count += 1;
                    }
                }
                if count > 0 {
                    let idx = (y * width + x) * channels + c;
                    corrections.push((idx, sum / count as f32));
                }
            }
        }

        let pixels = image.pixels_mut();
        for (idx, value) in corrections {
            pixels[idx] = value;
        }
    }
}

/// 4-connected neighbors clipped to the image bounds.
fn neighbors4(
    x: usize,
    y: usize,
    width: usize,
    height: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let mut out = [(0usize, 0usize); 4];
    let mut n = 0;
    if x > 0 {
        out[n] = (x - 1, y);
        n += 1;
    }
    if x + 1 < width {
        out[n] = (x + 1, y);
        n += 1;
    }
    if y > 0 {
        out[n] = (x, y - 1);
        n += 1;
    }
    if y + 1 < height {
        out[n] = (x, y + 1);
        n += 1;
    }
    out.into_iter().take(n)
}

/// Per-channel detection thresholds from sampled median + MAD.
fn channel_thresholds(image: &AstroImage, sigma_threshold: f32) -> Vec<f32> {
    let channels = image.channels();
    let pixel_count = image.width() * image.height();

    let stride = (pixel_count / MAX_MEDIAN_SAMPLES).max(1);

    (0..channels)
        .map(|c| {
            let mut samples: Vec<f32> = (0..pixel_count)
                .step_by(stride)
                .map(|p| image.pixels()[p * channels + c])
                .collect();
            let (median, sigma) = math::median_and_mad_sigma_f32_mut(&mut samples);
            median + sigma_threshold * sigma.max(f32::EPSILON)
        })
        .collect()
}
