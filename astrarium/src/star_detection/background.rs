//! Background level estimation.

use crate::common::Buffer2;
use crate::math;

use super::constants::MAX_BACKGROUND_SAMPLES;

/// Global background statistics for one luminance frame.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BackgroundEstimate {
    /// Median luminance: the sky background for a star field.
    pub background: f32,
    /// Maximum luminance.
    pub max: f32,
}

impl BackgroundEstimate {
    pub fn new(luma: &Buffer2<f32>) -> Self {
        let pixels = luma.pixels();
        debug_assert!(!pixels.is_empty());

        let stride = (pixels.len() / MAX_BACKGROUND_SAMPLES).max(1);
        let mut samples: Vec<f32> = pixels.iter().step_by(stride).copied().collect();
        let background = math::median_f32_mut(&mut samples);

        let max = pixels.iter().copied().fold(f32::MIN, f32::max);

        Self { background, max }
    }

    /// Seed threshold value for a threshold percent in [0, 100].
    pub fn threshold_value(&self, percent: f32) -> f32 {
        self.background + (percent / 100.0) * (self.max - self.background)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_image_background() {
        let luma = Buffer2::new_filled(16, 16, 0.1f32);
        let est = BackgroundEstimate::new(&luma);
        assert!((est.background - 0.1).abs() < 1e-6);
        assert!((est.max - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_background_is_median_not_mean() {
        // Mostly 0.1 with a few bright outliers: median stays at 0.1
        let mut pixels = vec![0.1f32; 256];
        pixels[10] = 1.0;
        pixels[100] = 1.0;
        let luma = Buffer2::new(16, 16, pixels);
        let est = BackgroundEstimate::new(&luma);
        assert!((est.background - 0.1).abs() < 1e-6);
        assert!((est.max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_value_interpolates() {
        let mut pixels = vec![0.0f32; 64];
        pixels[3] = 1.0;
        let luma = Buffer2::new(8, 8, pixels);
        let est = BackgroundEstimate::new(&luma);
        assert!((est.threshold_value(0.0) - est.background).abs() < 1e-6);
        assert!((est.threshold_value(100.0) - est.max).abs() < 1e-6);
        assert!((est.threshold_value(50.0) - 0.5).abs() < 1e-6);
    }
}
