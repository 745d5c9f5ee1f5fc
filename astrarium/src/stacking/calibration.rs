//! Calibration master frames.

use std::path::Path;

use crate::astro_image::AstroImage;
use crate::astro_image::hot_pixels::{DEFAULT_HOT_PIXEL_SIGMA, HotPixelMap};

use super::error::Error;
use super::stacker::FrameStacker;

/// Holds the master dark and the hot pixel map derived from it.
#[derive(Debug, Default)]
pub struct CalibrationMasters {
    /// Median-combined dark frame
    pub master_dark: Option<AstroImage>,
    /// Hot pixel map derived from the master dark
    pub hot_pixel_map: Option<HotPixelMap>,
}

impl CalibrationMasters {
    /// Build masters from an already combined dark frame.
    pub fn from_master_dark(master_dark: AstroImage, hot_pixel_sigma: f32) -> Self {
        let hot_pixel_map = Some(HotPixelMap::from_master_dark(&master_dark, hot_pixel_sigma));
        Self {
            master_dark: Some(master_dark),
            hot_pixel_map,
        }
    }

    /// Median-combine dark frame files into a master dark and derive the hot
    /// pixel map. Empty input produces empty masters.
    pub fn combine_darks(
        dark_frames: &[AstroImage],
        temp_dir: &Path,
        max_spill_bytes: u64,
    ) -> Result<Self, Error> {
        if dark_frames.is_empty() {
            return Ok(Self::default());
        }

        let mut stacker = FrameStacker::new(dark_frames.len(), temp_dir, max_spill_bytes);
        for frame in dark_frames {
            stacker.add_frame(frame)?;
        }
        let master_dark = stacker
            .process()?
            .expect("dark combination is never cancelled here");

        tracing::info!(frames = dark_frames.len(), "master dark combined");
        Ok(Self::from_master_dark(master_dark, DEFAULT_HOT_PIXEL_SIGMA))
    }

    /// Calibrate a light frame in place:
    /// 1. Dark subtraction (clamped at zero)
    /// 2. Hot pixel correction
    pub fn calibrate(&self, image: &mut AstroImage) {
        if let Some(ref dark) = self.master_dark {
            image.subtract_clamped(dark);
        }
        if let Some(ref map) = self.hot_pixel_map {
            map.correct(image);
        }
    }

    /// True when no master has been installed yet.
    pub fn is_empty(&self) -> bool {
        self.master_dark.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro_image::ImageDimensions;
    use crate::testing::test_dir;

    fn dark_frame(dims: ImageDimensions, level: f32, hot: &[(usize, usize)]) -> AstroImage {
        let mut frame = AstroImage::new_filled(dims, level);
        for (i, v) in frame.pixels_mut().iter_mut().enumerate() {
            *v += (i % 5) as f32 * 1e-4;
        }
        for &(x, y) in hot {
            *frame.sample_mut(x, y, 0) = 0.8;
        }
        frame
    }

    #[test]
    fn test_combine_darks_median_and_hot_map() {
        let dir = test_dir("calibration_combine");
        let dims = ImageDimensions::new(32, 32, 1);

        let darks = vec![
            dark_frame(dims, 0.010, &[(5, 5)]),
            dark_frame(dims, 0.012, &[(5, 5)]),
            dark_frame(dims, 0.014, &[(5, 5)]),
        ];

        let masters = CalibrationMasters::combine_darks(&darks, &dir, 1 << 20).unwrap();
        let master = masters.master_dark.as_ref().unwrap();

        // The persistent hot pixel survives the median and gets flagged
        assert!((master.sample(5, 5, 0) - 0.8).abs() < 1e-6);
        assert!(masters.hot_pixel_map.as_ref().unwrap().is_hot(5, 5));

        // Background level is the middle frame's
        assert!((master.sample(0, 0, 0) - 0.012).abs() < 1e-3);
    }

    #[test]
    fn test_calibrate_subtracts_dark_and_fixes_hot_pixels() {
        let dir = test_dir("calibration_apply");
        let dims = ImageDimensions::new(32, 32, 1);

        let darks = vec![
            dark_frame(dims, 0.010, &[(8, 8)]),
            dark_frame(dims, 0.010, &[(8, 8)]),
            dark_frame(dims, 0.010, &[(8, 8)]),
        ];
        let masters = CalibrationMasters::combine_darks(&darks, &dir, 1 << 20).unwrap();

        let mut light = AstroImage::new_filled(dims, 0.210);
        *light.sample_mut(8, 8, 0) = 0.95;

        masters.calibrate(&mut light);

        // Dark level removed from ordinary pixels
        assert!((light.sample(0, 0, 0) - 0.2).abs() < 1e-3);
        // Hot pixel replaced with its neighborhood, not 0.95 - 0.8
        assert!((light.sample(8, 8, 0) - 0.2).abs() < 1e-2);
    }

    #[test]
    fn test_empty_masters_are_passthrough() {
        let masters = CalibrationMasters::default();
        assert!(masters.is_empty());

        let dims = ImageDimensions::new(8, 8, 1);
        let mut light = AstroImage::new_filled(dims, 0.5);
        masters.calibrate(&mut light);
        assert!(light.pixels().iter().all(|&v| v == 0.5));
    }

    #[test]
    fn test_combine_no_darks_gives_empty_masters() {
        let dir = test_dir("calibration_empty");
        let masters = CalibrationMasters::combine_darks(&[], &dir, 1 << 20).unwrap();
        assert!(masters.is_empty());
    }
}
