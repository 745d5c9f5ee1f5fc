pub(crate) mod hot_pixels;
pub(crate) mod sidecar;
mod storage;

pub use storage::StorageError;

use std::path::Path;

use crate::common::Buffer2;

/// Image dimensions: width, height, and number of channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageDimensions {
    /// Image width in pixels
    pub width: usize,
    /// Image height in pixels
    pub height: usize,
    /// Number of channels (1 for grayscale, 3 for RGB)
    pub channels: usize,
}

impl ImageDimensions {
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        assert!(width > 0, "Width must be positive");
        assert!(height > 0, "Height must be positive");
        assert!(channels > 0, "Channels must be positive");
        Self {
            width,
            height,
            channels,
        }
    }

    /// Total number of pixel values (width * height * channels).
    pub fn pixel_count(&self) -> usize {
        self.width * self.height * self.channels
    }

    /// Number of f32 values in one image row (width * channels).
    pub fn row_len(&self) -> usize {
        self.width * self.channels
    }

    /// Check if this is a grayscale image (1 channel).
    pub fn is_grayscale(&self) -> bool {
        self.channels == 1
    }

    /// Check if this is an RGB image (3 channels).
    pub fn is_rgb(&self) -> bool {
        self.channels == 3
    }
}

/// Capture metadata carried alongside a frame.
///
/// Free-form per-frame flags (e.g. "registered") live in the sidecar record,
/// not here.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AstroImageMetadata {
    /// Instrument or camera name
    pub instrument: Option<String>,
    /// Capture date/time as recorded by the acquisition software
    pub date_obs: Option<String>,
    /// Exposure time in seconds
    pub exposure_time: Option<f64>,
}

/// A single frame: owned, contiguous, interleaved row-major f32 pixels.
///
/// All stride math lives here; callers index through the accessors instead of
/// doing their own pointer arithmetic.
#[derive(Debug, Clone)]
pub struct AstroImage {
    /// Capture metadata
    pub metadata: AstroImageMetadata,
    /// Pixel data stored as f32 for processing flexibility
    pub pixels: Vec<f32>,
    /// Image dimensions
    pub dimensions: ImageDimensions,
}

impl AstroImage {
    /// Create an image from interleaved pixel data.
    pub fn from_pixels(dimensions: ImageDimensions, pixels: Vec<f32>) -> Self {
        assert_eq!(
            pixels.len(),
            dimensions.pixel_count(),
            "pixel count must match dimensions"
        );
        Self {
            metadata: AstroImageMetadata::default(),
            pixels,
            dimensions,
        }
    }

    /// Create an image filled with a constant value.
    pub fn new_filled(dimensions: ImageDimensions, value: f32) -> Self {
        Self {
            metadata: AstroImageMetadata::default(),
            pixels: vec![value; dimensions.pixel_count()],
            dimensions,
        }
    }

    pub fn dimensions(&self) -> ImageDimensions {
        self.dimensions
    }

    pub fn width(&self) -> usize {
        self.dimensions.width
    }

    pub fn height(&self) -> usize {
        self.dimensions.height
    }

    pub fn channels(&self) -> usize {
        self.dimensions.channels
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [f32] {
        &mut self.pixels
    }

    /// One image row as an interleaved slice (width * channels values).
    #[inline]
    pub fn row(&self, y: usize) -> &[f32] {
        debug_assert!(y < self.dimensions.height, "row out of bounds");
        let row_len = self.dimensions.row_len();
        &self.pixels[y * row_len..(y + 1) * row_len]
    }

    /// Channel value at (x, y, channel).
    #[inline]
    pub fn sample(&self, x: usize, y: usize, channel: usize) -> f32 {
        debug_assert!(x < self.dimensions.width, "x coordinate out of bounds");
        debug_assert!(y < self.dimensions.height, "y coordinate out of bounds");
        debug_assert!(channel < self.dimensions.channels, "channel out of bounds");
        self.pixels[(y * self.dimensions.width + x) * self.dimensions.channels + channel]
    }

    /// Mutable channel value at (x, y, channel).
    #[inline]
    pub fn sample_mut(&mut self, x: usize, y: usize, channel: usize) -> &mut f32 {
        debug_assert!(x < self.dimensions.width, "x coordinate out of bounds");
        debug_assert!(y < self.dimensions.height, "y coordinate out of bounds");
        debug_assert!(channel < self.dimensions.channels, "channel out of bounds");
        &mut self.pixels[(y * self.dimensions.width + x) * self.dimensions.channels + channel]
    }

    /// Convert to a single-channel luminance buffer.
    ///
    /// Grayscale images are copied as-is; RGB uses standard luminance weights
    /// 0.2126*R + 0.7152*G + 0.0722*B.
    pub fn to_luminance(&self) -> Buffer2<f32> {
        let width = self.dimensions.width;
        let height = self.dimensions.height;

        if self.dimensions.is_grayscale() {
            return Buffer2::new(width, height, self.pixels.clone());
        }

        assert!(
            self.dimensions.is_rgb(),
            "Unsupported channel count: {}",
            self.dimensions.channels
        );

        let luma: Vec<f32> = self
            .pixels
            .chunks_exact(3)
            .map(|px| 0.2126 * px[0] + 0.7152 * px[1] + 0.0722 * px[2])
            .collect();
        Buffer2::new(width, height, luma)
    }

    /// Subtract another frame in place, clamping at zero.
    ///
    /// Used for dark subtraction. Dimensions must match.
    pub fn subtract_clamped(&mut self, other: &AstroImage) {
        assert_eq!(
            self.dimensions, other.dimensions,
            "dimension mismatch in subtraction"
        );
        for (v, d) in self.pixels.iter_mut().zip(other.pixels.iter()) {
            *v = (*v - d).max(0.0);
        }
    }

    /// Load a frame from a `.astr` container file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        storage::load(path.as_ref())
    }

    /// Write this frame to a `.astr` container file.
    ///
    /// Pixel values round-trip exactly.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), StorageError> {
        storage::save(self, path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_pixel_count() {
        let dims = ImageDimensions::new(4, 3, 3);
        assert_eq!(dims.pixel_count(), 36);
        assert_eq!(dims.row_len(), 12);
        assert!(dims.is_rgb());
        assert!(!dims.is_grayscale());
    }

    #[test]
    fn test_sample_interleaved_layout() {
        let dims = ImageDimensions::new(2, 2, 3);
        let pixels: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let image = AstroImage::from_pixels(dims, pixels);

        assert_eq!(image.sample(0, 0, 0), 0.0);
        assert_eq!(image.sample(0, 0, 2), 2.0);
        assert_eq!(image.sample(1, 0, 0), 3.0);
        assert_eq!(image.sample(0, 1, 1), 7.0);
        assert_eq!(image.sample(1, 1, 2), 11.0);
    }

    #[test]
    fn test_row_slices() {
        let dims = ImageDimensions::new(3, 2, 1);
        let image = AstroImage::from_pixels(dims, (0..6).map(|v| v as f32).collect());
        assert_eq!(image.row(0), &[0.0, 1.0, 2.0]);
        assert_eq!(image.row(1), &[3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_luminance_grayscale_passthrough() {
        let dims = ImageDimensions::new(2, 1, 1);
        let image = AstroImage::from_pixels(dims, vec![0.25, 0.75]);
        let luma = image.to_luminance();
        assert_eq!(luma.pixels(), &[0.25, 0.75]);
    }

    #[test]
    fn test_luminance_rgb_weights() {
        let dims = ImageDimensions::new(1, 1, 3);
        let image = AstroImage::from_pixels(dims, vec![1.0, 1.0, 1.0]);
        let luma = image.to_luminance();
        assert!((luma.pixels()[0] - 1.0).abs() < 1e-6);

        let green_only = AstroImage::from_pixels(dims, vec![0.0, 1.0, 0.0]);
        assert!((green_only.to_luminance().pixels()[0] - 0.7152).abs() < 1e-6);
    }

    #[test]
    fn test_subtract_clamped() {
        let dims = ImageDimensions::new(2, 1, 1);
        let mut light = AstroImage::from_pixels(dims, vec![1.0, 0.2]);
        let dark = AstroImage::from_pixels(dims, vec![0.3, 0.5]);
        light.subtract_clamped(&dark);
        assert!((light.pixels[0] - 0.7).abs() < 1e-6);
        assert_eq!(light.pixels[1], 0.0, "subtraction clamps at zero");
    }
}
