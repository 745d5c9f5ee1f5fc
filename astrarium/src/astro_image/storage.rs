//! Raw binary frame container.
//!
//! Format (`.astr`): a 16-byte header (magic `ASTR`, then width, height and
//! channel count as u32 little-endian) followed by the interleaved f32 pixel
//! payload. Pixel values round-trip exactly; richer container formats (FITS,
//! camera RAW) are external collaborators and not handled here.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{AstroImage, ImageDimensions};

const MAGIC: [u8; 4] = *b"ASTR";
const HEADER_LEN: usize = 16;

/// Errors raised by frame and sidecar storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to read frame file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create frame file '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write frame file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{path}' is not a frame container (bad magic)")]
    BadMagic { path: PathBuf },

    #[error("Frame file '{path}' is truncated: expected {expected} pixel values, found {actual}")]
    Truncated {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to read sidecar '{path}': {source}")]
    SidecarRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write sidecar '{path}': {source}")]
    SidecarWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed sidecar '{path}': {source}")]
    SidecarFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub(super) fn load(path: &Path) -> Result<AstroImage, StorageError> {
    let bytes = std::fs::read(path).map_err(|e| StorageError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    if bytes.len() < HEADER_LEN || bytes[..4] != MAGIC {
        return Err(StorageError::BadMagic {
            path: path.to_path_buf(),
        });
    }

    let width = read_u32(&bytes[4..8]) as usize;
    let height = read_u32(&bytes[8..12]) as usize;
    let channels = read_u32(&bytes[12..16]) as usize;
    if width == 0 || height == 0 || channels == 0 {
        return Err(StorageError::BadMagic {
            path: path.to_path_buf(),
        });
    }

    let dimensions = ImageDimensions::new(width, height, channels);
    let payload = &bytes[HEADER_LEN..];
    let actual = payload.len() / size_of::<f32>();
    if actual < dimensions.pixel_count() {
        return Err(StorageError::Truncated {
            path: path.to_path_buf(),
            expected: dimensions.pixel_count(),
            actual,
        });
    }

    // pod_collect_to_vec copies, so the source alignment does not matter
    let mut pixels: Vec<f32> = bytemuck::pod_collect_to_vec(payload);
    pixels.truncate(dimensions.pixel_count());

    Ok(AstroImage::from_pixels(dimensions, pixels))
}

pub(super) fn save(image: &AstroImage, path: &Path) -> Result<(), StorageError> {
    let file = File::create(path).map_err(|e| StorageError::Create {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);

    let write_err = |e| StorageError::Write {
        path: path.to_path_buf(),
        source: e,
    };

    writer.write_all(&MAGIC).map_err(write_err)?;
    writer
        .write_all(&(image.width() as u32).to_le_bytes())
        .map_err(write_err)?;
    writer
        .write_all(&(image.height() as u32).to_le_bytes())
        .map_err(write_err)?;
    writer
        .write_all(&(image.channels() as u32).to_le_bytes())
        .map_err(write_err)?;
    writer
        .write_all(bytemuck::cast_slice(image.pixels()))
        .map_err(write_err)?;
    writer.flush().map_err(write_err)?;

    Ok(())
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
