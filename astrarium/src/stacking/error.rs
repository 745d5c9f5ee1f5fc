//! Error types for stacking operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::astro_image::ImageDimensions;

/// Errors that can occur during stacking operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("No frames have been added to the stacker")]
    NoFrames,

    #[error(
        "Dimension mismatch for frame {index}: expected {expected:?}, got {actual:?}"
    )]
    DimensionMismatch {
        index: usize,
        expected: ImageDimensions,
        actual: ImageDimensions,
    },

    #[error("Failed to create spill directory '{path}': {source}")]
    CreateSpillDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create spill file '{path}': {source}")]
    CreateSpillFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write spill file '{path}': {source}")]
    WriteSpillFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open spill file '{path}': {source}")]
    OpenSpillFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to memory-map spill file '{path}': {source}")]
    MapSpillFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Spill file '{path}' is shorter than its band: expected {expected} values, found {actual}")]
    SpillFileTruncated {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_frames_message() {
        assert_eq!(
            Error::NoFrames.to_string(),
            "No frames have been added to the stacker"
        );
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = Error::DimensionMismatch {
            index: 4,
            expected: ImageDimensions::new(100, 100, 3),
            actual: ImageDimensions::new(200, 100, 3),
        };
        let msg = err.to_string();
        assert!(msg.contains('4'));
        assert!(msg.contains("100"));
        assert!(msg.contains("200"));
    }

    #[test]
    fn test_io_error_source_chain() {
        use std::error::Error as StdError;

        let err = Error::WriteSpillFile {
            path: PathBuf::from("/tmp/part_0000.bin"),
            source: io::Error::other("disk full"),
        };
        assert!(err.to_string().contains("/tmp/part_0000.bin"));
        assert!(err.to_string().contains("disk full"));
        assert!(err.source().is_some());
    }
}
