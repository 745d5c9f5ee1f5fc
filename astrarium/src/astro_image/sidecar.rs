//! Auxiliary records attached to a frame file.
//!
//! A sidecar is a JSON document stored next to the frame
//! (`<frame>.sidecar.json`) carrying the detected star list, the fitted
//! transformation, hot-pixel coordinates and free-form named flags such as
//! `"registered"`. The pipeline stages communicate through these records
//! instead of passing live buffers across threads.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::astro_image::StorageError;
use crate::registration::Transformation;
use crate::star_detection::Star;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSidecar {
    /// Stars detected in this frame, if detection has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stars: Option<Vec<Star>>,
    /// Transformation mapping the reference frame onto this frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<Transformation>,
    /// Hot pixel coordinates detected from the master dark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot_pixels: Option<Vec<(u32, u32)>>,
    /// Named processing flags, e.g. "registered".
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, bool>,
}

impl FrameSidecar {
    /// Sidecar path for a frame file (`<frame>.sidecar.json`).
    pub fn path_for(frame_path: &Path) -> PathBuf {
        let mut name = frame_path.as_os_str().to_os_string();
        name.push(".sidecar.json");
        PathBuf::from(name)
    }

    /// Load the sidecar for a frame, or an empty record if none exists yet.
    pub fn load_or_default(frame_path: &Path) -> Result<Self, StorageError> {
        let path = Self::path_for(frame_path);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(StorageError::SidecarRead { path, source: e });
            }
        };
        serde_json::from_str(&text).map_err(|e| StorageError::SidecarFormat { path, source: e })
    }

    /// Write the sidecar next to its frame.
    pub fn save(&self, frame_path: &Path) -> Result<(), StorageError> {
        let path = Self::path_for(frame_path);
        let text = serde_json::to_string_pretty(self).map_err(|e| StorageError::SidecarFormat {
            path: path.clone(),
            source: e,
        })?;
        std::fs::write(&path, text).map_err(|e| StorageError::SidecarWrite { path, source: e })
    }

    pub fn set_flag(&mut self, name: &str, value: bool) {
        self.flags.insert(name.to_string(), value);
    }

    /// Flag value; absent flags read as false.
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}
