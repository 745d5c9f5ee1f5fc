//! Session manifest.
//!
//! A simple line-oriented text file tracking a stacking session: dark frame
//! paths, light frame paths and which light is the registration reference.
//! The file is rewritten after every added frame, so a long-running session
//! can be interrupted and resumed without losing progress.
//!
//! Format, one entry per line (`#` starts a comment):
//!
//! ```text
//! dark /data/session/dark_001.astr
//! light /data/session/light_001.astr
//! reference /data/session/light_001.astr
//! ```

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to read session manifest '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write session manifest '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed session manifest '{path}' line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// The frames making up one stacking session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionManifest {
    pub darks: Vec<PathBuf>,
    pub lights: Vec<PathBuf>,
    /// The light frame all others are registered against.
    pub reference: Option<PathBuf>,
}

impl SessionManifest {
    /// Parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let text = std::fs::read_to_string(path).map_err(|e| SessionError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut manifest = Self::default();
        for (line_index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (directive, value) =
                line.split_once(char::is_whitespace)
                    .ok_or_else(|| SessionError::Parse {
                        path: path.to_path_buf(),
                        line: line_index + 1,
                        message: "expected '<directive> <path>'".to_string(),
                    })?;

            let frame = PathBuf::from(value.trim());
            match directive {
                "dark" => manifest.darks.push(frame),
                "light" => manifest.lights.push(frame),
                "reference" => manifest.reference = Some(frame),
                other => {
                    return Err(SessionError::Parse {
                        path: path.to_path_buf(),
                        line: line_index + 1,
                        message: format!("unknown directive '{other}'"),
                    });
                }
            }
        }

        Ok(manifest)
    }

    /// Write the manifest.
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let mut text = String::new();
        for dark in &self.darks {
            text.push_str(&format!("dark {}\n", dark.display()));
        }
        for light in &self.lights {
            text.push_str(&format!("light {}\n", light.display()));
        }
        if let Some(reference) = &self.reference {
            text.push_str(&format!("reference {}\n", reference.display()));
        }

        std::fs::write(path, text).map_err(|e| SessionError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Record a newly captured light frame and persist immediately, so a
    /// crash between frames loses nothing.
    pub fn append_light(&mut self, light: PathBuf, path: &Path) -> Result<(), SessionError> {
        self.lights.push(light);
        if self.reference.is_none() {
            self.reference = self.lights.first().cloned();
        }
        self.save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_dir;

    #[test]
    fn test_round_trip() {
        let dir = test_dir("session_roundtrip");
        let path = dir.join("session.txt");

        let manifest = SessionManifest {
            darks: vec![PathBuf::from("/data/dark_001.astr")],
            lights: vec![
                PathBuf::from("/data/light_001.astr"),
                PathBuf::from("/data/light_002.astr"),
            ],
            reference: Some(PathBuf::from("/data/light_001.astr")),
        };

        manifest.save(&path).unwrap();
        let loaded = SessionManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let dir = test_dir("session_comments");
        let path = dir.join("session.txt");
        std::fs::write(
            &path,
            "# my session\n\ndark /d/dark.astr\n\nlight /d/light.astr\n",
        )
        .unwrap();

        let manifest = SessionManifest::load(&path).unwrap();
        assert_eq!(manifest.darks.len(), 1);
        assert_eq!(manifest.lights.len(), 1);
        assert!(manifest.reference.is_none());
    }

    #[test]
    fn test_unknown_directive_is_an_error() {
        let dir = test_dir("session_unknown");
        let path = dir.join("session.txt");
        std::fs::write(&path, "flat /d/flat.astr\n").unwrap();

        let err = SessionManifest::load(&path).unwrap_err();
        assert!(matches!(err, SessionError::Parse { line: 1, .. }));
        assert!(err.to_string().contains("flat"));
    }

    #[test]
    fn test_append_light_persists_each_frame() {
        let dir = test_dir("session_append");
        let path = dir.join("session.txt");

        let mut manifest = SessionManifest::default();
        manifest
            .append_light(PathBuf::from("/d/light_001.astr"), &path)
            .unwrap();

        // Simulate an interrupted session: reload from disk
        let resumed = SessionManifest::load(&path).unwrap();
        assert_eq!(resumed.lights.len(), 1);
        assert_eq!(
            resumed.reference.as_deref(),
            Some(Path::new("/d/light_001.astr")),
            "first light becomes the reference"
        );

        let mut resumed = resumed;
        resumed
            .append_light(PathBuf::from("/d/light_002.astr"), &path)
            .unwrap();
        let reloaded = SessionManifest::load(&path).unwrap();
        assert_eq!(reloaded.lights.len(), 2);
    }

    #[test]
    fn test_missing_manifest_reports_path() {
        let err = SessionManifest::load(Path::new("/nonexistent/session.txt")).unwrap_err();
        assert!(matches!(err, SessionError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/session.txt"));
    }
}
