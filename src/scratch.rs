//! Scoped scratch directories for retained frames.
//!
//! A [`ScratchDir`] is created per video under a shared root and removed when
//! it is dropped, whichever way the extraction ends (success, error,
//! cancellation, or unwinding). Removal failures are logged as warnings; they
//! never turn a finished extraction into a failed one.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::SlideError;

/// An exclusive, self-deleting directory named after a video.
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ScratchDir {
    /// Create `<root>/frames_<video stem>_<random>`.
    ///
    /// The random suffix keeps two videos with the same name (in different
    /// folders) from sharing a directory.
    ///
    /// # Errors
    ///
    /// Returns [`SlideError::IoError`] if the directory cannot be created.
    pub fn create(root: &Path, video: &Path) -> Result<Self, SlideError> {
        let prefix = format!("frames_{}_", scratch_label(video));
        let dir = tempfile::Builder::new().prefix(&prefix).tempdir_in(root)?;
        let path = dir.path().to_path_buf();
        log::debug!("Created scratch directory {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now.
    ///
    /// # Errors
    ///
    /// Returns the removal failure instead of logging it.
    pub fn close(mut self) -> Result<(), SlideError> {
        match self.dir.take() {
            Some(dir) => dir.close().map_err(SlideError::from),
            None => Ok(()),
        }
    }

    /// Remove the directory now, logging a warning if that fails.
    pub fn release(self) {
        let path = self.path.clone();
        if let Err(error) = self.close() {
            log::warn!("Failed to remove scratch directory {}: {error}", path.display());
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => log::debug!("Removed scratch directory {}", self.path.display()),
                Err(error) => log::warn!(
                    "Failed to remove scratch directory {}: {error}",
                    self.path.display()
                ),
            }
        }
    }
}

/// File-system-safe label derived from a video's file stem.
fn scratch_label(video: &Path) -> String {
    let stem = video
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let label: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if label.is_empty() {
        "video".to_string()
    } else {
        label
    }
}
