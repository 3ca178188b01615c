//! Scoped staging of run artifacts on the local disk.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{CleanerError, Result};

/// An exclusive, per-run directory that is removed when the value goes away.
///
/// Artifacts are written here before being handed to the tracker. The
/// directory never outlives the value: [`StagingDir::close`] removes it and
/// reports failures, `Drop` removes it on every other path (early `?`
/// returns included) and only logs failures.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    removed: bool,
}

impl StagingDir {
    /// Creates `root/run_id`, creating `root` first if needed.
    ///
    /// # Errors
    /// `StagingConflict` if `root/run_id` already exists; `Io` otherwise.
    pub fn create(root: &Path, run_id: &str) -> Result<Self> {
        fs::create_dir_all(root)?;

        let path = root.join(run_id);
        match fs::create_dir(&path) {
            Ok(()) => {
                log::debug!("created staging dir {}", path.display());
                Ok(Self {
                    path,
                    removed: false,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(CleanerError::StagingConflict(path))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A path inside the staging directory.
    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Removes the directory and everything in it.
    pub fn close(mut self) -> Result<()> {
        self.removed = true;
        log::info!("deleting staging dir {}", self.path.display());
        fs::remove_dir_all(&self.path)?;
        Ok(())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        match fs::remove_dir_all(&self.path) {
            Ok(()) => log::debug!("removed staging dir {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("failed to remove staging dir {}: {e}", self.path.display()),
        }
    }
}
