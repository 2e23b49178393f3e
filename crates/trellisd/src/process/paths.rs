//! Derives the runtime artefact paths for the daemon lifecycle.

use std::fs;
use std::path::{Path, PathBuf};

use trellis_config::DataLayout;

use super::errors::LaunchError;

/// Lock, PID, and health files below the layout's `run/` directory.
#[derive(Debug, Clone)]
pub struct ProcessPaths {
    runtime_dir: PathBuf,
    lock_path: PathBuf,
    pid_path: PathBuf,
    health_path: PathBuf,
}

impl ProcessPaths {
    /// Derives the paths and creates the runtime directory.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::RuntimeDirectory`] when the directory cannot be
    /// created.
    pub fn derive(layout: &DataLayout) -> Result<Self, LaunchError> {
        let runtime_dir = layout.run_dir().as_std_path().to_path_buf();
        fs::create_dir_all(&runtime_dir).map_err(|source| LaunchError::RuntimeDirectory {
            path: runtime_dir.clone(),
            source,
        })?;
        Ok(Self {
            lock_path: runtime_dir.join("trellisd.lock"),
            pid_path: runtime_dir.join("trellisd.pid"),
            health_path: runtime_dir.join("trellisd.health"),
            runtime_dir,
        })
    }

    /// Directory holding runtime artefacts.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        self.runtime_dir.as_path()
    }

    /// Path to the lock file guarding singleton startup.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        self.lock_path.as_path()
    }

    /// Path to the PID file.
    #[must_use]
    pub fn pid_path(&self) -> &Path {
        self.pid_path.as_path()
    }

    /// Path to the health snapshot.
    #[must_use]
    pub fn health_path(&self) -> &Path {
        self.health_path.as_path()
    }
}
