//! Derives the on-disk layout shared by the daemon and the helper binaries.
//!
//! Every artefact the plugin manager writes lives under a single data
//! directory: fetched plugin sources, their isolated environments, the
//! execution record store, and the daemon's runtime files. Both binaries need
//! to agree on the layout so `trellis-token` reads the same store the daemon
//! writes.

use std::fs::DirBuilder;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::Config;

/// Canonical directories and files below the configured data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: Utf8PathBuf,
    plugins_dir: Utf8PathBuf,
    venv_dir: Utf8PathBuf,
    db_dir: Utf8PathBuf,
    run_dir: Utf8PathBuf,
}

impl DataLayout {
    /// Builds the layout rooted at `root` without touching the filesystem.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        let root_dir: Utf8PathBuf = root.into();
        Self {
            plugins_dir: root_dir.join("plugins"),
            venv_dir: root_dir.join("venv"),
            db_dir: root_dir.join("db"),
            run_dir: root_dir.join("run"),
            root: root_dir,
        }
    }

    /// Derives the layout from the shared configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.data_dir.clone())
    }

    /// Creates every directory of the layout with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::CreateDirectory`] when a directory cannot be
    /// created.
    pub fn prepare(&self) -> Result<(), LayoutError> {
        for dir in [
            &self.root,
            &self.plugins_dir,
            &self.venv_dir,
            &self.db_dir,
            &self.run_dir,
        ] {
            create_private_dir(dir)?;
        }
        Ok(())
    }

    /// Root data directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory holding one fetched source tree per plugin id.
    #[must_use]
    pub fn plugins_dir(&self) -> &Utf8Path {
        &self.plugins_dir
    }

    /// Directory holding one isolated environment per plugin id.
    #[must_use]
    pub fn venv_dir(&self) -> &Utf8Path {
        &self.venv_dir
    }

    /// Directory holding persisted execution records.
    #[must_use]
    pub fn db_dir(&self) -> &Utf8Path {
        &self.db_dir
    }

    /// Path to the execution record store file.
    #[must_use]
    pub fn store_path(&self) -> Utf8PathBuf {
        self.db_dir.join("plugins.json")
    }

    /// Directory holding the daemon lock, pid, and health snapshot.
    #[must_use]
    pub fn run_dir(&self) -> &Utf8Path {
        &self.run_dir
    }
}

fn create_private_dir(path: &Utf8Path) -> Result<(), LayoutError> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    match builder.create(path.as_std_path()) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(source) => Err(LayoutError::CreateDirectory {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Errors raised while preparing the data directory layout.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// Creating one of the layout directories failed.
    #[error("failed to prepare data directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}
