//! Retrieval of plugin source trees.
//!
//! A fetch always starts from a clean slate: any previous checkout at the
//! destination is removed first, and a failed retrieval removes whatever was
//! partially written, so the destination either holds a complete tree or
//! does not exist.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::ErrorClass;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::identity::plugin_id;
use crate::provision::remove_dir_if_present;

/// Tracing target for fetch operations.
const FETCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::fetch");

/// Retrieves a plugin's source tree from its source location.
pub trait SourceFetcher: Send + Sync {
    /// Copies the full tree at `source_url` into `local`, which does not
    /// exist when this is called.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::SourceUnreachable`] for transport failures and
    /// [`FetchError::InvalidSource`] for anything else.
    fn retrieve(&self, source_url: &str, local: &Path) -> Result<(), FetchError>;

    /// Replaces any checkout at `local` with a fresh copy of `source_url`.
    ///
    /// # Errors
    ///
    /// Returns the retrieval error, or [`FetchError::Workspace`] when a stale
    /// checkout cannot be removed. `local` is absent after any failure.
    fn fetch_to(&self, source_url: &str, local: &Path) -> Result<(), FetchError> {
        remove_dir_if_present(local).map_err(|err| FetchError::Workspace {
            path: local.to_path_buf(),
            source: Arc::new(err),
        })?;

        if let Err(err) = self.retrieve(source_url, local) {
            if let Err(cleanup) = remove_dir_if_present(local) {
                warn!(
                    target: FETCH_TARGET,
                    path = %local.display(),
                    error = %cleanup,
                    "failed to remove partial checkout"
                );
            }
            return Err(err);
        }
        Ok(())
    }

    /// Fetches `source_url` into `dest_root/<plugin id>` and returns that
    /// path.
    ///
    /// # Errors
    ///
    /// See [`SourceFetcher::fetch_to`].
    fn fetch(&self, source_url: &str, dest_root: &Path) -> Result<PathBuf, FetchError> {
        let local = dest_root.join(plugin_id(source_url).as_str());
        self.fetch_to(source_url, &local)?;
        Ok(local)
    }
}

/// Fetches plugin sources by cloning Git repositories.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitFetcher;

impl GitFetcher {
    /// Creates a Git fetcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SourceFetcher for GitFetcher {
    fn retrieve(&self, source_url: &str, local: &Path) -> Result<(), FetchError> {
        debug!(
            target: FETCH_TARGET,
            source = source_url,
            path = %local.display(),
            "cloning plugin source"
        );
        git2::Repository::clone(source_url.trim(), local)
            .map(|_| {
                info!(target: FETCH_TARGET, source = source_url, "plugin source cloned");
            })
            .map_err(|err| classify(source_url, &err))
    }
}

fn classify(source_url: &str, err: &git2::Error) -> FetchError {
    let url = source_url.to_owned();
    let message = err.message().to_owned();
    match err.class() {
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Ssl => {
            FetchError::SourceUnreachable {
                source_url: url,
                message,
            }
        }
        _ => FetchError::InvalidSource {
            source_url: url,
            message,
        },
    }
}

#[cfg(test)]
mod tests;
