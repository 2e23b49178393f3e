//! Registry backed by a local JSON catalog.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::{RegistryClient, RegistryEntry, RegistryError};

const CATALOG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry::catalog");

/// Reads entries from a JSON array on disk.
///
/// Each element carries `name`, `url`, an optional `description`, and an
/// optional `plugin` flag that defaults to `true`. The file is re-read on
/// every listing so edits are picked up by the next refresh.
#[derive(Debug, Clone)]
pub struct CatalogFileRegistry {
    path: PathBuf,
}

impl CatalogFileRegistry {
    /// Creates a registry reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Catalog file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegistryClient for CatalogFileRegistry {
    fn list_entries(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| {
            RegistryError::CatalogRead {
                path: self.path.clone(),
                source: Arc::new(source),
            }
        })?;
        let entries: Vec<RegistryEntry> =
            serde_json::from_str(&contents).map_err(|err| RegistryError::CatalogParse {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        debug!(
            target: CATALOG_TARGET,
            path = %self.path.display(),
            entries = entries.len(),
            "catalog file read"
        );
        Ok(entries)
    }
}
