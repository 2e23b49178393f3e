//! Sources of catalog entries.
//!
//! The facade only needs a sequence of [`RegistryEntry`] values; where they
//! come from is decided at bootstrap. [`GithubOrganisationRegistry`] lists the
//! repositories of a GitHub organisation and treats those with a root
//! `plugin.json` as plugins. [`CatalogFileRegistry`] reads the same
//! information from a local JSON file, which suits offline installs.

mod catalog_file;
mod github;


use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trellis_plugins::PluginDescriptor;

pub use self::catalog_file::CatalogFileRegistry;
pub use self::github::GithubOrganisationRegistry;

/// One repository or package advertised by a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Display name.
    pub name: String,
    /// Free-form description; empty when the registry has none.
    #[serde(default)]
    pub description: String,
    /// Location the plugin source is cloned from.
    pub url: String,
    /// Whether the entry declares itself a plugin.
    #[serde(default = "default_is_plugin", rename = "plugin")]
    pub is_plugin: bool,
}

const fn default_is_plugin() -> bool {
    true
}

impl RegistryEntry {
    /// Creates an entry that declares itself a plugin.
    #[must_use]
    pub fn plugin(
        name: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: url.into(),
            is_plugin: true,
        }
    }

    /// Marks the entry as something other than a plugin.
    #[must_use]
    pub const fn not_plugin(mut self) -> Self {
        self.is_plugin = false;
        self
    }

    /// Builds the descriptor for this entry; the id derives from the URL.
    #[must_use]
    pub fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new(
            self.name.clone(),
            self.description.clone(),
            self.url.clone(),
        )
    }
}

/// Errors raised while listing a registry.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The registry endpoint could not be built from configuration.
    #[error("invalid registry endpoint '{endpoint}': {message}")]
    InvalidEndpoint {
        /// Configured endpoint.
        endpoint: String,
        /// Parser message.
        message: String,
    },
    /// The request could not be sent or the connection failed.
    #[error("registry request to {url} failed: {message}")]
    Request {
        /// Requested URL.
        url: String,
        /// Transport message.
        message: String,
    },
    /// The registry answered with an unexpected status.
    #[error("registry request to {url} returned status {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// The registry response was not the expected JSON.
    #[error("failed to decode registry response from {url}: {message}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Decoder message.
        message: String,
    },
    /// The catalog file could not be read.
    #[error("failed to read catalog file '{path}': {source}")]
    CatalogRead {
        /// Catalog file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The catalog file was not a JSON array of entries.
    #[error("failed to parse catalog file '{path}': {message}")]
    CatalogParse {
        /// Catalog file path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
}

/// Lists the entries a registry currently advertises.
pub trait RegistryClient: Send + Sync {
    /// Returns every advertised entry, plugins or not.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] when the registry cannot be listed.
    fn list_entries(&self) -> Result<Vec<RegistryEntry>, RegistryError>;
}

impl<T> RegistryClient for Arc<T>
where
    T: RegistryClient + ?Sized,
{
    fn list_entries(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        (**self).list_entries()
    }
}

impl<T> RegistryClient for Box<T>
where
    T: RegistryClient + ?Sized,
{
    fn list_entries(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        (**self).list_entries()
    }
}

/// Registry serving a fixed, replaceable list of entries.
#[derive(Debug)]
pub struct StaticRegistry {
    listing: Mutex<Result<Vec<RegistryEntry>, RegistryError>>,
    calls: AtomicUsize,
}

impl Default for StaticRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl StaticRegistry {
    /// Creates a registry advertising `entries`.
    #[must_use]
    pub fn new(entries: Vec<RegistryEntry>) -> Self {
        Self {
            listing: Mutex::new(Ok(entries)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Creates a registry whose listing always fails with `error`.
    #[must_use]
    pub fn failing(error: RegistryError) -> Self {
        Self {
            listing: Mutex::new(Err(error)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replaces the advertised entries.
    pub fn set_entries(&self, entries: Vec<RegistryEntry>) {
        *self.listing.lock().unwrap_or_else(PoisonError::into_inner) = Ok(entries);
    }

    /// Makes later listings fail with `error`.
    pub fn set_error(&self, error: RegistryError) {
        *self.listing.lock().unwrap_or_else(PoisonError::into_inner) = Err(error);
    }

    /// Number of listings served.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RegistryClient for StaticRegistry {
    fn list_entries(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.listing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
