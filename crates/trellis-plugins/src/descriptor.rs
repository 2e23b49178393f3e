//! Registry descriptors and installed-plugin handles.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::identity::{PluginId, plugin_id};
use crate::manifest::PluginManifest;

/// Registry metadata identifying a plugin before installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    id: PluginId,
    name: String,
    description: String,
    source_url: String,
}

impl PluginDescriptor {
    /// Creates a descriptor whose id is derived from `source_url`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        let url = source_url.into();
        Self {
            id: plugin_id(&url),
            name: name.into(),
            description: description.into(),
            source_url: url,
        }
    }

    /// Creates a descriptor with an explicit id.
    #[must_use]
    pub fn with_id(
        id: PluginId,
        name: impl Into<String>,
        description: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            source_url: source_url.into(),
        }
    }

    /// Plugin identifier.
    #[must_use]
    pub const fn id(&self) -> &PluginId {
        &self.id
    }

    /// Display name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Free-form description.
    #[must_use]
    pub const fn description(&self) -> &str {
        self.description.as_str()
    }

    /// Location the source tree is fetched from.
    #[must_use]
    pub const fn source_url(&self) -> &str {
        self.source_url.as_str()
    }
}

/// A plugin whose source and environment are both present on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPlugin {
    id: PluginId,
    install_path: PathBuf,
    env_path: PathBuf,
    manifest: Option<PluginManifest>,
}

impl InstalledPlugin {
    /// Creates a handle for an installed plugin.
    #[must_use]
    pub const fn new(
        id: PluginId,
        install_path: PathBuf,
        env_path: PathBuf,
        manifest: Option<PluginManifest>,
    ) -> Self {
        Self {
            id,
            install_path,
            env_path,
            manifest,
        }
    }

    /// Plugin identifier.
    #[must_use]
    pub const fn id(&self) -> &PluginId {
        &self.id
    }

    /// Root of the fetched source tree.
    #[must_use]
    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    /// Root of the isolated environment.
    #[must_use]
    pub fn env_path(&self) -> &Path {
        &self.env_path
    }

    /// Manifest read at the time the handle was created, if it parsed.
    #[must_use]
    pub const fn manifest(&self) -> Option<&PluginManifest> {
        self.manifest.as_ref()
    }
}
