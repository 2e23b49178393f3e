//! Read-only composition of a plugin's full state.
//!
//! Projection never fails: manifest and entry-point problems are reported as
//! human-readable strings in [`FullPluginState::errors`] so a catalogue can
//! always be rendered, even for plugins with broken manifests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::descriptor::PluginDescriptor;
use crate::error::{ManifestError, ResolveError};
use crate::execution::ExecutionManager;
use crate::install::InstallManager;
use crate::manifest::{EntryPoint, PluginManifest};

/// Manifest and entry point of an installed plugin that resolved cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEntryPoint {
    /// Parsed `module.Class` reference.
    pub entry: EntryPoint,
    /// Manifest the reference came from.
    pub manifest: PluginManifest,
}

/// Everything known about a plugin at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FullPluginState {
    /// Source and environment are both present.
    pub installed: bool,
    /// Enabled with a non-blank token.
    pub enabled: bool,
    /// Present in the active set.
    pub active: bool,
    /// Source directory, when installed.
    pub install_path: Option<PathBuf>,
    /// Resolved entry point, when installed and resolvable.
    pub entry_point: Option<ResolvedEntryPoint>,
    /// Problems found while resolving the entry point.
    pub errors: Vec<String>,
}

/// Builds [`FullPluginState`] values from the install and execution managers.
#[derive(Debug, Clone)]
pub struct StateProjector {
    install: Arc<InstallManager>,
    execution: Arc<ExecutionManager>,
}

impl StateProjector {
    /// Creates a projector over the given managers.
    #[must_use]
    pub const fn new(install: Arc<InstallManager>, execution: Arc<ExecutionManager>) -> Self {
        Self { install, execution }
    }

    /// Projects the current state of `descriptor`'s plugin.
    #[must_use]
    pub fn project(&self, descriptor: &PluginDescriptor) -> FullPluginState {
        let id = descriptor.id();
        let installed = self.install.is_installed(id);
        let mut state = FullPluginState {
            installed,
            enabled: self.execution.is_enabled(id),
            active: self.execution.is_active(id),
            ..FullPluginState::default()
        };
        if installed {
            let install_path = self.install.plugin_path(id);
            match self.resolve(descriptor.name(), &install_path) {
                Ok(resolved) => state.entry_point = Some(resolved),
                Err(message) => state.errors.push(message),
            }
            state.install_path = Some(install_path);
        }
        state
    }

    fn resolve(&self, name: &str, install_path: &Path) -> Result<ResolvedEntryPoint, String> {
        let manifest =
            PluginManifest::load(install_path).map_err(|err| describe_manifest_error(name, &err))?;
        let entry = manifest
            .entry_point()
            .map_err(|err| describe_manifest_error(name, &err))?;
        self.execution
            .providers()
            .resolve(manifest.kind(), &entry, install_path)
            .map_err(|err| describe_resolve_error(name, &err))?;
        Ok(ResolvedEntryPoint { entry, manifest })
    }
}

/// Renders a manifest problem for display on a plugin tile.
#[must_use]
pub fn describe_manifest_error(name: &str, err: &ManifestError) -> String {
    match err {
        ManifestError::NotFound { .. } => format!("plugin.json not found for {name}"),
        ManifestError::Parse { .. } | ManifestError::Io { .. } => {
            format!("Error parsing plugin.json within {name}")
        }
        ManifestError::MissingField { .. } => {
            format!("Required field not found in plugin.json for {name}")
        }
        ManifestError::BadService { .. } => {
            String::from("Bad 'service' specification in plugin.json")
        }
    }
}

/// Renders an entry-point resolution problem for display on a plugin tile.
#[must_use]
pub fn describe_resolve_error(name: &str, err: &ResolveError) -> String {
    match err {
        ResolveError::NoProvider { .. } | ResolveError::ModuleMissing { .. } => {
            format!("Failed to import dependencies for {name}")
        }
        ResolveError::ClassMissing { .. } => {
            String::from("Possibly bad service specification in plugin.json")
        }
    }
}
