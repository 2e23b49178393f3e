//! Installation and removal of plugins.
//!
//! Installing is a two-step compensating transaction: fetch the source, then
//! provision the environment. If either step fails, [`InstallManager::uninstall`]
//! removes both directories before the error is returned, so a plugin is
//! either fully installed or absent.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::descriptor::{InstalledPlugin, PluginDescriptor};
use crate::error::InstallError;
use crate::fetch::SourceFetcher;
use crate::identity::PluginId;
use crate::manifest::{self, PluginManifest};
use crate::provision::{Provisioner, remove_dir_if_present};

/// Tracing target for install operations.
const INSTALL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::install");

/// Installs plugins under id-derived source and environment directories.
pub struct InstallManager {
    plugins_dir: PathBuf,
    venv_dir: PathBuf,
    fetcher: Box<dyn SourceFetcher>,
    provisioner: Box<dyn Provisioner>,
}

impl InstallManager {
    /// Creates a manager storing sources under `plugins_dir` and
    /// environments under `venv_dir`.
    #[must_use]
    pub fn new(
        plugins_dir: impl Into<PathBuf>,
        venv_dir: impl Into<PathBuf>,
        fetcher: impl SourceFetcher + 'static,
        provisioner: impl Provisioner + 'static,
    ) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            venv_dir: venv_dir.into(),
            fetcher: Box::new(fetcher),
            provisioner: Box::new(provisioner),
        }
    }

    /// Source directory for `id`.
    #[must_use]
    pub fn plugin_path(&self, id: &PluginId) -> PathBuf {
        self.plugins_dir.join(id.as_str())
    }

    /// Environment directory for `id`.
    #[must_use]
    pub fn env_path(&self, id: &PluginId) -> PathBuf {
        self.venv_dir.join(id.as_str())
    }

    /// Returns `true` when both the source and environment directories exist.
    #[must_use]
    pub fn is_installed(&self, id: &PluginId) -> bool {
        self.plugin_path(id).is_dir() && self.env_path(id).is_dir()
    }

    /// Returns a handle for `id` when it is installed.
    ///
    /// The manifest is re-read from disk; a missing or malformed manifest
    /// yields a handle without one.
    #[must_use]
    pub fn installed(&self, id: &PluginId) -> Option<InstalledPlugin> {
        if !self.is_installed(id) {
            return None;
        }
        let install_path = self.plugin_path(id);
        let manifest = PluginManifest::load(&install_path).ok();
        Some(InstalledPlugin::new(
            id.clone(),
            install_path,
            self.env_path(id),
            manifest,
        ))
    }

    /// Fetches and provisions the plugin described by `descriptor`.
    ///
    /// An already installed plugin is returned as is.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::FetchFailed`] or
    /// [`InstallError::ProvisionFailed`] after removing any partial state.
    pub fn install(&self, descriptor: &PluginDescriptor) -> Result<InstalledPlugin, InstallError> {
        let id = descriptor.id();
        if let Some(existing) = self.installed(id) {
            debug!(target: INSTALL_TARGET, plugin = %id, "plugin already installed");
            return Ok(existing);
        }

        let install_path = self.plugin_path(id);
        let env_path = self.env_path(id);
        info!(
            target: INSTALL_TARGET,
            plugin = %id,
            name = descriptor.name(),
            source = descriptor.source_url(),
            "installing plugin"
        );

        if let Err(source) = self.fetcher.fetch_to(descriptor.source_url(), &install_path) {
            self.uninstall(id);
            return Err(InstallError::FetchFailed {
                id: id.clone(),
                source,
            });
        }

        let dependency_spec = manifest::dependency_spec(&install_path);
        if let Err(source) = self
            .provisioner
            .provision(&env_path, dependency_spec.as_deref())
        {
            self.uninstall(id);
            return Err(InstallError::ProvisionFailed {
                id: id.clone(),
                source,
            });
        }

        info!(target: INSTALL_TARGET, plugin = %id, "plugin installed");
        let manifest = PluginManifest::load(&install_path).ok();
        Ok(InstalledPlugin::new(id.clone(), install_path, env_path, manifest))
    }

    /// Removes the source and environment directories for `id`.
    ///
    /// Failures are logged and otherwise ignored; this doubles as the
    /// rollback path for [`InstallManager::install`].
    pub fn uninstall(&self, id: &PluginId) {
        let env_path = self.env_path(id);
        if let Err(err) = self.provisioner.destroy(&env_path) {
            log_removal_failure(id, &env_path, &err);
        }
        let install_path = self.plugin_path(id);
        if let Err(err) = remove_dir_if_present(&install_path) {
            log_removal_failure(id, &install_path, &err);
        }
        debug!(target: INSTALL_TARGET, plugin = %id, "plugin directories removed");
    }
}

fn log_removal_failure(id: &PluginId, path: &Path, err: &std::io::Error) {
    warn!(
        target: INSTALL_TARGET,
        plugin = %id,
        path = %path.display(),
        error = %err,
        "failed to remove plugin directory"
    );
}

impl std::fmt::Debug for InstallManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallManager")
            .field("plugins_dir", &self.plugins_dir)
            .field("venv_dir", &self.venv_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
