//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use trellis_config::{Config, LayoutError};
use trellis_plugins::{
    ExecutionManager, GitFetcher, InstallManager, JsonFileStore, NativeProvider,
    ServiceProviders, SubprocessProvider, VenvProvisioner,
};

use crate::health::HealthReporter;
use crate::manager::PluginManager;
use crate::registry::{
    CatalogFileRegistry, GithubOrganisationRegistry, RegistryClient, RegistryError,
};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when no configuration can be resolved.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a pre-resolved configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The data directory could not be prepared.
    #[error("failed to prepare data directory: {source}")]
    Layout {
        /// Filesystem error reported while creating the layout.
        #[source]
        source: LayoutError,
    },
    /// The configured registry could not be constructed.
    #[error("failed to configure registry: {source}")]
    Registry {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Reporter shared with the components built from this daemon.
    #[must_use]
    pub fn reporter(&self) -> Arc<dyn HealthReporter> {
        Arc::clone(&self.reporter)
    }

    /// Builds the registry client selected by the configuration: the catalog
    /// file when one is configured, the GitHub organisation otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Registry`] when the GitHub API endpoint is
    /// not a usable URL.
    pub fn registry(&self) -> Result<Box<dyn RegistryClient>, BootstrapError> {
        if let Some(path) = &self.config.registry_catalog {
            return Ok(Box::new(CatalogFileRegistry::new(path.as_std_path())));
        }
        GithubOrganisationRegistry::new(
            &self.config.registry_api,
            self.config.registry_organisation.clone(),
        )
        .map(|registry| Box::new(registry) as Box<dyn RegistryClient>)
        .map_err(|source| BootstrapError::Registry { source })
    }

    /// Wires the production install and execution managers under the data
    /// directory behind a facade serving `registry`.
    #[must_use]
    pub fn plugin_manager(&self, registry: impl RegistryClient + 'static) -> PluginManager {
        let layout = self.config.layout();
        let install = Arc::new(InstallManager::new(
            layout.plugins_dir().as_std_path(),
            layout.venv_dir().as_std_path(),
            GitFetcher::new(),
            VenvProvisioner::new(&self.config.python),
        ));
        let providers = ServiceProviders::new()
            .with(
                SubprocessProvider::new(&self.config.launcher)
                    .with_stop_grace(self.config.stop_grace()),
            )
            .with(NativeProvider::new());
        let execution = Arc::new(ExecutionManager::new(
            Arc::new(JsonFileStore::new(layout.store_path().into_std_path_buf())),
            providers,
        ));
        PluginManager::new(install, execution, registry, self.reporter())
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Bootstraps the daemon: loads configuration, installs telemetry, and
/// prepares the data directory.
///
/// # Errors
///
/// Returns the first [`BootstrapError`] encountered; the reporter is told
/// about it before returning.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    if let Err(source) = config.layout().prepare() {
        let error = BootstrapError::Layout { source };
        reporter.bootstrap_failed(&error);
        return Err(error);
    }

    reporter.bootstrap_succeeded(&config);
    Ok(Daemon {
        config,
        telemetry,
        reporter,
    })
}
