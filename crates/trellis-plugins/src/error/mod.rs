//! Domain errors raised by plugin lifecycle operations.
//!
//! Every stage of the lifecycle has its own `thiserror` enum so callers can
//! tell a fetch failure from a provisioning failure or an activation refusal
//! without parsing messages. I/O errors are wrapped in `Arc` to keep the
//! enums clonable and small.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::capability::ServiceKind;
use crate::identity::PluginId;

/// Errors raised while retrieving a plugin's source tree.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The remote could not be reached (network, TLS, or transport failure).
    #[error("source '{source_url}' is unreachable: {message}")]
    SourceUnreachable {
        /// Source that was being fetched.
        source_url: String,
        /// Transport failure description.
        message: String,
    },

    /// The source was reached but could not be retrieved as a plugin tree.
    #[error("source '{source_url}' is invalid: {message}")]
    InvalidSource {
        /// Source that was being fetched.
        source_url: String,
        /// Retrieval failure description.
        message: String,
    },

    /// The local checkout directory could not be prepared.
    #[error("failed to prepare checkout directory '{}': {source}", path.display())]
    Workspace {
        /// Directory being prepared.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Errors raised while provisioning an isolated environment.
#[derive(Debug, Clone, Error)]
pub enum ProvisionError {
    /// The environment itself could not be created.
    #[error("failed to create environment '{}': {message}", path.display())]
    EnvironmentCreateFailed {
        /// Environment directory.
        path: PathBuf,
        /// Failure description, usually the tool's stderr.
        message: String,
    },

    /// Dependencies could not be installed into a fresh environment.
    #[error("failed to install dependencies into '{}': {message}", path.display())]
    DependencyInstallFailed {
        /// Environment directory.
        path: PathBuf,
        /// Failure description, usually the installer's stderr.
        message: String,
    },
}

/// Errors surfaced by [`InstallManager::install`](crate::install::InstallManager::install)
/// after rollback has completed.
#[derive(Debug, Clone, Error)]
pub enum InstallError {
    /// Fetching the source failed.
    #[error("install of plugin {id} failed while fetching: {source}")]
    FetchFailed {
        /// Plugin being installed.
        id: PluginId,
        /// Underlying fetch failure.
        #[source]
        source: FetchError,
    },

    /// Provisioning the environment failed.
    #[error("install of plugin {id} failed while provisioning: {source}")]
    ProvisionFailed {
        /// Plugin being installed.
        id: PluginId,
        /// Underlying provisioning failure.
        #[source]
        source: ProvisionError,
    },
}

/// Errors raised while reading a plugin manifest.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    /// No manifest exists at the plugin root.
    #[error("manifest not found at '{}'", path.display())]
    NotFound {
        /// Expected manifest location.
        path: PathBuf,
    },

    /// The manifest exists but is not a valid manifest document.
    #[error("manifest '{}' could not be parsed: {message}", path.display())]
    Parse {
        /// Manifest location.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// A required field is absent.
    #[error("manifest is missing required field '{field}'")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// The `service` reference is not in `module.Class` form.
    #[error("service reference '{service}' is not of the form module.Class")]
    BadService {
        /// Offending reference.
        service: String,
    },

    /// The manifest could not be read.
    #[error("manifest '{}' could not be read: {source}", path.display())]
    Io {
        /// Manifest location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Errors raised by execution record stores.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("execution store I/O failed for '{}': {source}", path.display())]
    Io {
        /// Store location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The backing file does not contain a valid record map.
    #[error("execution store '{}' is corrupt: {message}", path.display())]
    Corrupt {
        /// Store location.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },
}

/// Errors raised by a running plugin service.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The plugin process could not be spawned.
    #[error("failed to launch service '{service}': {source}")]
    Spawn {
        /// Service reference being launched.
        service: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Passing launch parameters to the plugin failed.
    #[error("handshake with service '{service}' failed: {message}")]
    Handshake {
        /// Service reference.
        service: String,
        /// Failure description.
        message: String,
    },

    /// The plugin exited before signalling readiness.
    #[error("service '{service}' exited before becoming ready")]
    ExitedBeforeReady {
        /// Service reference.
        service: String,
    },

    /// No factory or launcher is registered for the reference.
    #[error("no implementation registered for service '{service}'")]
    Unresolved {
        /// Service reference.
        service: String,
    },

    /// The service reported a failure of its own.
    #[error("service '{service}' failed: {message}")]
    Failed {
        /// Service reference.
        service: String,
        /// Failure description.
        message: String,
    },
}

/// Errors raised when resolving a manifest entry point to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No provider is registered for the declared service kind.
    #[error("no service provider registered for kind '{kind}'")]
    NoProvider {
        /// Declared service kind.
        kind: ServiceKind,
    },

    /// The module half of the reference could not be located.
    #[error("module '{module}' not found")]
    ModuleMissing {
        /// Module path from the reference.
        module: String,
    },

    /// The module exists but does not export the class.
    #[error("module '{module}' does not define '{class}'")]
    ClassMissing {
        /// Module path from the reference.
        module: String,
        /// Class name from the reference.
        class: String,
    },
}

/// Errors surfaced by the execution manager.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// The plugin is disabled or has no secret token.
    #[error("plugin {id} is not enabled")]
    NotEnabled {
        /// Plugin identifier.
        id: PluginId,
    },

    /// The plugin could not be started or never became ready.
    #[error("plugin {id} failed to start: {message}")]
    StartFailed {
        /// Plugin identifier.
        id: PluginId,
        /// Failure description.
        message: String,
    },

    /// The plugin is not in the active set.
    #[error("plugin {id} is not active")]
    NotActive {
        /// Plugin identifier.
        id: PluginId,
    },

    /// A blank or whitespace-only token was supplied.
    #[error("token for plugin {id} must not be blank")]
    InvalidToken {
        /// Plugin identifier.
        id: PluginId,
    },

    /// The execution record store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests;
