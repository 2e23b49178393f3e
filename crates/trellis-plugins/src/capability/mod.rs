//! Runtime capabilities that start, await, and stop plugin services.
//!
//! A manifest's `kind` selects a [`ServiceProvider`] from the
//! [`ServiceProviders`] table. Providers answer two questions: whether an
//! entry point can be resolved (used by state projection, without starting
//! anything) and how to create a [`PluginService`] for activation.
//!
//! Two providers ship with the crate:
//!
//! - [`SubprocessProvider`] launches the plugin as a child process inside its
//!   isolated environment and waits for a `ready` line on stdout.
//! - [`NativeProvider`] builds services from an in-process factory table.

mod native;
mod subprocess;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::{ResolveError, ServiceError};
use crate::identity::PluginId;
use crate::manifest::EntryPoint;

pub use self::native::{NativeFactory, NativeProvider};
pub use self::subprocess::{READY_LINE, SubprocessProvider, SubprocessService};

/// How a plugin's service is hosted.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceKind {
    /// A child process started inside the plugin's environment.
    #[default]
    Subprocess,
    /// A service implemented in-process and registered by reference.
    Native,
}

/// Lifecycle operations of a running plugin.
///
/// Implementations must tolerate `stop` being called after a failed
/// `start` or a readiness timeout.
pub trait PluginService: Send {
    /// Begins starting the service. Must not block waiting for readiness.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] when the service cannot be launched.
    fn start(&mut self) -> Result<(), ServiceError>;

    /// Blocks up to `timeout` for the service to report readiness.
    ///
    /// Returns `Ok(false)` when the timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] when the service fails before becoming
    /// ready.
    fn wait_until_ready(&mut self, timeout: Duration) -> Result<bool, ServiceError>;

    /// Stops the service, waiting a bounded time for it to exit.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] when the service cannot be stopped cleanly.
    fn stop(&mut self) -> Result<(), ServiceError>;
}

/// Everything a provider needs to create a service for one plugin.
#[derive(Clone)]
pub struct LaunchContext {
    /// Plugin being launched.
    pub plugin_id: PluginId,
    /// Secret token from the plugin's execution record.
    pub token: String,
    /// Opaque configuration from the manifest.
    pub config: Value,
    /// Root of the fetched plugin source.
    pub install_path: PathBuf,
    /// Root of the plugin's isolated environment.
    pub env_path: PathBuf,
    /// Entry point named by the manifest.
    pub entry: EntryPoint,
}

impl fmt::Debug for LaunchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchContext")
            .field("plugin_id", &self.plugin_id)
            .field("token", &"<redacted>")
            .field("config", &self.config)
            .field("install_path", &self.install_path)
            .field("env_path", &self.env_path)
            .field("entry", &self.entry)
            .finish()
    }
}

/// Creates services for one [`ServiceKind`].
pub trait ServiceProvider: Send + Sync {
    /// Kind of service this provider hosts.
    fn kind(&self) -> ServiceKind;

    /// Checks that `entry` can be loaded from the plugin at `install_path`.
    ///
    /// This must not start anything; it backs state projection.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::ModuleMissing`] or
    /// [`ResolveError::ClassMissing`] when the reference cannot be found.
    fn resolve(&self, entry: &EntryPoint, install_path: &Path) -> Result<(), ResolveError>;

    /// Creates an unstarted service for the plugin.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] when no service can be built for the
    /// context.
    fn create(&self, context: LaunchContext) -> Result<Box<dyn PluginService>, ServiceError>;
}

/// Table of providers keyed by [`ServiceKind`].
#[derive(Clone, Default)]
pub struct ServiceProviders {
    providers: HashMap<ServiceKind, Arc<dyn ServiceProvider>>,
}

impl ServiceProviders {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider`, replacing any provider of the same kind.
    pub fn register(&mut self, provider: Arc<dyn ServiceProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// Builder-style variant of [`ServiceProviders::register`].
    #[must_use]
    pub fn with(mut self, provider: impl ServiceProvider + 'static) -> Self {
        self.register(Arc::new(provider));
        self
    }

    /// Returns the provider for `kind`.
    #[must_use]
    pub fn get(&self, kind: ServiceKind) -> Option<&Arc<dyn ServiceProvider>> {
        self.providers.get(&kind)
    }

    /// Resolves `entry` with the provider registered for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NoProvider`] when no provider handles `kind`,
    /// otherwise whatever the provider reports.
    pub fn resolve(
        &self,
        kind: ServiceKind,
        entry: &EntryPoint,
        install_path: &Path,
    ) -> Result<(), ResolveError> {
        self.get(kind)
            .ok_or(ResolveError::NoProvider { kind })?
            .resolve(entry, install_path)
    }
}

impl fmt::Debug for ServiceProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.providers.keys().map(ServiceKind::to_string).collect();
        kinds.sort();
        f.debug_struct("ServiceProviders")
            .field("kinds", &kinds)
            .finish()
    }
}
