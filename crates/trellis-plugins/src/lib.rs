//! Plugin lifecycle and execution management for Trellis.
//!
//! The `trellis-plugins` crate implements everything between "a repository
//! listed in a registry" and "a plugin process running under supervision":
//!
//! - [`identity`] derives stable ids from source URLs.
//! - [`fetch`] retrieves source trees and [`provision`] builds isolated
//!   environments for them.
//! - [`install`] composes the two into an all-or-nothing install with
//!   rollback.
//! - [`store`] persists per-plugin enable flags and secret tokens.
//! - [`execution`] enforces the enable/activate state machine and owns the
//!   set of running plugins, launching them through [`capability`]
//!   providers.
//! - [`projection`] folds all of the above into a renderable
//!   [`FullPluginState`] without ever failing.
//! - [`locks`] serialises operations per plugin id.
//!
//! # Lifecycle
//!
//! A plugin moves through `Disabled → Enabled-Inactive → Enabled-Active`.
//! Enabling requires a non-blank secret token as well as the enabled flag;
//! activation additionally requires an installed plugin. Disabling an active
//! plugin stops it first, so an active plugin is always enabled.
//!
//! ```ignore
//! use std::sync::Arc;
//! use trellis_plugins::{
//!     ExecutionManager, GitFetcher, InstallManager, JsonFileStore, PluginDescriptor,
//!     ServiceProviders, SubprocessProvider, VenvProvisioner,
//! };
//!
//! let install = InstallManager::new(
//!     "/var/lib/trellis/plugins",
//!     "/var/lib/trellis/venv",
//!     GitFetcher::new(),
//!     VenvProvisioner::new("python3"),
//! );
//! let execution = ExecutionManager::new(
//!     Arc::new(JsonFileStore::new("/var/lib/trellis/db/plugins.json")),
//!     ServiceProviders::new().with(SubprocessProvider::new("trellis-launch")),
//! );
//!
//! let descriptor = PluginDescriptor::new("Weather", "Forecasts", "https://github.com/o/weather");
//! let installed = install.install(&descriptor)?;
//! execution.enable(descriptor.id())?;
//! execution.update_token(descriptor.id(), "secret")?;
//! execution.activate(&descriptor, &installed)?;
//! ```

pub mod capability;
mod descriptor;
pub mod error;
pub mod execution;
pub mod fetch;
pub mod identity;
pub mod install;
pub mod locks;
pub mod manifest;
pub mod projection;
pub mod provision;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

#[cfg(test)]
mod tests;

pub use self::capability::{
    LaunchContext, NativeProvider, PluginService, ServiceKind, ServiceProvider, ServiceProviders,
    SubprocessProvider,
};
pub use self::descriptor::{InstalledPlugin, PluginDescriptor};
pub use self::error::{
    ExecutionError, FetchError, InstallError, ManifestError, ProvisionError, ResolveError,
    ServiceError, StoreError,
};
pub use self::execution::{ExecutionManager, RuntimePluginHandle};
pub use self::fetch::{GitFetcher, SourceFetcher};
pub use self::identity::{PluginId, plugin_id};
pub use self::install::InstallManager;
pub use self::locks::KeyedLocks;
pub use self::manifest::{EntryPoint, PluginManifest};
pub use self::projection::{FullPluginState, ResolvedEntryPoint, StateProjector};
pub use self::provision::{Provisioner, VenvProvisioner};
pub use self::store::{ExecutionRecord, ExecutionStore, JsonFileStore, MemoryStore};
