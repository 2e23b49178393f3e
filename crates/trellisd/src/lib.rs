//! The Trellis plugin daemon.
//!
//! `trellisd` loads configuration through [`trellis_config`], installs
//! structured telemetry, and serves the plugin lifecycle over HTTP. The
//! catalog of available plugins comes from a [`RegistryClient`]: a GitHub
//! organisation by default, or a local catalog file for offline
//! deployments. Every operation on a plugin flows through the
//! [`PluginManager`] facade, which serialises work per plugin and keeps the
//! rendered catalog current.
//!
//! The process layer guards the runtime directory with a lock file, records
//! the daemon's PID and health, refreshes the catalog on a timer, and stops
//! every running plugin before exiting on SIGTERM, SIGINT, SIGQUIT, or
//! SIGHUP.

mod bootstrap;
mod health;
pub mod manager;
mod process;
pub mod registry;
mod telemetry;
pub mod token;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use manager::{ManagerError, PluginManager, PluginSummary};
pub use process::{
    LaunchError, LaunchPlan, ProcessPaths, ShutdownError, ShutdownSignal, SystemShutdownSignal,
    run_daemon, run_daemon_with,
};
pub use registry::{RegistryClient, RegistryEntry, RegistryError};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
