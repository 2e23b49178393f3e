//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use trellis_config::Config;
use trellis_plugins::PluginId;

use crate::bootstrap::BootstrapError;
use crate::registry::RegistryError;

/// Tracing target for health events.
const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked after the catalog has been replaced.
    fn catalog_refreshed(&self, plugins: usize);

    /// Invoked when the registry could not be listed; the previous catalog
    /// stays in place.
    fn catalog_refresh_failed(&self, error: &RegistryError);

    /// Invoked after a plugin has become active.
    fn plugin_started(&self, id: &PluginId);

    /// Invoked after a plugin has left the active set.
    fn plugin_stopped(&self, id: &PluginId);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn catalog_refreshed(&self, plugins: usize) {
        (**self).catalog_refreshed(plugins);
    }

    fn catalog_refresh_failed(&self, error: &RegistryError) {
        (**self).catalog_refresh_failed(error);
    }

    fn plugin_started(&self, id: &PluginId) {
        (**self).plugin_started(id);
    }

    fn plugin_stopped(&self, id: &PluginId) {
        (**self).plugin_stopped(id);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            data_dir = %config.data_dir,
            listen_address = %config.listen_address,
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn catalog_refreshed(&self, plugins: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "catalog_refreshed",
            plugins,
            "plugin catalog refreshed"
        );
    }

    fn catalog_refresh_failed(&self, error: &RegistryError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "catalog_refresh_failed",
            error = %error,
            "plugin catalog refresh failed; keeping previous catalog"
        );
    }

    fn plugin_started(&self, id: &PluginId) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "plugin_started",
            plugin = %id,
            "plugin started"
        );
    }

    fn plugin_stopped(&self, id: &PluginId) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "plugin_stopped",
            plugin = %id,
            "plugin stopped"
        );
    }
}
