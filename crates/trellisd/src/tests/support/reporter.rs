//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::sync::{Mutex, PoisonError};

use trellis_config::Config;
use trellis_plugins::PluginId;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::registry::RegistryError;

/// Structured health events tracked during tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    CatalogRefreshed(usize),
    CatalogRefreshFailed(String),
    PluginStarted(PluginId),
    PluginStopped(PluginId),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Counts events equal to `event`.
    pub fn count(&self, event: &HealthEvent) -> usize {
        self.events()
            .iter()
            .filter(|recorded| *recorded == event)
            .count()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn catalog_refreshed(&self, plugins: usize) {
        self.record(HealthEvent::CatalogRefreshed(plugins));
    }

    fn catalog_refresh_failed(&self, error: &RegistryError) {
        self.record(HealthEvent::CatalogRefreshFailed(error.to_string()));
    }

    fn plugin_started(&self, id: &PluginId) {
        self.record(HealthEvent::PluginStarted(id.clone()));
    }

    fn plugin_stopped(&self, id: &PluginId) {
        self.record(HealthEvent::PluginStopped(id.clone()));
    }
}
