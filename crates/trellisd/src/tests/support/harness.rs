//! A [`PluginManager`] wired to scripted collaborators.

use std::sync::Arc;

use tempfile::TempDir;
use trellis_plugins::test_support::{ScriptedFetcher, ScriptedProvider, ScriptedProvisioner};
use trellis_plugins::{
    ExecutionManager, InstallManager, MemoryStore, PluginId, ServiceProviders,
};

use crate::manager::PluginManager;
use crate::registry::{RegistryEntry, StaticRegistry};

use super::RecordingHealthReporter;

pub const WEATHER_MANIFEST: &str =
    r#"{"service": "weather.Service", "config": {"units": "metric"}}"#;

const WEATHER_URL: &str = "https://github.com/trellis-plugins/weather";

pub fn weather_entry() -> RegistryEntry {
    RegistryEntry::plugin("Weather", "Forecasts for the dashboard", WEATHER_URL)
}

pub fn weather_id() -> PluginId {
    PluginId::from_source(WEATHER_URL)
}

/// Manager plus handles on every double it was built from.
pub struct Harness {
    _data: TempDir,
    pub fetcher: ScriptedFetcher,
    pub provider: ScriptedProvider,
    pub registry: Arc<StaticRegistry>,
    pub reporter: Arc<RecordingHealthReporter>,
    pub manager: Arc<PluginManager>,
}

impl Harness {
    /// Builds a harness whose registry lists the weather plugin and whose
    /// collaborators all succeed. The catalog is refreshed once.
    pub fn new() -> Self {
        Self::with(
            ScriptedFetcher::new().with_manifest(WEATHER_MANIFEST),
            ScriptedProvisioner::new(),
            ScriptedProvider::new(),
        )
    }

    pub fn with(
        fetcher: ScriptedFetcher,
        provisioner: ScriptedProvisioner,
        provider: ScriptedProvider,
    ) -> Self {
        let data = TempDir::new().expect("temp dir");
        let install = Arc::new(InstallManager::new(
            data.path().join("plugins"),
            data.path().join("venv"),
            fetcher.clone(),
            provisioner,
        ));
        let execution = Arc::new(ExecutionManager::new(
            Arc::new(MemoryStore::new()),
            ServiceProviders::new().with(provider.clone()),
        ));
        let registry = Arc::new(StaticRegistry::new(vec![weather_entry()]));
        let reporter = Arc::new(RecordingHealthReporter::default());
        let manager = Arc::new(PluginManager::new(
            install,
            execution,
            Arc::clone(&registry),
            reporter.clone(),
        ));
        manager.refresh().expect("initial refresh");
        Self {
            _data: data,
            fetcher,
            provider,
            registry,
            reporter,
            manager,
        }
    }

    /// Installs, enables, and tokens the weather plugin.
    pub fn ready_weather(&self) -> PluginId {
        let id = weather_id();
        self.manager.install(&id).expect("install");
        self.manager.enable(&id).expect("enable");
        self.manager.update_token(&id, "secret").expect("token");
        id
    }
}
