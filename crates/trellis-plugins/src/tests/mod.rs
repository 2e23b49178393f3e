//! Crate-level integration and BDD tests.

use std::sync::Arc;

use tempfile::TempDir;

use crate::capability::ServiceProviders;
use crate::descriptor::PluginDescriptor;
use crate::execution::ExecutionManager;
use crate::identity::PluginId;
use crate::install::InstallManager;
use crate::projection::StateProjector;
use crate::store::{ExecutionStore, JsonFileStore};
use crate::test_support::{ScriptedFetcher, ScriptedProvider, ScriptedProvisioner};


const WEATHER_MANIFEST: &str = r#"{"service": "weather.Service", "config": {"units": "metric"}}"#;

#[test]
fn full_lifecycle_persists_across_managers() {
    let data = TempDir::new().expect("temp dir");
    let store_path = data.path().join("db").join("plugins.json");
    let install = Arc::new(InstallManager::new(
        data.path().join("plugins"),
        data.path().join("venv"),
        ScriptedFetcher::new().with_manifest(WEATHER_MANIFEST),
        ScriptedProvisioner::new(),
    ));
    let provider = ScriptedProvider::new();
    let execution = Arc::new(ExecutionManager::new(
        Arc::new(JsonFileStore::new(&store_path)),
        ServiceProviders::new().with(provider.clone()),
    ));
    let projector = StateProjector::new(Arc::clone(&install), Arc::clone(&execution));
    let descriptor = PluginDescriptor::new("Weather", "Forecasts", "https://example.com/weather");
    let id = descriptor.id().clone();

    let installed = install.install(&descriptor).expect("install");
    execution.enable(&id).expect("enable");
    execution.update_token(&id, "s3cret").expect("token");
    execution.activate(&descriptor, &installed).expect("activate");

    let state = projector.project(&descriptor);
    assert!(state.installed && state.enabled && state.active);
    assert_eq!(
        provider.launches().first().map(|launch| launch.token.clone()),
        Some(String::from("s3cret"))
    );

    execution.shutdown_all();
    assert!(!execution.is_active(&id));

    let reopened = JsonFileStore::new(&store_path);
    let record = reopened.load(&id).expect("load").expect("record persisted");
    assert!(record.enabled);
    assert_eq!(record.app_secret_token, "s3cret");
}

#[test]
fn uninstalled_plugin_projects_to_empty_state() {
    let data = TempDir::new().expect("temp dir");
    let install = Arc::new(InstallManager::new(
        data.path().join("plugins"),
        data.path().join("venv"),
        ScriptedFetcher::new(),
        ScriptedProvisioner::new(),
    ));
    let execution = Arc::new(ExecutionManager::new(
        Arc::new(crate::store::MemoryStore::new()),
        ServiceProviders::new(),
    ));
    let projector = StateProjector::new(install, execution);
    let descriptor = PluginDescriptor::with_id(
        PluginId::new("p9"),
        "Radar",
        "Radar images",
        "https://example.com/radar",
    );

    let state = projector.project(&descriptor);

    assert!(!state.installed);
    assert!(!state.enabled);
    assert!(!state.active);
    assert!(state.install_path.is_none());
    assert!(state.errors.is_empty());
}
