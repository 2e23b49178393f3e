//! Unit tests for the install manager.

use std::fs;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::error::{FetchError, ProvisionError};
use crate::test_support::{ScriptedFetcher, ScriptedProvisioner};

#[fixture]
fn data_dir() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

fn manager(
    dir: &TempDir,
    fetcher: ScriptedFetcher,
    provisioner: ScriptedProvisioner,
) -> InstallManager {
    InstallManager::new(
        dir.path().join("plugins"),
        dir.path().join("venv"),
        fetcher,
        provisioner,
    )
}

fn descriptor() -> PluginDescriptor {
    PluginDescriptor::with_id(
        PluginId::new("p1"),
        "Weather",
        "Reports the weather",
        "https://example/repo",
    )
}

fn assert_no_residue(manager: &InstallManager, id: &PluginId) {
    assert!(!manager.is_installed(id));
    assert!(!manager.plugin_path(id).exists(), "source directory remains");
    assert!(!manager.env_path(id).exists(), "environment directory remains");
}

#[rstest]
fn install_without_dependencies_creates_empty_environment(data_dir: TempDir) {
    let provisioner = ScriptedProvisioner::new();
    let manager = manager(&data_dir, ScriptedFetcher::new(), provisioner.clone());
    let id = PluginId::new("p1");

    let installed = manager.install(&descriptor()).expect("install");

    assert!(manager.is_installed(&id));
    assert_eq!(installed.install_path(), manager.plugin_path(&id));
    assert_eq!(installed.env_path(), manager.env_path(&id));
    assert!(installed.manifest().is_none());
    assert_eq!(provisioner.last_dependency_spec(), None);
    let extra: Vec<_> = fs::read_dir(manager.env_path(&id).join("bin"))
        .expect("read env")
        .collect();
    assert!(extra.is_empty(), "no dependencies should be installed");
}

#[rstest]
fn install_passes_manifest_dependency_spec(data_dir: TempDir) {
    let provisioner = ScriptedProvisioner::new();
    let fetcher = ScriptedFetcher::new()
        .with_manifest(r#"{"service": "weather.Service", "deps": "reqs.txt"}"#)
        .with_file("reqs.txt", "requests\n");
    let manager = manager(&data_dir, fetcher, provisioner.clone());

    let installed = manager.install(&descriptor()).expect("install");

    assert_eq!(
        provisioner.last_dependency_spec(),
        Some(installed.install_path().join("reqs.txt"))
    );
    assert_eq!(
        installed.manifest().map(PluginManifest::service),
        Some("weather.Service")
    );
}

#[rstest]
fn install_tolerates_unparseable_manifest(data_dir: TempDir) {
    let fetcher = ScriptedFetcher::new().with_manifest("{broken");
    let manager = manager(&data_dir, fetcher, ScriptedProvisioner::new());

    let installed = manager.install(&descriptor()).expect("install succeeds");

    assert!(installed.manifest().is_none());
}

#[rstest]
fn install_then_uninstall_leaves_nothing(data_dir: TempDir) {
    let manager = manager(&data_dir, ScriptedFetcher::new(), ScriptedProvisioner::new());
    let id = PluginId::new("p1");
    manager.install(&descriptor()).expect("install");

    manager.uninstall(&id);

    assert_no_residue(&manager, &id);
}

#[rstest]
fn uninstall_is_idempotent(data_dir: TempDir) {
    let manager = manager(&data_dir, ScriptedFetcher::new(), ScriptedProvisioner::new());
    let id = PluginId::new("p1");
    manager.uninstall(&id);
    manager.uninstall(&id);
    assert_no_residue(&manager, &id);
}

#[rstest]
fn fetch_failure_rolls_back(data_dir: TempDir) {
    let provisioner = ScriptedProvisioner::new();
    let manager = manager(
        &data_dir,
        ScriptedFetcher::new().with_file("partial.py", "").unreachable(),
        provisioner.clone(),
    );
    let id = PluginId::new("p1");

    let err = manager.install(&descriptor()).expect_err("fetch fails");

    assert!(matches!(
        err,
        InstallError::FetchFailed {
            source: FetchError::SourceUnreachable { .. },
            ..
        }
    ));
    assert_eq!(provisioner.calls(), 0, "provisioning must not run");
    assert_no_residue(&manager, &id);
}

#[rstest]
#[case::creation(ScriptedProvisioner::new().failing_creation())]
#[case::dependencies(ScriptedProvisioner::new().failing_dependencies())]
fn provision_failure_rolls_back(data_dir: TempDir, #[case] provisioner: ScriptedProvisioner) {
    let manager = manager(&data_dir, ScriptedFetcher::new(), provisioner);
    let id = PluginId::new("p1");

    let err = manager.install(&descriptor()).expect_err("provision fails");

    let InstallError::ProvisionFailed { source, .. } = err else {
        panic!("expected ProvisionFailed, got {err:?}");
    };
    assert!(matches!(
        source,
        ProvisionError::EnvironmentCreateFailed { .. }
            | ProvisionError::DependencyInstallFailed { .. }
    ));
    assert_no_residue(&manager, &id);
}

#[rstest]
fn install_of_installed_plugin_does_no_work(data_dir: TempDir) {
    let fetcher = ScriptedFetcher::new();
    let provisioner = ScriptedProvisioner::new();
    let manager = manager(&data_dir, fetcher.clone(), provisioner.clone());

    let first = manager.install(&descriptor()).expect("install");
    let second = manager.install(&descriptor()).expect("reinstall");

    assert_eq!(first, second);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(provisioner.calls(), 1);
}

#[rstest]
fn is_installed_requires_both_directories(data_dir: TempDir) {
    let manager = manager(&data_dir, ScriptedFetcher::new(), ScriptedProvisioner::new());
    let id = PluginId::new("p1");
    fs::create_dir_all(manager.plugin_path(&id)).expect("create source dir");

    assert!(!manager.is_installed(&id));
    assert!(manager.installed(&id).is_none());

    fs::create_dir_all(manager.env_path(&id)).expect("create env dir");
    assert!(manager.is_installed(&id));
}
