//! Unit tests for service providers.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::error::{ResolveError, ServiceError};
use crate::identity::PluginId;
use crate::manifest::EntryPoint;
use crate::test_support::ScriptedProvider;

fn entry(service: &str) -> EntryPoint {
    EntryPoint::parse(service).expect("valid entry point")
}

#[fixture]
fn plugin_root() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
}

// ---------------------------------------------------------------------------
// Provider table
// ---------------------------------------------------------------------------

#[rstest]
fn providers_report_missing_kind() {
    let providers = ServiceProviders::new().with(ScriptedProvider::new());

    let err = providers
        .resolve(ServiceKind::Native, &entry("a.B"), Path::new("/nowhere"))
        .expect_err("no native provider");

    assert_eq!(
        err,
        ResolveError::NoProvider {
            kind: ServiceKind::Native
        }
    );
}

#[rstest]
fn providers_delegate_to_registered_kind() {
    let failing = ScriptedProvider::new()
        .with_kind(ServiceKind::Native)
        .with_resolve_error(ResolveError::ModuleMissing {
            module: String::from("a"),
        });
    let providers = ServiceProviders::new()
        .with(ScriptedProvider::new())
        .with(failing);

    assert!(
        providers
            .resolve(ServiceKind::Subprocess, &entry("a.B"), Path::new("/"))
            .is_ok()
    );
    assert!(matches!(
        providers.resolve(ServiceKind::Native, &entry("a.B"), Path::new("/")),
        Err(ResolveError::ModuleMissing { .. })
    ));
}

#[rstest]
fn register_replaces_provider_of_same_kind() {
    let mut providers = ServiceProviders::new();
    providers.register(Arc::new(ScriptedProvider::new().with_resolve_error(
        ResolveError::ModuleMissing {
            module: String::from("old"),
        },
    )));
    providers.register(Arc::new(ScriptedProvider::new()));

    assert!(
        providers
            .resolve(ServiceKind::Subprocess, &entry("a.B"), Path::new("/"))
            .is_ok()
    );
    assert_eq!(format!("{providers:?}"), r#"ServiceProviders { kinds: ["subprocess"] }"#);
}

#[rstest]
#[case("subprocess", ServiceKind::Subprocess)]
#[case("native", ServiceKind::Native)]
fn service_kind_parses_snake_case(#[case] raw: &str, #[case] expected: ServiceKind) {
    assert_eq!(raw.parse::<ServiceKind>().expect("known kind"), expected);
    assert_eq!(expected.to_string(), raw);
}

#[rstest]
fn launch_context_debug_redacts_token() {
    let context = context_for(
        Path::new("/p"),
        Path::new("/e"),
        "weather.Service",
        "hunter2",
    );
    let rendered = format!("{context:?}");
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("<redacted>"));
}

// ---------------------------------------------------------------------------
// Native provider
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct IdleService;

impl PluginService for IdleService {
    fn start(&mut self) -> Result<(), ServiceError> {
        Ok(())
    }

    fn wait_until_ready(&mut self, _timeout: Duration) -> Result<bool, ServiceError> {
        Ok(true)
    }

    fn stop(&mut self) -> Result<(), ServiceError> {
        Ok(())
    }
}

fn native_with_weather() -> NativeProvider {
    let mut provider = NativeProvider::new();
    provider.register("weather.Service", |_context: &LaunchContext| {
        Box::new(IdleService) as Box<dyn PluginService>
    });
    provider
}

#[rstest]
#[case::registered("weather.Service", None)]
#[case::unknown_class("weather.Other", Some("class"))]
#[case::unknown_module("radar.Service", Some("module"))]
fn native_resolution(#[case] service: &str, #[case] failure: Option<&str>) {
    let provider = native_with_weather();
    let result = provider.resolve(&entry(service), Path::new("/unused"));
    match failure {
        None => assert!(result.is_ok()),
        Some("class") => assert!(matches!(result, Err(ResolveError::ClassMissing { .. }))),
        Some(_) => assert!(matches!(result, Err(ResolveError::ModuleMissing { .. }))),
    }
}

#[rstest]
fn native_create_requires_registration() {
    let provider = native_with_weather();

    let known = provider.create(context_for(
        Path::new("/p"),
        Path::new("/e"),
        "weather.Service",
        "t",
    ));
    let unknown = provider.create(context_for(
        Path::new("/p"),
        Path::new("/e"),
        "radar.Service",
        "t",
    ));

    assert!(known.is_ok());
    assert!(matches!(
        unknown,
        Err(ServiceError::Unresolved { service }) if service == "radar.Service"
    ));
}

// ---------------------------------------------------------------------------
// Subprocess resolution
// ---------------------------------------------------------------------------

#[rstest]
#[case::module_file("weather.py", "class Service:\n    pass\n", "weather.Service")]
#[case::package("weather/__init__.py", "class Service(Base):\n    pass\n", "weather.Service")]
#[case::nested("pkg/weather.py", "class  Service :\n    pass\n", "pkg.weather.Service")]
fn subprocess_resolves_python_sources(
    plugin_root: TempDir,
    #[case] file: &str,
    #[case] source: &str,
    #[case] service: &str,
) {
    write(plugin_root.path(), file, source);
    let provider = SubprocessProvider::new("python3");

    assert_eq!(provider.resolve(&entry(service), plugin_root.path()), Ok(()));
}

#[rstest]
fn subprocess_reports_missing_module(plugin_root: TempDir) {
    let provider = SubprocessProvider::new("python3");

    let err = provider
        .resolve(&entry("weather.Service"), plugin_root.path())
        .expect_err("module missing");

    assert_eq!(
        err,
        ResolveError::ModuleMissing {
            module: String::from("weather")
        }
    );
}

#[rstest]
#[case::absent("class Other:\n    pass\n")]
#[case::prefix_only("class ServiceBase:\n    pass\n")]
fn subprocess_reports_missing_class(plugin_root: TempDir, #[case] source: &str) {
    write(plugin_root.path(), "weather.py", source);
    let provider = SubprocessProvider::new("python3");

    let err = provider
        .resolve(&entry("weather.Service"), plugin_root.path())
        .expect_err("class missing");

    assert_eq!(
        err,
        ResolveError::ClassMissing {
            module: String::from("weather"),
            class: String::from("Service"),
        }
    );
}

// ---------------------------------------------------------------------------
// Subprocess lifecycle
// ---------------------------------------------------------------------------

fn context_for(install: &Path, env: &Path, service: &str, token: &str) -> LaunchContext {
    LaunchContext {
        plugin_id: PluginId::new("p1"),
        token: token.to_owned(),
        config: json!({"units": "metric"}),
        install_path: install.to_path_buf(),
        env_path: env.to_path_buf(),
        entry: entry(service),
    }
}

/// Runs `script` with `sh -c`; `$1`, `$2`, and `$3` are the plugin root, the
/// environment root, and the service reference.
fn shell_service(root: &TempDir, script: &str, grace: Duration) -> Box<dyn PluginService> {
    let env = root.path().join("env");
    fs::create_dir_all(env.join("bin")).expect("create env");
    SubprocessProvider::new("sh")
        .with_launcher_args(["-c", script, "launcher"])
        .with_stop_grace(grace)
        .create(context_for(root.path(), &env, "weather.Service", "s3cret"))
        .expect("create service")
}

const TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(unix)]
#[rstest]
fn subprocess_receives_token_and_config(plugin_root: TempDir) {
    let script = r#"read token; read config
        printf '%s\n%s\n%s\n%s\n' "$token" "$config" "$(pwd -P)" "$VIRTUAL_ENV" > handshake.txt
        echo ready
        while :; do sleep 1; done"#;
    let mut service = shell_service(&plugin_root, script, Duration::from_secs(2));

    service.start().expect("start");
    assert!(service.wait_until_ready(TIMEOUT).expect("ready"));
    service.stop().expect("stop");

    let handshake = fs::read_to_string(plugin_root.path().join("handshake.txt")).expect("handshake");
    let lines: Vec<&str> = handshake.lines().collect();
    let root = plugin_root.path().canonicalize().expect("canonical root");
    assert_eq!(lines.first().copied(), Some("s3cret"));
    assert_eq!(lines.get(1).copied(), Some(r#"{"units":"metric"}"#));
    assert_eq!(lines.get(2).map(Path::new), Some(root.as_path()));
    assert_eq!(
        lines.get(3).copied(),
        plugin_root.path().join("env").to_str()
    );
}

#[cfg(unix)]
#[rstest]
fn subprocess_path_prefers_environment_bin(plugin_root: TempDir) {
    let script = r#"read token; read config
        echo "$PATH" > path.txt
        echo ready
        while :; do sleep 1; done"#;
    let mut service = shell_service(&plugin_root, script, Duration::from_secs(2));

    service.start().expect("start");
    assert!(service.wait_until_ready(TIMEOUT).expect("ready"));
    service.stop().expect("stop");

    let path = fs::read_to_string(plugin_root.path().join("path.txt")).expect("path");
    let bin = plugin_root.path().join("env").join("bin");
    assert!(path.starts_with(bin.to_str().expect("utf-8 path")));
}

#[cfg(unix)]
#[rstest]
fn subprocess_not_ready_within_timeout(plugin_root: TempDir) {
    let script = "read token; read config; while :; do sleep 1; done";
    let mut service = shell_service(&plugin_root, script, Duration::from_secs(2));

    service.start().expect("start");
    let ready = service
        .wait_until_ready(Duration::from_millis(200))
        .expect("timeout is not an error");
    service.stop().expect("stop");

    assert!(!ready);
}

#[cfg(unix)]
#[rstest]
fn subprocess_exiting_before_ready_is_reported(plugin_root: TempDir) {
    let script = "read token; read config; exit 3";
    let mut service = shell_service(&plugin_root, script, Duration::from_secs(2));

    service.start().expect("start");
    let err = service.wait_until_ready(TIMEOUT).expect_err("exited");
    service.stop().expect("stop after exit");

    assert!(matches!(err, ServiceError::ExitedBeforeReady { .. }));
}

#[cfg(unix)]
#[rstest]
fn subprocess_ignoring_sigterm_is_killed(plugin_root: TempDir) {
    let script = r#"trap '' TERM
        read token; read config
        echo ready
        while :; do sleep 1; done"#;
    let mut service = shell_service(&plugin_root, script, Duration::from_millis(300));

    service.start().expect("start");
    assert!(service.wait_until_ready(TIMEOUT).expect("ready"));
    let started = std::time::Instant::now();
    service.stop().expect("stop escalates to kill");

    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[rstest]
fn subprocess_missing_launcher_fails_to_start(plugin_root: TempDir) {
    let mut service = SubprocessProvider::new("/definitely/not/a/launcher")
        .create(context_for(
            plugin_root.path(),
            plugin_root.path(),
            "weather.Service",
            "t",
        ))
        .expect("create is lazy");

    assert!(matches!(service.start(), Err(ServiceError::Spawn { .. })));
    service.stop().expect("stop without child is a no-op");
}

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

const ECHO_PLUGIN: &str = r#"import json
import os
import time


class Echo:
    def __init__(self, token, config, env_root):
        self.token = token
        self.config = config
        self.env_root = env_root

    def on_service_start(self):
        with open("started.tmp", "w") as out:
            json.dump({"token": self.token, "config": self.config, "env": self.env_root}, out)
        os.replace("started.tmp", "started.json")
        while True:
            time.sleep(1)

    def on_service_stop(self):
        open("stopped", "w").close()
"#;

#[cfg(unix)]
#[rstest]
fn shipped_launcher_runs_plugin_class(plugin_root: TempDir) {
    if !python_available() {
        return;
    }
    write(plugin_root.path(), "echo_plugin.py", ECHO_PLUGIN);
    let env = plugin_root.path().join("env");
    crate::provision::install_launcher(&env, Path::new("python3")).expect("install launcher");

    let provider = SubprocessProvider::new(crate::provision::LAUNCHER_NAME)
        .with_stop_grace(Duration::from_secs(5));
    provider
        .resolve(&entry("echo_plugin.Echo"), plugin_root.path())
        .expect("entry point resolves");
    let mut service = provider
        .create(context_for(plugin_root.path(), &env, "echo_plugin.Echo", "s3cret"))
        .expect("create service");

    service.start().expect("start");
    assert!(service.wait_until_ready(TIMEOUT).expect("ready"));
    let started = plugin_root.path().join("started.json");
    let deadline = std::time::Instant::now() + TIMEOUT;
    while !started.exists() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    service.stop().expect("stop");

    let recorded: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(started).expect("started marker"))
            .expect("started marker is JSON");
    assert_eq!(
        recorded,
        json!({
            "token": "s3cret",
            "config": {"units": "metric"},
            "env": env.to_str().expect("utf-8 path"),
        })
    );
    assert!(plugin_root.path().join("stopped").exists());
}
