//! Scripted collaborators for exercising the lifecycle without Git, Python,
//! or child processes.
//!
//! Every double is cheap to clone and shares its counters between clones, so
//! a test can hand one copy to a manager and inspect another.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::capability::{LaunchContext, PluginService, ServiceKind, ServiceProvider};
use crate::error::{FetchError, ProvisionError, ResolveError, ServiceError};
use crate::fetch::SourceFetcher;
use crate::manifest::{EntryPoint, MANIFEST_FILE};
use crate::provision::Provisioner;

/// Fetcher that materialises a fixed set of files instead of cloning.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFetcher {
    files: Vec<(String, String)>,
    unreachable: bool,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    /// Creates a fetcher producing an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, relative to the checkout root, to every fetched tree.
    #[must_use]
    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.push((name.into(), contents.into()));
        self
    }

    /// Adds a `plugin.json` with the given contents.
    #[must_use]
    pub fn with_manifest(self, contents: impl Into<String>) -> Self {
        self.with_file(MANIFEST_FILE, contents)
    }

    /// Writes the files and then fails as if the remote dropped the
    /// connection.
    #[must_use]
    pub const fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Sleeps before each retrieval.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of retrievals performed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SourceFetcher for ScriptedFetcher {
    fn retrieve(&self, source_url: &str, local: &Path) -> Result<(), FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        let invalid = |err: std::io::Error| FetchError::InvalidSource {
            source_url: source_url.to_owned(),
            message: err.to_string(),
        };
        fs::create_dir_all(local).map_err(invalid)?;
        for (name, contents) in &self.files {
            let path = local.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(invalid)?;
            }
            fs::write(&path, contents).map_err(invalid)?;
        }
        if self.unreachable {
            return Err(FetchError::SourceUnreachable {
                source_url: source_url.to_owned(),
                message: String::from("connection reset by peer"),
            });
        }
        Ok(())
    }
}

/// Provisioner that creates bare directories instead of real environments.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvisioner {
    fail_create: bool,
    fail_dependencies: bool,
    calls: Arc<AtomicUsize>,
    last_spec: Arc<Mutex<Option<PathBuf>>>,
}

impl ScriptedProvisioner {
    /// Creates a provisioner that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails before creating anything.
    #[must_use]
    pub const fn failing_creation(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Creates the environment, then fails the dependency step and leaves the
    /// partial environment behind so callers' rollback can be observed.
    #[must_use]
    pub const fn failing_dependencies(mut self) -> Self {
        self.fail_dependencies = true;
        self
    }

    /// Number of environments this provisioner attempted to create.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Dependency specification passed to the most recent provision call.
    #[must_use]
    pub fn last_dependency_spec(&self) -> Option<PathBuf> {
        self.last_spec
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Provisioner for ScriptedProvisioner {
    fn provision(
        &self,
        env_path: &Path,
        dependency_spec: Option<&Path>,
    ) -> Result<(), ProvisionError> {
        if env_path.exists() {
            return Ok(());
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_spec.lock().unwrap_or_else(PoisonError::into_inner) =
            dependency_spec.map(Path::to_path_buf);

        if self.fail_create {
            return Err(ProvisionError::EnvironmentCreateFailed {
                path: env_path.to_path_buf(),
                message: String::from("scripted creation failure"),
            });
        }
        fs::create_dir_all(env_path.join("bin")).map_err(|err| {
            ProvisionError::EnvironmentCreateFailed {
                path: env_path.to_path_buf(),
                message: err.to_string(),
            }
        })?;
        if self.fail_dependencies {
            return Err(ProvisionError::DependencyInstallFailed {
                path: env_path.to_path_buf(),
                message: String::from("scripted dependency failure"),
            });
        }
        Ok(())
    }
}

/// Behaviour of services created by [`ScriptedProvider`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServiceScript {
    /// Starts and reports ready immediately.
    #[default]
    Ready,
    /// Starts but never reports ready.
    NeverReady,
    /// Fails to start.
    FailStart,
    /// Exits before reporting ready.
    ExitBeforeReady,
    /// Becomes ready but fails to stop.
    FailStop,
}

/// Start and stop counters shared by every service of a provider.
#[derive(Debug, Default)]
pub struct ServiceProbe {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl ServiceProbe {
    /// Number of `start` calls.
    #[must_use]
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls.
    #[must_use]
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

/// Provider whose services follow a [`ServiceScript`].
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    kind: ServiceKind,
    script: ServiceScript,
    resolve_error: Option<ResolveError>,
    probe: Arc<ServiceProbe>,
    launches: Arc<Mutex<Vec<LaunchContext>>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    /// Creates a subprocess-kind provider whose services become ready.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: ServiceKind::Subprocess,
            script: ServiceScript::Ready,
            resolve_error: None,
            probe: Arc::default(),
            launches: Arc::default(),
        }
    }

    /// Registers the provider under `kind`.
    #[must_use]
    pub const fn with_kind(mut self, kind: ServiceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the behaviour of created services.
    #[must_use]
    pub const fn with_script(mut self, script: ServiceScript) -> Self {
        self.script = script;
        self
    }

    /// Makes `resolve` fail with `error`.
    #[must_use]
    pub fn with_resolve_error(mut self, error: ResolveError) -> Self {
        self.resolve_error = Some(error);
        self
    }

    /// Counters shared by every created service.
    #[must_use]
    pub fn probe(&self) -> Arc<ServiceProbe> {
        Arc::clone(&self.probe)
    }

    /// Launch contexts passed to `create`, oldest first.
    #[must_use]
    pub fn launches(&self) -> Vec<LaunchContext> {
        self.launches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ServiceProvider for ScriptedProvider {
    fn kind(&self) -> ServiceKind {
        self.kind
    }

    fn resolve(&self, _entry: &EntryPoint, _install_path: &Path) -> Result<(), ResolveError> {
        self.resolve_error.clone().map_or(Ok(()), Err)
    }

    fn create(&self, context: LaunchContext) -> Result<Box<dyn PluginService>, ServiceError> {
        let service = context.entry.qualified();
        self.launches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(context);
        Ok(Box::new(ScriptedService {
            service,
            script: self.script,
            probe: Arc::clone(&self.probe),
        }))
    }
}

/// Service created by [`ScriptedProvider`].
#[derive(Debug)]
pub struct ScriptedService {
    service: String,
    script: ServiceScript,
    probe: Arc<ServiceProbe>,
}

impl PluginService for ScriptedService {
    fn start(&mut self) -> Result<(), ServiceError> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        if self.script == ServiceScript::FailStart {
            return Err(ServiceError::Failed {
                service: self.service.clone(),
                message: String::from("scripted start failure"),
            });
        }
        Ok(())
    }

    fn wait_until_ready(&mut self, _timeout: Duration) -> Result<bool, ServiceError> {
        match self.script {
            ServiceScript::Ready | ServiceScript::FailStop => Ok(true),
            ServiceScript::NeverReady | ServiceScript::FailStart => Ok(false),
            ServiceScript::ExitBeforeReady => Err(ServiceError::ExitedBeforeReady {
                service: self.service.clone(),
            }),
        }
    }

    fn stop(&mut self) -> Result<(), ServiceError> {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        if self.script == ServiceScript::FailStop {
            return Err(ServiceError::Failed {
                service: self.service.clone(),
                message: String::from("scripted stop failure"),
            });
        }
        Ok(())
    }
}
