//! Out-of-process plugin services.
//!
//! The launcher is started with the plugin root, the environment root, and
//! the `module.Class` reference as arguments. Its working directory is the
//! plugin root, `PATH` is prefixed with the environment's `bin` directory,
//! and `VIRTUAL_ENV` names the environment. The secret token and the JSON
//! configuration are written to stdin as two lines, after which stdin is
//! closed. The plugin signals readiness by printing [`READY_LINE`] on stdout.
//!
//! The default launcher is the script
//! [`install_launcher`](crate::provision::install_launcher) writes into each
//! environment. It imports `module.Class`, builds it from the token, the
//! configuration, and the environment root, and prints the ready line once
//! `before_service_start` has returned.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::{LaunchContext, PluginService, ServiceKind, ServiceProvider};
use crate::error::{ResolveError, ServiceError};
use crate::manifest::EntryPoint;

/// Tracing target for subprocess services.
const SUBPROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::capability::subprocess");

/// Line a plugin prints on stdout once it is ready.
pub const READY_LINE: &str = "ready";

/// Default grace period between SIGTERM and SIGKILL.
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Interval between exit checks while stopping.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Launches plugins as child processes inside their environments.
#[derive(Debug, Clone)]
pub struct SubprocessProvider {
    launcher: PathBuf,
    launcher_args: Vec<OsString>,
    stop_grace: Duration,
}

impl SubprocessProvider {
    /// Creates a provider that runs `launcher`.
    ///
    /// A bare launcher name is looked up on the child's `PATH`, so a launcher
    /// installed into the plugin environment takes precedence.
    #[must_use]
    pub fn new(launcher: impl Into<PathBuf>) -> Self {
        Self {
            launcher: launcher.into(),
            launcher_args: Vec::new(),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Adds arguments placed before the plugin arguments.
    #[must_use]
    pub fn with_launcher_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.launcher_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the grace period between SIGTERM and SIGKILL.
    #[must_use]
    pub const fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    fn command(&self, context: &LaunchContext) -> Command {
        let mut command = Command::new(&self.launcher);
        command
            .args(&self.launcher_args)
            .arg(&context.install_path)
            .arg(&context.env_path)
            .arg(context.entry.qualified())
            .current_dir(&context.install_path)
            .env("VIRTUAL_ENV", &context.env_path)
            .env("PATH", prefixed_path(&context.env_path.join("bin")))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl ServiceProvider for SubprocessProvider {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Subprocess
    }

    fn resolve(&self, entry: &EntryPoint, install_path: &Path) -> Result<(), ResolveError> {
        let module_file =
            locate_module(install_path, entry.module()).ok_or_else(|| ResolveError::ModuleMissing {
                module: entry.module().to_owned(),
            })?;
        match fs::read_to_string(&module_file) {
            Ok(source) if !defines_class(&source, entry.class()) => Err(ResolveError::ClassMissing {
                module: entry.module().to_owned(),
                class: entry.class().to_owned(),
            }),
            Ok(_) => Ok(()),
            Err(_) => Err(ResolveError::ModuleMissing {
                module: entry.module().to_owned(),
            }),
        }
    }

    fn create(&self, context: LaunchContext) -> Result<Box<dyn PluginService>, ServiceError> {
        let command = self.command(&context);
        Ok(Box::new(SubprocessService::new(
            command,
            context,
            self.stop_grace,
        )))
    }
}

fn prefixed_path(bin_dir: &Path) -> OsString {
    let inherited = env::var_os("PATH").unwrap_or_default();
    let entries = std::iter::once(bin_dir.to_path_buf()).chain(env::split_paths(&inherited));
    env::join_paths(entries).unwrap_or_else(|_| bin_dir.as_os_str().to_owned())
}

/// Finds `module` as either `a/b.py` or `a/b/__init__.py` under `root`.
fn locate_module(root: &Path, module: &str) -> Option<PathBuf> {
    let relative: PathBuf = module.split('.').collect();
    let file = root.join(&relative).with_extension("py");
    if file.is_file() {
        return Some(file);
    }
    let package = root.join(relative).join("__init__.py");
    package.is_file().then_some(package)
}

fn defines_class(source: &str, class: &str) -> bool {
    source.lines().any(|line| {
        line.trim_start()
            .strip_prefix("class ")
            .and_then(|rest| rest.trim_start().strip_prefix(class))
            .is_some_and(|tail| tail.starts_with(['(', ':', ' ']))
    })
}

/// Messages sent from the stdout reader to the owning service.
enum Readiness {
    Ready,
    Closed,
}

/// A plugin running as a child process.
pub struct SubprocessService {
    command: Command,
    context: LaunchContext,
    stop_grace: Duration,
    child: Option<Child>,
    readiness: Option<Receiver<Readiness>>,
    ready: bool,
}

impl SubprocessService {
    fn new(command: Command, context: LaunchContext, stop_grace: Duration) -> Self {
        Self {
            command,
            context,
            stop_grace,
            child: None,
            readiness: None,
            ready: false,
        }
    }

    /// Returns the process id of the running child, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn service_name(&self) -> String {
        self.context.entry.qualified()
    }

    fn spawn_error(&self, source: std::io::Error) -> ServiceError {
        ServiceError::Spawn {
            service: self.service_name(),
            source: Arc::new(source),
        }
    }

    fn handshake_error(&self, message: impl Into<String>) -> ServiceError {
        ServiceError::Handshake {
            service: self.service_name(),
            message: message.into(),
        }
    }

    /// Writes the token and configuration lines; dropping `stdin` closes the
    /// pipe.
    fn send_launch_parameters(&self, mut stdin: ChildStdin) -> Result<(), ServiceError> {
        let config = serde_json::to_string(&self.context.config)
            .map_err(|err| self.handshake_error(err.to_string()))?;
        let payload = format!("{}\n{config}\n", self.context.token);
        let written = stdin
            .write_all(payload.as_bytes())
            .and_then(|()| stdin.flush());
        drop(stdin);
        written.map_err(|err| self.handshake_error(err.to_string()))
    }

    fn spawn_readers(&self, child: &mut Child) -> Result<Receiver<Readiness>, ServiceError> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.handshake_error("failed to capture stdout"))?;
        let (sender, receiver) = mpsc::channel();
        let plugin = self.context.plugin_id.to_string();
        thread::Builder::new()
            .name(format!("plugin-stdout-{plugin}"))
            .spawn(move || watch_stdout(&plugin, stdout, &sender))
            .map_err(|err| self.spawn_error(err))?;

        if let Some(stderr) = child.stderr.take() {
            let plugin_id = self.context.plugin_id.to_string();
            thread::Builder::new()
                .name(format!("plugin-stderr-{plugin_id}"))
                .spawn(move || drain_stderr(&plugin_id, stderr))
                .map_err(|err| self.spawn_error(err))?;
        }
        Ok(receiver)
    }
}

fn watch_stdout(plugin: &str, stdout: impl Read, sender: &Sender<Readiness>) {
    let mut announced = false;
    for line in BufReader::new(stdout).lines() {
        let Ok(text) = line else { break };
        if !announced && text.trim() == READY_LINE {
            announced = true;
            drop(sender.send(Readiness::Ready));
        } else {
            debug!(target: SUBPROCESS_TARGET, plugin, output = %text, "plugin stdout");
        }
    }
    drop(sender.send(Readiness::Closed));
}

fn drain_stderr(plugin: &str, stderr: impl Read) {
    for line in BufReader::new(stderr).lines() {
        let Ok(text) = line else { break };
        debug!(target: SUBPROCESS_TARGET, plugin, output = %text, "plugin stderr");
    }
}

impl PluginService for SubprocessService {
    fn start(&mut self) -> Result<(), ServiceError> {
        if self.child.is_some() {
            return Ok(());
        }
        debug!(
            target: SUBPROCESS_TARGET,
            plugin = %self.context.plugin_id,
            launcher = ?self.command.get_program(),
            service = %self.context.entry.qualified(),
            "spawning plugin process"
        );
        let mut child = self.command.spawn().map_err(|err| self.spawn_error(err))?;
        let handshake = child
            .stdin
            .take()
            .ok_or_else(|| self.handshake_error("failed to capture stdin"))
            .and_then(|stdin| self.send_launch_parameters(stdin))
            .and_then(|()| self.spawn_readers(&mut child));
        match handshake {
            Ok(receiver) => {
                debug!(
                    target: SUBPROCESS_TARGET,
                    plugin = %self.context.plugin_id,
                    pid = child.id(),
                    "plugin process spawned"
                );
                self.readiness = Some(receiver);
                self.child = Some(child);
                Ok(())
            }
            Err(err) => {
                drop(child.kill());
                drop(child.wait());
                Err(err)
            }
        }
    }

    fn wait_until_ready(&mut self, timeout: Duration) -> Result<bool, ServiceError> {
        if self.ready {
            return Ok(true);
        }
        let Some(receiver) = self.readiness.as_ref() else {
            return Err(ServiceError::Failed {
                service: self.service_name(),
                message: String::from("service has not been started"),
            });
        };
        match receiver.recv_timeout(timeout) {
            Ok(Readiness::Ready) => {
                self.ready = true;
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Ok(Readiness::Closed) | Err(RecvTimeoutError::Disconnected) => {
                Err(ServiceError::ExitedBeforeReady {
                    service: self.service_name(),
                })
            }
        }
    }

    fn stop(&mut self) -> Result<(), ServiceError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        self.readiness = None;
        self.ready = false;
        terminate_child(&mut child, self.stop_grace).map_err(|message| ServiceError::Failed {
            service: self.service_name(),
            message,
        })
    }
}

impl Drop for SubprocessService {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill() {
                warn!(
                    target: SUBPROCESS_TARGET,
                    plugin = %self.context.plugin_id,
                    error = %err,
                    "failed to kill plugin process on drop"
                );
            } else {
                drop(child.wait());
            }
        }
    }
}

impl std::fmt::Debug for SubprocessService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubprocessService")
            .field("plugin_id", &self.context.plugin_id)
            .field("service", &self.context.entry.qualified())
            .field("pid", &self.pid())
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}

/// Sends SIGTERM, waits up to `grace` for exit, then kills the child.
fn terminate_child(child: &mut Child, grace: Duration) -> Result<(), String> {
    if let Ok(Some(status)) = child.try_wait() {
        debug!(target: SUBPROCESS_TARGET, ?status, "plugin process already exited");
        return Ok(());
    }

    if let Ok(raw) = i32::try_from(child.id()) {
        if let Err(errno) = signal::kill(Pid::from_raw(raw), Signal::SIGTERM) {
            debug!(target: SUBPROCESS_TARGET, pid = raw, %errno, "SIGTERM delivery failed");
        }
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(target: SUBPROCESS_TARGET, ?status, "plugin process exited after SIGTERM");
                return Ok(());
            }
            Ok(None) => thread::sleep(EXIT_POLL_INTERVAL),
            Err(err) => return Err(err.to_string()),
        }
    }

    warn!(
        target: SUBPROCESS_TARGET,
        pid = child.id(),
        grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
        "plugin process ignored SIGTERM, killing"
    );
    child.kill().map_err(|err| err.to_string())?;
    child.wait().map(drop).map_err(|err| err.to_string())
}
