//! Supervises daemon launch sequencing and runtime orchestration.

use std::process;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::manager::PluginManager;
use crate::registry::RegistryClient;
use crate::transport;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::guard::{HealthState, ProcessGuard};
use super::paths::ProcessPaths;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to launch the daemon runtime.
pub struct LaunchPlan<L, S> {
    /// Source of the daemon configuration.
    pub loader: L,
    /// Receiver for lifecycle events.
    pub reporter: Arc<dyn HealthReporter>,
    /// Blocks until the daemon should stop.
    pub shutdown: S,
    /// Registry overriding the one selected by configuration.
    pub registry: Option<Box<dyn RegistryClient>>,
}

impl<L, S> std::fmt::Debug for LaunchPlan<L, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchPlan")
            .field("registry_override", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}

/// Runs the daemon in the foreground using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, the singleton guard, or the HTTP
/// server fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown: SystemShutdownSignal::new(),
        registry: None,
    })
}

/// Runs the daemon with injected collaborators.
///
/// The sequence is: bootstrap, acquire the runtime lock, populate the
/// catalog, serve HTTP until `shutdown` returns, then stop every active
/// plugin before releasing the lock.
///
/// # Errors
///
/// Returns [`LaunchError`] describing the first failure. Plugins are still
/// stopped when the server fails after startup.
pub fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal + 'static,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
        registry,
    } = plan;

    let daemon = bootstrap_with(&loader, reporter)?;
    let paths = ProcessPaths::derive(&daemon.config().layout())?;
    let mut guard = ProcessGuard::acquire(paths)?;
    guard.write_pid(process::id())?;
    guard.write_health(HealthState::Starting)?;

    let registry = match registry {
        Some(registry) => registry,
        None => daemon.registry()?,
    };
    let manager = Arc::new(daemon.plugin_manager(registry));
    if let Err(error) = manager.refresh() {
        warn!(
            target: PROCESS_TARGET,
            error = %error,
            "starting with an empty catalog"
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .thread_name("trellisd-http")
        .build()
        .map_err(|source| LaunchError::Runtime { source })?;
    let address = daemon.config().listen_address.clone();
    let listener = runtime
        .block_on(TcpListener::bind(address.as_str()))
        .map_err(|source| LaunchError::Bind {
            address: address.clone(),
            source,
        })?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let watcher = thread::Builder::new()
        .name(String::from("trellisd-signals"))
        .spawn(move || {
            let outcome = shutdown.wait();
            drop(stop_tx.send(()));
            outcome
        })
        .map_err(|source| LaunchError::Thread {
            name: "signal watcher",
            source,
        })?;

    let (ticker_tx, ticker_rx) = mpsc::channel::<()>();
    let refresher = match daemon.config().refresh_interval() {
        Some(interval) => Some(spawn_refresher(Arc::clone(&manager), interval, ticker_rx)?),
        None => None,
    };

    guard.write_health(HealthState::Ready)?;
    info!(
        target: PROCESS_TARGET,
        address = %listener.local_addr().map_or(address, |local| local.to_string()),
        runtime_dir = %guard.paths().runtime_dir().display(),
        "daemon ready"
    );

    let served = runtime.block_on(transport::serve(
        listener,
        Arc::clone(&manager),
        async move {
            drop(stop_rx.await);
        },
    ));

    let stopping = guard.write_health(HealthState::Stopping);
    drop(ticker_tx);
    if let Some(handle) = refresher
        && handle.join().is_err()
    {
        warn!(target: PROCESS_TARGET, "catalog refresher panicked");
    }
    manager.shutdown();
    drop(runtime);

    served.map_err(|source| LaunchError::Serve { source })?;
    stopping?;
    match watcher.join() {
        Ok(outcome) => outcome?,
        Err(_) => warn!(target: PROCESS_TARGET, "signal watcher panicked"),
    }
    info!(
        target: PROCESS_TARGET,
        "shutdown sequence completed"
    );
    Ok(())
}

/// Refreshes the catalog every `interval` until the ticker's sender drops.
fn spawn_refresher(
    manager: Arc<PluginManager>,
    interval: Duration,
    ticks: Receiver<()>,
) -> Result<JoinHandle<()>, LaunchError> {
    thread::Builder::new()
        .name(String::from("trellisd-refresh"))
        .spawn(move || {
            loop {
                match ticks.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(error) = manager.refresh() {
                            debug!(
                                target: PROCESS_TARGET,
                                error = %error,
                                "keeping previous catalog"
                            );
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
        .map_err(|source| LaunchError::Thread {
            name: "catalog refresher",
            source,
        })
}
