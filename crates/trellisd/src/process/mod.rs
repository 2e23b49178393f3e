//! Process-level supervision: singleton guard, runtime files, signals, and
//! the launch sequence tying them to the HTTP server.

mod errors;
mod guard;
pub(crate) mod launch;
mod paths;
pub(crate) mod shutdown;


pub use errors::LaunchError;
pub use launch::{LaunchPlan, run_daemon, run_daemon_with};
pub use paths::ProcessPaths;
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
