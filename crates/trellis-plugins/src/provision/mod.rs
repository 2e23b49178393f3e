//! Isolated runtime environments for installed plugins.
//!
//! Each plugin gets its own environment directory. Provisioning is
//! idempotent: an existing directory is taken as already provisioned. A
//! failure at any step leaves no environment directory behind.
//!
//! [`VenvProvisioner`] also writes the [`LAUNCHER_NAME`] script into the
//! environment's `bin` directory, where
//! [`SubprocessProvider`](crate::capability::SubprocessProvider) finds it on
//! the child's `PATH`.

mod launcher;

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, info, warn};

use crate::error::ProvisionError;

pub use self::launcher::{LAUNCHER_NAME, install_launcher};

/// Tracing target for provisioning operations.
const PROVISION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::provision");

/// Creates and destroys plugin environments.
pub trait Provisioner: Send + Sync {
    /// Ensures an environment exists at `env_path`, installing the
    /// dependencies listed in `dependency_spec` when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::EnvironmentCreateFailed`] or
    /// [`ProvisionError::DependencyInstallFailed`]. Either way no directory
    /// remains at `env_path`.
    fn provision(&self, env_path: &Path, dependency_spec: Option<&Path>)
    -> Result<(), ProvisionError>;

    /// Removes the environment at `env_path`. A missing directory is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when removal fails.
    fn destroy(&self, env_path: &Path) -> io::Result<()> {
        remove_dir_if_present(env_path)
    }
}

/// Removes `path` recursively, treating a missing path as success.
///
/// # Errors
///
/// Returns the underlying I/O error for any failure other than `NotFound`.
pub fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Provisions Python virtual environments with `venv` and `pip`.
#[derive(Debug, Clone)]
pub struct VenvProvisioner {
    python: PathBuf,
}

impl VenvProvisioner {
    /// Creates a provisioner that bootstraps environments with `python`.
    #[must_use]
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
        }
    }

    /// Returns the interpreter used to create environments.
    #[must_use]
    pub fn python(&self) -> &Path {
        &self.python
    }

    fn create_environment(&self, env_path: &Path) -> Result<(), ProvisionError> {
        let mut command = Command::new(&self.python);
        command.arg("-m").arg("venv").arg(env_path);
        run_step(&mut command, "create environment").map_err(|message| {
            self.discard(env_path);
            ProvisionError::EnvironmentCreateFailed {
                path: env_path.to_path_buf(),
                message,
            }
        })
    }

    fn write_launcher(&self, env_path: &Path) -> Result<(), ProvisionError> {
        let interpreter = env_path.join("bin").join("python");
        install_launcher(env_path, &interpreter).map_err(|err| {
            self.discard(env_path);
            ProvisionError::EnvironmentCreateFailed {
                path: env_path.to_path_buf(),
                message: format!("failed to write {LAUNCHER_NAME}: {err}"),
            }
        })?;
        Ok(())
    }

    fn install_dependencies(&self, env_path: &Path, spec: &Path) -> Result<(), ProvisionError> {
        let mut command = Command::new(env_path.join("bin").join("python"));
        command
            .args(["-m", "pip", "install", "--disable-pip-version-check", "-r"])
            .arg(spec);
        run_step(&mut command, "install dependencies").map_err(|message| {
            self.discard(env_path);
            ProvisionError::DependencyInstallFailed {
                path: env_path.to_path_buf(),
                message,
            }
        })
    }

    fn discard(&self, env_path: &Path) {
        if let Err(err) = self.destroy(env_path) {
            warn!(
                target: PROVISION_TARGET,
                path = %env_path.display(),
                error = %err,
                "failed to remove partially provisioned environment"
            );
        }
    }
}

impl Provisioner for VenvProvisioner {
    fn provision(
        &self,
        env_path: &Path,
        dependency_spec: Option<&Path>,
    ) -> Result<(), ProvisionError> {
        if env_path.exists() {
            debug!(
                target: PROVISION_TARGET,
                path = %env_path.display(),
                "environment already present"
            );
            return Ok(());
        }

        self.create_environment(env_path)?;
        self.write_launcher(env_path)?;
        if let Some(spec) = dependency_spec {
            self.install_dependencies(env_path, spec)?;
        }
        info!(
            target: PROVISION_TARGET,
            path = %env_path.display(),
            dependencies = dependency_spec.map(|spec| spec.display().to_string()),
            "environment provisioned"
        );
        Ok(())
    }
}

/// Runs `command`, returning its stderr (or the spawn error) on failure.
fn run_step(command: &mut Command, step: &str) -> Result<(), String> {
    let program = command.get_program().to_owned();
    debug!(
        target: PROVISION_TARGET,
        step,
        program = ?program,
        args = ?command.get_args().collect::<Vec<_>>(),
        "running provisioning step"
    );
    let output = command
        .output()
        .map_err(|err| format!("failed to run {}: {err}", display_program(&program)))?;
    log_output(step, &output);
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        Err(if detail.is_empty() {
            format!("{} exited with {}", display_program(&program), output.status)
        } else {
            detail.to_owned()
        })
    }
}

fn log_output(step: &str, output: &Output) {
    debug!(
        target: PROVISION_TARGET,
        step,
        status = %output.status,
        stdout = %String::from_utf8_lossy(&output.stdout).trim(),
        stderr = %String::from_utf8_lossy(&output.stderr).trim(),
        "provisioning step finished"
    );
}

fn display_program(program: &OsStr) -> String {
    program.to_string_lossy().into_owned()
}
