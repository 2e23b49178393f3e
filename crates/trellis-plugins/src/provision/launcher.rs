//! The `trellis-launch` script written into every provisioned environment.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// File name of the launcher inside an environment's `bin` directory.
pub const LAUNCHER_NAME: &str = "trellis-launch";

const LAUNCHER_SOURCE: &str = include_str!("trellis_launch.py");

const LAUNCHER_MODE: u32 = 0o755;

/// Writes the launcher into `env_path/bin`, run by `interpreter`.
///
/// An absolute interpreter is used directly in the shebang line; a bare name
/// is resolved through `/usr/bin/env`. Returns the launcher path.
///
/// # Errors
///
/// Returns the underlying I/O error when the directory or file cannot be
/// written.
pub fn install_launcher(env_path: &Path, interpreter: &Path) -> io::Result<PathBuf> {
    let bin = env_path.join("bin");
    fs::create_dir_all(&bin)?;
    let path = bin.join(LAUNCHER_NAME);
    let shebang = if interpreter.is_absolute() {
        format!("#!{}", interpreter.display())
    } else {
        format!("#!/usr/bin/env {}", interpreter.display())
    };
    fs::write(&path, format!("{shebang}\n{LAUNCHER_SOURCE}"))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(LAUNCHER_MODE))?;
    Ok(path)
}
