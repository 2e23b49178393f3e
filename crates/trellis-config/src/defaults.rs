//! Default values shared by the daemon and the helper binaries.

use camino::Utf8PathBuf;
use std::env;

use crate::logging::LogFormat;

/// Default HTTP listen address for the control plane.
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:15000";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default GitHub organisation scanned for plugin repositories.
pub const DEFAULT_REGISTRY_ORGANISATION: &str = "trellis-plugins";

/// Default base URL of the GitHub REST API.
pub const DEFAULT_REGISTRY_API: &str = "https://api.github.com";

/// Default interval between catalogue refreshes.
pub const DEFAULT_REGISTRY_REFRESH_SECS: u64 = 3600;

/// Default interpreter used to create plugin environments.
pub const DEFAULT_PYTHON: &str = "python3";

/// Default launcher executable resolved inside a plugin environment.
pub const DEFAULT_LAUNCHER: &str = "trellis-launch";

/// Default grace period granted to a plugin process after SIGTERM.
pub const DEFAULT_STOP_GRACE_SECS: u64 = 5;

/// Name of the directory created under the platform data directory.
const DATA_DIR_NAME: &str = "trellis";

/// Computes the default data directory.
///
/// Resolves to the platform data directory (for example
/// `~/.local/share/trellis`), falling back to the system temporary directory
/// when the platform offers none.
#[must_use]
pub fn default_data_dir() -> Utf8PathBuf {
    let base = dirs::data_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(fallback_base_directory);
    base.join(DATA_DIR_NAME)
}

fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

/// Owned listen address used where allocation is required (e.g. serde).
#[must_use]
pub fn default_listen_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_owned()
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Owned registry organisation.
#[must_use]
pub fn default_registry_organisation() -> String {
    DEFAULT_REGISTRY_ORGANISATION.to_owned()
}

/// Owned registry API base URL.
#[must_use]
pub fn default_registry_api() -> String {
    DEFAULT_REGISTRY_API.to_owned()
}

/// Refresh interval in seconds.
#[must_use]
pub const fn default_registry_refresh_secs() -> u64 {
    DEFAULT_REGISTRY_REFRESH_SECS
}

/// Owned interpreter name.
#[must_use]
pub fn default_python() -> String {
    DEFAULT_PYTHON.to_owned()
}

/// Owned launcher name.
#[must_use]
pub fn default_launcher() -> String {
    DEFAULT_LAUNCHER.to_owned()
}

/// Stop grace period in seconds.
#[must_use]
pub const fn default_stop_grace_secs() -> u64 {
    DEFAULT_STOP_GRACE_SECS
}
