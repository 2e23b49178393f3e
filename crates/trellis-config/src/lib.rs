//! Shared configuration for the Trellis plugin manager.
//!
//! Configuration is layered with [`ortho_config`]: built-in defaults are
//! overridden by a configuration file (`--config-path` or
//! `TRELLIS_CONFIG_PATH`), then by `TRELLIS_*` environment variables, and
//! finally by command-line flags. The daemon and the `trellis-token` helper
//! both resolve the same [`DataLayout`] from the loaded [`Config`].

mod defaults;
mod layout;
mod logging;

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LAUNCHER, DEFAULT_LISTEN_ADDRESS, DEFAULT_LOG_FILTER, DEFAULT_PYTHON,
    DEFAULT_REGISTRY_API, DEFAULT_REGISTRY_ORGANISATION, DEFAULT_REGISTRY_REFRESH_SECS,
    DEFAULT_STOP_GRACE_SECS, default_data_dir, default_listen_address, default_log_filter,
    default_log_format,
};
pub use layout::{DataLayout, LayoutError};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration for the daemon and helper binaries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TRELLIS")]
pub struct Config {
    /// Root directory for plugin sources, environments, and state.
    #[serde(default = "defaults::default_data_dir")]
    #[ortho_config(default = defaults::default_data_dir())]
    pub data_dir: Utf8PathBuf,
    /// Address the HTTP control plane binds to.
    #[serde(default = "defaults::default_listen_address")]
    #[ortho_config(default = defaults::default_listen_address())]
    pub listen_address: String,
    /// `tracing` filter expression.
    #[serde(default = "defaults::default_log_filter_string")]
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "defaults::default_log_format")]
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// GitHub organisation whose repositories form the plugin registry.
    #[serde(default = "defaults::default_registry_organisation")]
    #[ortho_config(default = defaults::default_registry_organisation())]
    pub registry_organisation: String,
    /// Base URL of the GitHub REST API.
    #[serde(default = "defaults::default_registry_api")]
    #[ortho_config(default = defaults::default_registry_api())]
    pub registry_api: String,
    /// Local catalogue file used instead of GitHub when set.
    #[serde(default)]
    pub registry_catalog: Option<Utf8PathBuf>,
    /// Seconds between catalogue refreshes; zero refreshes only at startup.
    #[serde(default = "defaults::default_registry_refresh_secs")]
    #[ortho_config(default = defaults::default_registry_refresh_secs())]
    pub registry_refresh_secs: u64,
    /// Interpreter used to create plugin environments.
    #[serde(default = "defaults::default_python")]
    #[ortho_config(default = defaults::default_python())]
    pub python: String,
    /// Launcher executable started inside a plugin environment.
    #[serde(default = "defaults::default_launcher")]
    #[ortho_config(default = defaults::default_launcher())]
    pub launcher: String,
    /// Seconds a plugin process may take to exit after SIGTERM.
    #[serde(default = "defaults::default_stop_grace_secs")]
    #[ortho_config(default = defaults::default_stop_grace_secs())]
    pub stop_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: defaults::default_data_dir(),
            listen_address: defaults::default_listen_address(),
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
            registry_organisation: defaults::default_registry_organisation(),
            registry_api: defaults::default_registry_api(),
            registry_catalog: None,
            registry_refresh_secs: defaults::default_registry_refresh_secs(),
            python: defaults::default_python(),
            launcher: defaults::default_launcher(),
            stop_grace_secs: defaults::default_stop_grace_secs(),
        }
    }
}

impl Config {
    /// Returns the configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the directory layout rooted at [`Config::data_dir`].
    #[must_use]
    pub fn layout(&self) -> DataLayout {
        DataLayout::from_config(self)
    }

    /// Returns the catalogue refresh interval, or `None` when periodic
    /// refresh is disabled.
    #[must_use]
    pub const fn refresh_interval(&self) -> Option<Duration> {
        if self.registry_refresh_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.registry_refresh_secs))
        }
    }

    /// Returns the grace period granted to plugin processes on stop.
    #[must_use]
    pub const fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}
