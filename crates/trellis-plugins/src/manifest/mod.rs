//! Plugin manifest (`plugin.json`) parsing.
//!
//! Every plugin carries a `plugin.json` at its root naming the service entry
//! point and, optionally, a dependency specification, an opaque configuration
//! object, a start timeout, and the service kind. Parsing distinguishes a
//! missing file, malformed JSON, a missing required field, and a malformed
//! `service` reference so projections can report each case precisely.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capability::ServiceKind;
use crate::error::ManifestError;

/// File name of the manifest at a plugin root.
pub const MANIFEST_FILE: &str = "plugin.json";

/// Dependency specification used when the manifest declares none.
pub const DEFAULT_DEPENDENCY_SPEC: &str = "requirements.txt";

/// Default time to wait for a plugin to become ready.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(30);

/// A `module.Class` entry point reference.
///
/// The module part may itself be dotted; the class is everything after the
/// final `.`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    module: String,
    class: String,
}

impl EntryPoint {
    /// Parses a dotted `module.Class` reference.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::BadService`] when the reference has no `.`
    /// or either half is empty.
    pub fn parse(service: &str) -> Result<Self, ManifestError> {
        let bad = || ManifestError::BadService {
            service: service.to_owned(),
        };
        let (module, class) = service.trim().rsplit_once('.').ok_or_else(bad)?;
        if module.is_empty() || class.is_empty() || module.split('.').any(str::is_empty) {
            return Err(bad());
        }
        Ok(Self {
            module: module.to_owned(),
            class: class.to_owned(),
        })
    }

    /// Returns the dotted module path.
    #[must_use]
    pub const fn module(&self) -> &str {
        self.module.as_str()
    }

    /// Returns the class name.
    #[must_use]
    pub const fn class(&self) -> &str {
        self.class.as_str()
    }

    /// Returns the full `module.Class` reference.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.module, self.class)
    }
}

/// Parsed contents of a plugin's `plugin.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config: Option<Map<String, Value>>,
    #[serde(default = "default_start_timeout", with = "timeout_secs")]
    start_timeout: Duration,
    #[serde(default)]
    kind: ServiceKind,
}

const fn default_start_timeout() -> Duration {
    DEFAULT_START_TIMEOUT
}

/// `start_timeout` as a JSON number of seconds, integral or fractional.
mod timeout_secs {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        timeout: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(timeout.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(D::Error::custom(
                "start_timeout must be a positive number of seconds",
            ));
        }
        Duration::try_from_secs_f64(seconds).map_err(D::Error::custom)
    }
}

impl PluginManifest {
    /// Creates a manifest for `service` with every optional field defaulted.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            deps: None,
            config: None,
            start_timeout: DEFAULT_START_TIMEOUT,
            kind: ServiceKind::default(),
        }
    }

    /// Sets the dependency specification path.
    #[must_use]
    pub fn with_deps(mut self, deps: impl Into<String>) -> Self {
        self.deps = Some(deps.into());
        self
    }

    /// Sets the opaque plugin configuration.
    #[must_use]
    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the start timeout.
    #[must_use]
    pub const fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Sets the service kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: ServiceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Reads and validates `plugin.json` from `plugin_root`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::NotFound`] when the file is absent,
    /// [`ManifestError::Parse`] when it is not a JSON object of the right
    /// shape, [`ManifestError::MissingField`] when `service` is absent, and
    /// [`ManifestError::Io`] when it cannot be read.
    pub fn load(plugin_root: &Path) -> Result<Self, ManifestError> {
        let path = plugin_root.join(MANIFEST_FILE);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound { path });
            }
            Err(err) => {
                return Err(ManifestError::Io {
                    path,
                    source: Arc::new(err),
                });
            }
        };
        Self::parse(&path, &contents)
    }

    /// Parses manifest text read from `path`.
    ///
    /// # Errors
    ///
    /// See [`PluginManifest::load`].
    pub fn parse(path: &Path, contents: &str) -> Result<Self, ManifestError> {
        let parse_error = |message: String| ManifestError::Parse {
            path: path.to_path_buf(),
            message,
        };
        let document: Value =
            serde_json::from_str(contents).map_err(|err| parse_error(err.to_string()))?;
        let Value::Object(fields) = document else {
            return Err(parse_error(String::from("expected a JSON object")));
        };
        if !fields.contains_key("service") {
            return Err(ManifestError::MissingField { field: "service" });
        }
        serde_json::from_value(Value::Object(fields)).map_err(|err| parse_error(err.to_string()))
    }

    /// Returns the raw `service` reference.
    #[must_use]
    pub const fn service(&self) -> &str {
        self.service.as_str()
    }

    /// Parses the `service` reference into an [`EntryPoint`].
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::BadService`] for malformed references.
    pub fn entry_point(&self) -> Result<EntryPoint, ManifestError> {
        EntryPoint::parse(&self.service)
    }

    /// Returns the declared dependency specification, if any.
    #[must_use]
    pub fn deps(&self) -> Option<&str> {
        self.deps.as_deref()
    }

    /// Returns the plugin's opaque configuration, if any.
    #[must_use]
    pub const fn config(&self) -> Option<&Map<String, Value>> {
        self.config.as_ref()
    }

    /// Returns the configuration as a JSON value, `{}` when absent.
    #[must_use]
    pub fn config_value(&self) -> Value {
        Value::Object(self.config.clone().unwrap_or_default())
    }

    /// Returns the start timeout.
    #[must_use]
    pub const fn start_timeout(&self) -> Duration {
        self.start_timeout
    }

    /// Returns the declared service kind.
    #[must_use]
    pub const fn kind(&self) -> ServiceKind {
        self.kind
    }
}

/// Locates the dependency specification for a fetched plugin tree.
///
/// Uses the manifest's `deps` entry when the manifest parses and declares
/// one, otherwise `requirements.txt` at the root when it exists. A manifest
/// that fails to parse is not an error here; projection reports it.
#[must_use]
pub fn dependency_spec(plugin_root: &Path) -> Option<PathBuf> {
    let declared = PluginManifest::load(plugin_root)
        .ok()
        .and_then(|manifest| manifest.deps().map(|deps| plugin_root.join(deps)));
    if declared.is_some() {
        return declared;
    }
    let fallback = plugin_root.join(DEFAULT_DEPENDENCY_SPEC);
    fallback.is_file().then_some(fallback)
}
