//! Stable plugin identifiers derived from source locations.
//!
//! A plugin's identity is a pure function of its source URL, so the same
//! repository always maps to the same on-disk directories and the same
//! persisted execution record regardless of which registry listed it.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of digest bytes kept in an identifier (two hex characters each).
const ID_BYTES: usize = 16;

/// Opaque, filesystem-safe identifier for a plugin.
///
/// Identifiers computed by [`plugin_id`] are always 32 lowercase hex
/// characters. [`PluginId::new`] accepts any string so catalogue entries and
/// request bodies can be looked up without recomputing the digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    /// Wraps an existing identifier string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Computes the identifier for a source URL.
    #[must_use]
    pub fn from_source(source_url: &str) -> Self {
        plugin_id(source_url)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PluginId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives the stable identifier for `source_url`.
///
/// Surrounding whitespace and trailing slashes are ignored so
/// `https://host/repo` and `https://host/repo/` name the same plugin.
#[must_use]
pub fn plugin_id(source_url: &str) -> PluginId {
    let normalised = normalise_source(source_url);
    let digest = Sha256::digest(normalised.as_bytes());
    let prefix = digest.get(..ID_BYTES).unwrap_or(digest.as_slice());
    PluginId(hex::encode(prefix))
}

fn normalise_source(source_url: &str) -> &str {
    source_url.trim().trim_end_matches('/')
}

#[cfg(test)]
mod tests;
