//! In-memory catalog of known plugins and their rendered summaries.

use std::collections::BTreeMap;

use serde::Serialize;
use trellis_plugins::{FullPluginState, PluginDescriptor, PluginId};

/// Last-known descriptor and state of one plugin.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    descriptor: PluginDescriptor,
    state: FullPluginState,
}

impl CatalogEntry {
    /// Pairs a descriptor with its projected state.
    #[must_use]
    pub const fn new(descriptor: PluginDescriptor, state: FullPluginState) -> Self {
        Self { descriptor, state }
    }

    /// Registry descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// State at the time of the last projection.
    #[must_use]
    pub const fn state(&self) -> &FullPluginState {
        &self.state
    }

    /// Renders the externally visible summary.
    #[must_use]
    pub fn summary(&self) -> PluginSummary {
        PluginSummary {
            id: self.descriptor.id().clone(),
            name: self.descriptor.name().to_owned(),
            description: self.descriptor.description().to_owned(),
            url: self.descriptor.source_url().to_owned(),
            installed: self.state.installed,
            enabled: self.state.enabled,
            active: self.state.active,
            errors: self.state.errors.clone(),
        }
    }
}

/// Snapshot of every catalogued plugin, keyed by id.
///
/// Snapshots are immutable once published; updates build a new catalog and
/// swap it in.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<PluginId, CatalogEntry>,
}

impl Catalog {
    /// Builds a catalog from entries; later duplicates of an id win.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut catalog = Self::default();
        for entry in entries {
            catalog.insert(entry);
        }
        catalog
    }

    /// Inserts or replaces the entry for its id.
    pub fn insert(&mut self, entry: CatalogEntry) {
        self.entries.insert(entry.descriptor.id().clone(), entry);
    }

    /// Entry for `id`.
    #[must_use]
    pub fn get(&self, id: &PluginId) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    /// Number of catalogued plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no plugins are catalogued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summaries ordered by name, then id.
    #[must_use]
    pub fn summaries(&self) -> Vec<PluginSummary> {
        let mut summaries: Vec<_> = self.entries.values().map(CatalogEntry::summary).collect();
        summaries.sort_by(|left, right| {
            left.name
                .cmp(&right.name)
                .then_with(|| left.id.cmp(&right.id))
        });
        summaries
    }
}

/// Body returned for each plugin by the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginSummary {
    /// Plugin identifier.
    pub id: PluginId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Source location.
    pub url: String,
    /// Source and environment are present.
    pub installed: bool,
    /// Enabled with a non-blank token.
    pub enabled: bool,
    /// Running.
    pub active: bool,
    /// Entry point problems; omitted when there are none.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}
