//! Facade over the install and execution managers.
//!
//! [`PluginManager`] owns the catalog of known plugins, refreshed wholesale
//! from a [`RegistryClient`], and exposes the operations behind the HTTP
//! route table. Every mutating operation on a plugin runs under that
//! plugin's lock, so concurrent requests for one id are serialised while
//! requests for different ids proceed in parallel.

mod catalog;
mod errors;
mod routes;


use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, info};
use trellis_plugins::{
    ExecutionManager, InstallManager, KeyedLocks, PluginDescriptor, PluginId, StateProjector,
};

use crate::health::HealthReporter;
use crate::registry::{RegistryClient, RegistryError};

pub use self::catalog::{Catalog, CatalogEntry, PluginSummary};
pub use self::errors::ManagerError;
pub use self::routes::{Handler, Method, Reply, Route};

pub(crate) const MANAGER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::manager");

/// Catalog owner and dispatcher for plugin operations.
pub struct PluginManager {
    install: Arc<InstallManager>,
    execution: Arc<ExecutionManager>,
    projector: StateProjector,
    registry: Box<dyn RegistryClient>,
    reporter: Arc<dyn HealthReporter>,
    catalog: RwLock<Arc<Catalog>>,
    locks: KeyedLocks<PluginId>,
}

impl PluginManager {
    /// Creates a manager with an empty catalog; call
    /// [`PluginManager::refresh`] to populate it.
    #[must_use]
    pub fn new(
        install: Arc<InstallManager>,
        execution: Arc<ExecutionManager>,
        registry: impl RegistryClient + 'static,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        let projector = StateProjector::new(Arc::clone(&install), Arc::clone(&execution));
        Self {
            install,
            execution,
            projector,
            registry: Box::new(registry),
            reporter,
            catalog: RwLock::new(Arc::new(Catalog::default())),
            locks: KeyedLocks::new(),
        }
    }

    /// Route table served by the transport.
    #[must_use]
    pub const fn routes(&self) -> &'static [Route] {
        &routes::ROUTES
    }

    /// Finds the route for `method` and `suffix` and invokes it.
    ///
    /// Returns `None` when no route matches.
    #[must_use]
    pub fn dispatch(&self, method: Method, suffix: &str, params: &Value) -> Option<Reply> {
        self.routes()
            .iter()
            .find(|route| route.method == method && route.suffix == suffix)
            .map(|route| route.invoke(self, params))
    }

    /// Current catalog snapshot.
    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the catalog with the registry's current plugins.
    ///
    /// Entries that do not declare themselves plugins are skipped. On
    /// failure the previous catalog stays in place.
    ///
    /// # Errors
    ///
    /// Returns the [`RegistryError`] reported by the registry client.
    pub fn refresh(&self) -> Result<usize, RegistryError> {
        let entries = match self.registry.list_entries() {
            Ok(entries) => entries,
            Err(error) => {
                self.reporter.catalog_refresh_failed(&error);
                return Err(error);
            }
        };
        let catalog = Catalog::from_entries(
            entries
                .iter()
                .filter(|entry| entry.is_plugin)
                .map(|entry| {
                    let descriptor = entry.descriptor();
                    let state = self.projector.project(&descriptor);
                    CatalogEntry::new(descriptor, state)
                }),
        );
        let count = catalog.len();
        debug!(
            target: MANAGER_TARGET,
            listed = entries.len(),
            plugins = count,
            "registry listing filtered"
        );
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(catalog);
        self.reporter.catalog_refreshed(count);
        Ok(count)
    }

    /// Summaries of every catalogued plugin.
    #[must_use]
    pub fn list(&self) -> Vec<PluginSummary> {
        self.catalog().summaries()
    }

    /// Fetches and provisions `id`.
    ///
    /// # Errors
    ///
    /// [`ManagerError::NotFound`] for unknown ids and
    /// [`ManagerError::Install`] when installation fails.
    pub fn install(&self, id: &PluginId) -> Result<PluginSummary, ManagerError> {
        let descriptor = self.descriptor(id)?;
        self.locks.with_lock(id, || {
            let outcome = self.install.install(&descriptor);
            let summary = self.reproject(&descriptor);
            outcome.map(|_| summary).map_err(ManagerError::from)
        })
    }

    /// Removes `id`'s source and environment, stopping it first if running.
    ///
    /// # Errors
    ///
    /// [`ManagerError::NotFound`] for unknown ids.
    pub fn uninstall(&self, id: &PluginId) -> Result<PluginSummary, ManagerError> {
        let descriptor = self.descriptor(id)?;
        self.locks.with_lock(id, || {
            if self.execution.deactivate(id).is_ok() {
                self.reporter.plugin_stopped(id);
            }
            self.install.uninstall(id);
            info!(target: MANAGER_TARGET, plugin = %id, "plugin uninstalled");
            Ok(self.reproject(&descriptor))
        })
    }

    /// Starts `id`.
    ///
    /// # Errors
    ///
    /// [`ManagerError::NotFound`], [`ManagerError::NotInstalled`], or the
    /// execution manager's refusal or start failure.
    pub fn activate(&self, id: &PluginId) -> Result<(), ManagerError> {
        let descriptor = self.descriptor(id)?;
        self.locks.with_lock(id, || {
            let installed = self
                .install
                .installed(id)
                .ok_or_else(|| ManagerError::NotInstalled { id: id.clone() })?;
            let was_active = self.execution.is_active(id);
            let outcome = self.execution.activate(&descriptor, &installed);
            self.reproject(&descriptor);
            outcome?;
            if !was_active {
                self.reporter.plugin_started(id);
            }
            Ok(())
        })
    }

    /// Stops `id`.
    ///
    /// # Errors
    ///
    /// [`ManagerError::NotFound`] or
    /// [`ExecutionError::NotActive`](trellis_plugins::ExecutionError::NotActive).
    pub fn deactivate(&self, id: &PluginId) -> Result<(), ManagerError> {
        let descriptor = self.descriptor(id)?;
        self.locks.with_lock(id, || {
            let outcome = self.execution.deactivate(id);
            self.reproject(&descriptor);
            outcome?;
            self.reporter.plugin_stopped(id);
            Ok(())
        })
    }

    /// Stores a new secret token for `id`.
    ///
    /// # Errors
    ///
    /// [`ManagerError::NotFound`], or
    /// [`ExecutionError::InvalidToken`](trellis_plugins::ExecutionError::InvalidToken)
    /// for blank tokens.
    pub fn update_token(&self, id: &PluginId, token: &str) -> Result<PluginSummary, ManagerError> {
        let descriptor = self.descriptor(id)?;
        self.locks.with_lock(id, || {
            self.execution.update_token(id, token)?;
            Ok(self.reproject(&descriptor))
        })
    }

    /// Sets the enabled flag for `id`.
    ///
    /// # Errors
    ///
    /// [`ManagerError::NotFound`] or a store failure.
    pub fn enable(&self, id: &PluginId) -> Result<PluginSummary, ManagerError> {
        let descriptor = self.descriptor(id)?;
        self.locks.with_lock(id, || {
            self.execution.enable(id)?;
            Ok(self.reproject(&descriptor))
        })
    }

    /// Clears the enabled flag for `id`, stopping it first if running.
    ///
    /// # Errors
    ///
    /// [`ManagerError::NotFound`] or a store failure.
    pub fn disable(&self, id: &PluginId) -> Result<PluginSummary, ManagerError> {
        let descriptor = self.descriptor(id)?;
        self.locks.with_lock(id, || {
            let was_active = self.execution.is_active(id);
            let outcome = self.execution.disable(id);
            let summary = self.reproject(&descriptor);
            if was_active && !self.execution.is_active(id) {
                self.reporter.plugin_stopped(id);
            }
            outcome.map(|()| summary).map_err(ManagerError::from)
        })
    }

    /// Stops every running plugin.
    pub fn shutdown(&self) {
        let active = self.execution.active_ids();
        self.execution.shutdown_all();
        for id in &active {
            self.reporter.plugin_stopped(id);
        }
        info!(
            target: MANAGER_TARGET,
            stopped = active.len(),
            "plugin manager shut down"
        );
    }

    pub(crate) fn descriptor(&self, id: &PluginId) -> Result<PluginDescriptor, ManagerError> {
        self.catalog()
            .get(id)
            .map(|entry| entry.descriptor().clone())
            .ok_or_else(|| ManagerError::NotFound { id: id.clone() })
    }

    /// Re-projects one plugin and publishes a catalog containing the result.
    fn reproject(&self, descriptor: &PluginDescriptor) -> PluginSummary {
        let entry = CatalogEntry::new(descriptor.clone(), self.projector.project(descriptor));
        let summary = entry.summary();
        let mut published = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        // Skip plugins dropped by a concurrent refresh.
        if published.get(descriptor.id()).is_some() {
            let mut next = Catalog::clone(&published);
            next.insert(entry);
            *published = Arc::new(next);
        }
        summary
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("install", &self.install)
            .field("execution", &self.execution)
            .field("plugins", &self.catalog().len())
            .finish_non_exhaustive()
    }
}
