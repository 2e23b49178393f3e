//! Enable/disable state, secret tokens, and the set of running plugins.
//!
//! The [`ExecutionManager`] owns the persisted [`ExecutionRecord`]s and the
//! in-memory active set. A plugin is enabled only when its record is enabled
//! *and* carries a non-blank token; it is active exactly when it has an entry
//! in the active set. Disabling an active plugin deactivates it first, so an
//! active plugin is always enabled.
//!
//! Callers serialise operations per plugin id; the manager itself only guards
//! the shared active set.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::capability::{LaunchContext, PluginService, ServiceProviders};
use crate::descriptor::{InstalledPlugin, PluginDescriptor};
use crate::error::{ExecutionError, StoreError};
use crate::identity::PluginId;
use crate::store::{ExecutionRecord, ExecutionStore};

/// Tracing target for execution operations.
const EXECUTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::execution");

/// A running plugin service owned by the active set.
pub struct RuntimePluginHandle {
    id: PluginId,
    service: Box<dyn PluginService>,
}

impl RuntimePluginHandle {
    /// Plugin identifier.
    #[must_use]
    pub const fn id(&self) -> &PluginId {
        &self.id
    }
}

impl std::fmt::Debug for RuntimePluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimePluginHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Persists execution records and supervises running plugins.
pub struct ExecutionManager {
    store: Arc<dyn ExecutionStore>,
    providers: ServiceProviders,
    active: Mutex<HashMap<PluginId, RuntimePluginHandle>>,
}

impl ExecutionManager {
    /// Creates a manager over `store` using `providers` to launch services.
    #[must_use]
    pub fn new(store: Arc<dyn ExecutionStore>, providers: ServiceProviders) -> Self {
        Self {
            store,
            providers,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Providers used to resolve and launch services.
    #[must_use]
    pub const fn providers(&self) -> &ServiceProviders {
        &self.providers
    }

    fn active_set(&self) -> MutexGuard<'_, HashMap<PluginId, RuntimePluginHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the record for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns the store failure.
    pub fn record(&self, id: &PluginId) -> Result<Option<ExecutionRecord>, StoreError> {
        self.store.load(id)
    }

    /// Returns `true` when the record exists, is enabled, and has a token.
    ///
    /// Store failures are logged and reported as not enabled.
    #[must_use]
    pub fn is_enabled(&self, id: &PluginId) -> bool {
        match self.store.load(id) {
            Ok(record) => record.is_some_and(|r| r.enabled && r.has_token()),
            Err(err) => {
                warn!(
                    target: EXECUTION_TARGET,
                    plugin = %id,
                    error = %err,
                    "failed to read execution record"
                );
                false
            }
        }
    }

    /// Marks `id` enabled, creating its record if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Store`] when the record cannot be saved.
    pub fn enable(&self, id: &PluginId) -> Result<(), ExecutionError> {
        self.store.update(id, &mut |record| record.enabled = true)?;
        info!(target: EXECUTION_TARGET, plugin = %id, "plugin enabled");
        Ok(())
    }

    /// Marks `id` disabled, deactivating it first when it is running.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Store`] when the record cannot be saved.
    pub fn disable(&self, id: &PluginId) -> Result<(), ExecutionError> {
        if self.is_active(id) {
            debug!(
                target: EXECUTION_TARGET,
                plugin = %id,
                "deactivating plugin before disabling"
            );
            self.stop_if_active(id);
        }
        self.store.update(id, &mut |record| record.enabled = false)?;
        info!(target: EXECUTION_TARGET, plugin = %id, "plugin disabled");
        Ok(())
    }

    /// Stores a new secret token for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::InvalidToken`] for blank tokens, leaving the
    /// record untouched, or [`ExecutionError::Store`] when saving fails.
    pub fn update_token(&self, id: &PluginId, token: &str) -> Result<(), ExecutionError> {
        if token.trim().is_empty() {
            return Err(ExecutionError::InvalidToken { id: id.clone() });
        }
        self.store
            .update(id, &mut |record| record.app_secret_token = token.to_owned())?;
        info!(target: EXECUTION_TARGET, plugin = %id, "plugin token updated");
        Ok(())
    }

    /// Returns `true` when `id` is in the active set.
    #[must_use]
    pub fn is_active(&self, id: &PluginId) -> bool {
        self.active_set().contains_key(id)
    }

    /// Identifiers of every running plugin, sorted.
    #[must_use]
    pub fn active_ids(&self) -> Vec<PluginId> {
        let mut ids: Vec<_> = self.active_set().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Starts the plugin and adds it to the active set.
    ///
    /// Activating a running plugin succeeds without doing anything.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::NotEnabled`] when the plugin is disabled or
    /// has no token, and [`ExecutionError::StartFailed`] when it cannot be
    /// launched or does not become ready within its start timeout.
    pub fn activate(
        &self,
        descriptor: &PluginDescriptor,
        installed: &InstalledPlugin,
    ) -> Result<(), ExecutionError> {
        let id = descriptor.id();
        let record = self.store.load(id)?.unwrap_or_default();
        if !(record.enabled && record.has_token()) {
            return Err(ExecutionError::NotEnabled { id: id.clone() });
        }
        if self.is_active(id) {
            debug!(target: EXECUTION_TARGET, plugin = %id, "plugin already active");
            return Ok(());
        }

        let service = self.launch(id, installed, record.app_secret_token)?;
        let duplicate = match self.active_set().entry(id.clone()) {
            Entry::Occupied(_) => Some(service),
            Entry::Vacant(slot) => {
                slot.insert(RuntimePluginHandle {
                    id: id.clone(),
                    service,
                });
                None
            }
        };
        if let Some(mut extra) = duplicate {
            stop_quietly(id, extra.as_mut());
            return Ok(());
        }
        info!(
            target: EXECUTION_TARGET,
            plugin = %id,
            name = descriptor.name(),
            "plugin activated"
        );
        Ok(())
    }

    fn launch(
        &self,
        id: &PluginId,
        installed: &InstalledPlugin,
        token: String,
    ) -> Result<Box<dyn PluginService>, ExecutionError> {
        let start_failed = |message: String| ExecutionError::StartFailed {
            id: id.clone(),
            message,
        };
        let manifest = installed
            .manifest()
            .ok_or_else(|| start_failed(String::from("plugin.json is missing or invalid")))?;
        let entry = manifest
            .entry_point()
            .map_err(|err| start_failed(err.to_string()))?;
        let provider = self.providers.get(manifest.kind()).ok_or_else(|| {
            start_failed(format!("no service provider for kind '{}'", manifest.kind()))
        })?;

        let context = LaunchContext {
            plugin_id: id.clone(),
            token,
            config: manifest.config_value(),
            install_path: installed.install_path().to_path_buf(),
            env_path: installed.env_path().to_path_buf(),
            entry,
        };
        let mut service = provider
            .create(context)
            .map_err(|err| start_failed(err.to_string()))?;

        let timeout = manifest.start_timeout();
        let outcome = service
            .start()
            .and_then(|()| service.wait_until_ready(timeout));
        match outcome {
            Ok(true) => Ok(service),
            Ok(false) => {
                stop_quietly(id, service.as_mut());
                Err(start_failed(format!("not ready after {timeout:?}")))
            }
            Err(err) => {
                stop_quietly(id, service.as_mut());
                Err(start_failed(err.to_string()))
            }
        }
    }

    /// Stops the plugin and removes it from the active set.
    ///
    /// The handle is removed even when stopping fails.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::NotActive`] when the plugin is not running.
    pub fn deactivate(&self, id: &PluginId) -> Result<(), ExecutionError> {
        if self.stop_if_active(id) {
            Ok(())
        } else {
            Err(ExecutionError::NotActive { id: id.clone() })
        }
    }

    /// Deactivates `id` when running; returns whether it was.
    fn stop_if_active(&self, id: &PluginId) -> bool {
        let removed = self.active_set().remove(id);
        let Some(mut handle) = removed else {
            return false;
        };
        stop_quietly(id, handle.service.as_mut());
        info!(target: EXECUTION_TARGET, plugin = %id, "plugin deactivated");
        true
    }

    /// Stops every running plugin, emptying the active set.
    pub fn shutdown_all(&self) {
        let handles: Vec<_> = self.active_set().drain().collect();
        for (id, mut handle) in handles {
            stop_quietly(&id, handle.service.as_mut());
        }
        debug!(target: EXECUTION_TARGET, "all plugins stopped");
    }
}

fn stop_quietly(id: &PluginId, service: &mut dyn PluginService) {
    if let Err(err) = service.stop() {
        warn!(
            target: EXECUTION_TARGET,
            plugin = %id,
            error = %err,
            "plugin did not stop cleanly"
        );
    }
}

impl std::fmt::Debug for ExecutionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionManager")
            .field("providers", &self.providers)
            .field("active", &self.active_ids())
            .finish_non_exhaustive()
    }
}
