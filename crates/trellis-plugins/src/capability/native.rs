//! In-process plugin services built from registered factories.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::{LaunchContext, PluginService, ServiceKind, ServiceProvider};
use crate::error::{ResolveError, ServiceError};
use crate::manifest::EntryPoint;

/// Builds a service for a launch context.
pub type NativeFactory = Arc<dyn Fn(&LaunchContext) -> Box<dyn PluginService> + Send + Sync>;

/// Provider for services compiled into the host, keyed by `module.Class`.
#[derive(Clone, Default)]
pub struct NativeProvider {
    factories: HashMap<String, NativeFactory>,
}

impl NativeProvider {
    /// Creates a provider with no registered services.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under the `module.Class` reference `service`.
    pub fn register<F>(&mut self, service: impl Into<String>, factory: F)
    where
        F: Fn(&LaunchContext) -> Box<dyn PluginService> + Send + Sync + 'static,
    {
        self.factories.insert(service.into(), Arc::new(factory));
    }

    fn knows_module(&self, module: &str) -> bool {
        self.factories.keys().any(|service| {
            EntryPoint::parse(service).is_ok_and(|entry| entry.module() == module)
        })
    }
}

impl ServiceProvider for NativeProvider {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Native
    }

    fn resolve(&self, entry: &EntryPoint, _install_path: &Path) -> Result<(), ResolveError> {
        if self.factories.contains_key(&entry.qualified()) {
            return Ok(());
        }
        if self.knows_module(entry.module()) {
            return Err(ResolveError::ClassMissing {
                module: entry.module().to_owned(),
                class: entry.class().to_owned(),
            });
        }
        Err(ResolveError::ModuleMissing {
            module: entry.module().to_owned(),
        })
    }

    fn create(&self, context: LaunchContext) -> Result<Box<dyn PluginService>, ServiceError> {
        let service = context.entry.qualified();
        let factory = self
            .factories
            .get(&service)
            .ok_or(ServiceError::Unresolved { service })?;
        Ok(factory(&context))
    }
}

impl fmt::Debug for NativeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut services: Vec<_> = self.factories.keys().collect();
        services.sort();
        f.debug_struct("NativeProvider")
            .field("services", &services)
            .finish()
    }
}
