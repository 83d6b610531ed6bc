//! Service container with explicit load-order construction
//!
//! Nothing here is auto-wired. The container is a map from service name to
//! a registered factory; building for a bundle is one loop over the
//! bundle's precomputed topological `service_load_order`, so every factory
//! can assume its required dependencies are already constructed. Singleton
//! services (the default) are memoized; transient declarations construct
//! per request.
//!
//! Container contents are frozen after [`ServiceContainer::instantiate_for_bundle`]
//! returns; agents receive handles during configuration and share them for
//! the lifetime of the run.

use crate::agent::{ServiceHandle, ServiceLookup};
use crate::bundle::GraphBundle;
use crate::declarations::ServiceDeclaration;
use crate::error::{AgentMapError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Factory constructing one service; dependencies are pulled from the
/// container, which the load order guarantees are present
pub type ServiceFactory = Arc<dyn Fn(&ServiceContainer) -> Result<ServiceHandle> + Send + Sync>;

struct ServiceRegistration {
    declaration: ServiceDeclaration,
    factory: ServiceFactory,
}

/// Dependency container for workflow services
#[derive(Default)]
pub struct ServiceContainer {
    registrations: HashMap<String, ServiceRegistration>,
    instances: RwLock<HashMap<String, ServiceHandle>>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service implementation. The declaration's
    /// `service_name` is the registry key; re-registering replaces.
    pub fn register(
        &mut self,
        declaration: ServiceDeclaration,
        factory: impl Fn(&ServiceContainer) -> Result<ServiceHandle> + Send + Sync + 'static,
    ) {
        self.registrations.insert(
            declaration.service_name.clone(),
            ServiceRegistration {
                declaration,
                factory: Arc::new(factory),
            },
        );
    }

    pub fn is_registered(&self, service_name: &str) -> bool {
        self.registrations.contains_key(service_name)
    }

    /// Construct every service in the bundle's load order.
    ///
    /// A name without a registration is a [`AgentMapError::MissingService`]:
    /// the declaration existed at analysis time, so its absence here is a
    /// deployment problem, not a graph problem.
    pub fn instantiate_for_bundle(&self, bundle: &GraphBundle) -> Result<()> {
        for service_name in &bundle.service_load_order {
            let registration = self
                .registrations
                .get(service_name)
                .ok_or_else(|| AgentMapError::MissingService(service_name.clone()))?;

            if !registration.declaration.singleton {
                continue;
            }
            if self.instances.read().expect("container lock").contains_key(service_name) {
                continue;
            }

            let handle = (registration.factory)(self)?;
            self.instances
                .write()
                .expect("container lock")
                .insert(service_name.clone(), handle);
            tracing::debug!(service = %service_name, "instantiated service");
        }
        Ok(())
    }

    /// Resolve a service handle. Singletons come from the memo; transient
    /// services construct on each call.
    pub fn get(&self, service_name: &str) -> Option<ServiceHandle> {
        if let Some(handle) = self
            .instances
            .read()
            .expect("container lock")
            .get(service_name)
        {
            return Some(handle.clone());
        }
        let registration = self.registrations.get(service_name)?;
        if registration.declaration.singleton {
            // Singleton not constructed: the caller skipped Phase A
            return None;
        }
        (registration.factory)(self).ok()
    }

    /// Typed resolution via downcast
    pub fn get_typed<T: Send + Sync + 'static>(&self, service_name: &str) -> Option<Arc<T>> {
        self.get(service_name)?.downcast::<T>().ok()
    }

    /// Snapshot of resolution decisions: service name to class path for
    /// every constructed singleton. Persisted into bundles so later loads
    /// can verify compatibility without re-resolving.
    pub fn registry_snapshot(&self) -> BTreeMap<String, String> {
        let instances = self.instances.read().expect("container lock");
        self.registrations
            .iter()
            .filter(|(name, _)| instances.contains_key(*name))
            .map(|(name, reg)| (name.clone(), reg.declaration.class_path.clone()))
            .collect()
    }
}

impl ServiceLookup for ServiceContainer {
    fn service(&self, name: &str) -> Option<ServiceHandle> {
        self.get(name)
    }
}
