//! Type-keyed service container a resolver is constructed from.
//!
//! The host application puts shared collaborators here (most importantly a
//! [`SharedRegistry`](crate::plugin::SharedRegistry)); resolvers probe for them
//! instead of reaching for global state.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;

#[derive(Default)]
pub struct ServiceContainer {
    services: HashMap<TypeId, (&'static str, Box<dyn Any + Send + Sync>)>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service`, returning the one it replaced.
    pub fn insert<S: Any + Send + Sync>(&mut self, service: S) -> Option<S> {
        self.services
            .insert(TypeId::of::<S>(), (type_name::<S>(), Box::new(service)))
            .and_then(|(_, previous)| previous.downcast::<S>().ok())
            .map(|previous| *previous)
    }

    pub fn get<S: Any + Send + Sync>(&self) -> Option<&S> {
        self.services.get(&TypeId::of::<S>()).and_then(|(_, service)| service.downcast_ref::<S>())
    }

    pub fn remove<S: Any + Send + Sync>(&mut self) -> Option<S> {
        self.services
            .remove(&TypeId::of::<S>())
            .and_then(|(_, service)| service.downcast::<S>().ok())
            .map(|service| *service)
    }

    pub fn contains<S: Any + Send + Sync>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<S>())
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.services.values().map(|(name, _)| name)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PluginRegistry, SharedRegistry};
    use std::sync::Arc;

    #[test]
    fn stores_one_service_per_type() {
        let mut services = ServiceContainer::new();
        assert!(services.insert(7u32).is_none());
        assert_eq!(services.insert(9u32), Some(7));
        assert_eq!(services.get::<u32>(), Some(&9));
        assert!(services.get::<u64>().is_none());
        assert_eq!(services.remove::<u32>(), Some(9));
        assert!(!services.contains::<u32>());
    }

    #[test]
    fn shared_registry_is_found_by_its_handle_type() {
        let mut services = ServiceContainer::new();
        let registry = PluginRegistry::shared();
        services.insert(Arc::clone(&registry));
        let found = services.get::<SharedRegistry>().unwrap();
        assert!(Arc::ptr_eq(found, &registry));
    }
}
