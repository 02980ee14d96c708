//! Dependency resolution collaborator.
//!
//! The mapper does not own a container. Anything able to resolve a service
//! by contract name can assemble a [`MapperContext`]; [`ServiceRegistry`] is
//! a minimal in-process implementation.
//!
//! [`MapperContext`]: crate::MapperContext

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use common::{MapperError, MapperResult};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Contract names understood by `MapperContext::from_resolver`.
pub mod contracts {
    /// `Arc<dyn ItemStore>` (required)
    pub const ITEM_STORE: &str = "mapper.item_store";
    /// `MapperConfig`
    pub const SETTINGS: &str = "mapper.settings";
    /// `Arc<ConfigurationCache>`, to share one cache between contexts.
    /// Entries are keyed by type key alone, so every sharing context must
    /// hold the same declarations and resolver.
    pub const CONFIGURATION_CACHE: &str = "mapper.configuration_cache";
    /// `Vec<Arc<dyn DataMapper>>`, custom strategies ahead of the defaults
    pub const DATA_MAPPERS: &str = "mapper.data_mappers";
    /// `TaskChain<dyn ConfigurationTask>`
    pub const CONFIGURATION_TASKS: &str = "mapper.configuration_tasks";
    /// `TaskChain<dyn ConstructionTask>`
    pub const CONSTRUCTION_TASKS: &str = "mapper.construction_tasks";
    /// `TaskChain<dyn SavingTask>`
    pub const SAVING_TASKS: &str = "mapper.saving_tasks";
}

/// Shared service handle
pub type Service = Arc<dyn Any + Send + Sync>;

/// Resolves services by contract name.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
pub trait DependencyResolver: Send + Sync {
    fn resolve(&self, contract: &str) -> Option<Service>;
}

/// Resolve a required service and clone it out as `T`
pub fn resolve_as<T>(resolver: &dyn DependencyResolver, contract: &str) -> MapperResult<T>
where
    T: Any + Clone + Send + Sync,
{
    resolve_optional(resolver, contract)?.ok_or_else(|| MapperError::dependency(contract))
}

/// Resolve an optional service; a registration of the wrong type is an error
pub fn resolve_optional<T>(
    resolver: &dyn DependencyResolver,
    contract: &str,
) -> MapperResult<Option<T>>
where
    T: Any + Clone + Send + Sync,
{
    let Some(service) = resolver.resolve(contract) else {
        return Ok(None);
    };
    service.downcast_ref::<T>().cloned().map(Some).ok_or_else(|| {
        MapperError::dependency(format!(
            "{} is not a {}",
            contract,
            std::any::type_name::<T>()
        ))
    })
}

/// Map-backed [`DependencyResolver`].
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Service>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `contract`, replacing any earlier registration
    pub fn register<T>(&self, contract: impl Into<String>, value: T) -> &Self
    where
        T: Any + Send + Sync,
    {
        self.services.write().insert(contract.into(), Arc::new(value));
        self
    }

    pub fn unregister(&self, contract: &str) -> bool {
        self.services.write().remove(contract).is_some()
    }

    pub fn contains(&self, contract: &str) -> bool {
        self.services.read().contains_key(contract)
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl DependencyResolver for ServiceRegistry {
    fn resolve(&self, contract: &str) -> Option<Service> {
        self.services.read().get(contract).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::MapperConfig;

    #[test]
    fn test_registry_round_trips_typed_services() {
        let registry = ServiceRegistry::new();
        registry.register(
            contracts::SETTINGS,
            MapperConfig {
                lazy_by_default: true,
                ..MapperConfig::default()
            },
        );

        let settings: MapperConfig = resolve_as(&registry, contracts::SETTINGS).unwrap();
        assert!(settings.lazy_by_default);
    }

    #[test]
    fn test_missing_required_service() {
        let registry = ServiceRegistry::new();
        let err = resolve_as::<MapperConfig>(&registry, contracts::ITEM_STORE).unwrap_err();
        assert_eq!(err, MapperError::dependency(contracts::ITEM_STORE));
        assert!(resolve_optional::<MapperConfig>(&registry, contracts::SETTINGS)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_wrong_type_is_reported() {
        let registry = ServiceRegistry::new();
        registry.register(contracts::SETTINGS, 42_u32);
        let err = resolve_optional::<MapperConfig>(&registry, contracts::SETTINGS).unwrap_err();
        assert_eq!(err.code(), "DEPENDENCY_ERROR");
    }

    #[test]
    fn test_mock_resolver() {
        let mut resolver = MockDependencyResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|_| Some(Arc::new(7_i64) as Service));

        let value: i64 = resolve_as(&resolver, "anything").unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_register_replaces() {
        let registry = ServiceRegistry::new();
        registry.register("n", 1_i64).register("n", 2_i64);
        assert_eq!(registry.len(), 1);
        assert_eq!(resolve_as::<i64>(&registry, "n").unwrap(), 2);
        assert!(registry.unregister("n"));
        assert!(registry.is_empty());
    }
}
