//! Item object mapper.
//!
//! Binds raw store items to typed objects through declared mappings:
//!
//! - `config`: declarations, the declaration registry and resolved configurations
//! - `pipeline`: task chains for configuration resolution, construction and saving
//! - `cache`: per-type configuration cache with single-build semantics
//! - `mappers`: data mapper strategies and their resolver
//! - `object`: mapped objects, lazy proxies and typed values
//! - `store`: the backing store collaborator
//! - `ioc`: the dependency resolution collaborator
//! - `context`: the process-scoped entry point tying it all together

pub mod cache;
pub mod config;
pub mod context;
pub mod ioc;
pub mod mappers;
pub mod object;
pub mod pipeline;
pub mod store;

pub use cache::{CacheStats, ConfigurationCache};
pub use config::{
    DeclarationRegistry, InfoKind, PropertyConfiguration, PropertyDeclaration, PropertyKind,
    TypeConfiguration, TypeDeclaration, TypeKey, ValueType,
};
pub use context::{MapperContext, MapperContextBuilder};
pub use ioc::{DependencyResolver, ServiceRegistry};
pub use mappers::{DataMapper, DataMapperResolver, ReadContext, WriteContext};
pub use object::{FieldHandle, MappedObject, MappedType, Value};
pub use pipeline::{ConstructOptions, SaveReport, TaskChain, TaskChainBuilder};
pub use store::{InMemoryStore, ItemStore};

pub use common::{MapperConfig, MapperError, MapperResult};
pub use domain::{Item, ItemId};
