//! Data mapper strategies.
//!
//! A [`DataMapper`] converts one property between the store's raw string
//! fields and a typed [`Value`]. The [`DataMapperResolver`] picks one mapper
//! per declared property, first match wins, so custom strategies registered
//! ahead of the defaults override built-in behaviour.

mod computed;
mod item;
mod reference;
mod scalar;

pub use computed::ComputedMapper;
pub use item::{IdMapper, InfoMapper};
pub use reference::{ChildrenMapper, ParentMapper, ReferenceListMapper, ReferenceMapper};
pub use scalar::ScalarFieldMapper;

use std::borrow::Cow;
use std::sync::Arc;

use common::{MapperError, MapperResult};
use domain::{DomainError, Item, ItemId};

use crate::config::{PropertyConfiguration, PropertyDeclaration, TypeConfiguration, TypeKey, ValueType};
use crate::context::MapperContext;
use crate::object::{MappedObject, Value};
use crate::store::ItemStore;

/// Strategy reading and writing one property.
pub trait DataMapper: Send + Sync {
    /// Strategy name, used to detect field collisions and in diagnostics
    fn name(&self) -> &str;

    /// Whether this strategy can map the declared property
    fn can_handle(&self, property: &PropertyDeclaration) -> bool;

    /// Produce the typed value of a property
    fn read(&self, ctx: &ReadContext<'_>, property: &PropertyConfiguration) -> MapperResult<Value>;

    /// Write a typed value back to the store
    fn write(
        &self,
        ctx: &WriteContext<'_>,
        property: &PropertyConfiguration,
        value: &Value,
    ) -> MapperResult<()>;

    /// Read-only strategies are skipped when saving
    fn is_read_only(&self) -> bool {
        false
    }
}

// =============================================================================
// Contexts
// =============================================================================

/// Everything a mapper may look at while reading one property.
///
/// Eager construction reads from the item snapshot loaded once for the whole
/// object; lazy proxies have no snapshot and read single fields instead.
pub struct ReadContext<'a> {
    context: &'a MapperContext,
    configuration: &'a TypeConfiguration,
    item_id: ItemId,
    snapshot: Option<&'a Item>,
    nested: bool,
}

impl<'a> ReadContext<'a> {
    pub(crate) fn new(
        context: &'a MapperContext,
        configuration: &'a TypeConfiguration,
        item_id: ItemId,
        snapshot: Option<&'a Item>,
        nested: bool,
    ) -> Self {
        Self {
            context,
            configuration,
            item_id,
            snapshot,
            nested,
        }
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn type_key(&self) -> &TypeKey {
        self.configuration.type_key()
    }

    pub fn configuration(&self) -> &TypeConfiguration {
        self.configuration
    }

    pub fn context(&self) -> &MapperContext {
        self.context
    }

    pub fn store(&self) -> &dyn ItemStore {
        self.context.store()
    }

    /// Raw value of one field
    pub fn field(&self, name: &str) -> MapperResult<Option<String>> {
        match self.snapshot {
            Some(item) => Ok(item.field(name).map(str::to_string)),
            None => Ok(self.store().read_field(self.item_id, name)?),
        }
    }

    /// The whole item, loading it if there is no snapshot
    pub fn item(&self) -> MapperResult<Cow<'a, Item>> {
        if let Some(item) = self.snapshot {
            return Ok(Cow::Borrowed(item));
        }
        self.store()
            .get_item(self.item_id)?
            .map(Cow::Owned)
            .ok_or_else(|| DomainError::not_found(format!("item {}", self.item_id)).into())
    }

    pub fn children(&self) -> MapperResult<Vec<ItemId>> {
        Ok(self.store().children(self.item_id)?)
    }

    /// Map a referenced item to `target`.
    ///
    /// Lazy references and every reference read while populating a nested
    /// object become proxies, so eager loading stops one level down.
    pub fn reference(
        &self,
        target: &TypeKey,
        id: ItemId,
        lazy: bool,
    ) -> MapperResult<Option<MappedObject>> {
        self.context.reference(target, id, !lazy && !self.nested)
    }
}

/// Target of a property write.
pub struct WriteContext<'a> {
    store: &'a dyn ItemStore,
    type_key: &'a TypeKey,
    item_id: ItemId,
}

impl<'a> WriteContext<'a> {
    pub(crate) fn new(store: &'a dyn ItemStore, type_key: &'a TypeKey, item_id: ItemId) -> Self {
        Self {
            store,
            type_key,
            item_id,
        }
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn type_key(&self) -> &TypeKey {
        self.type_key
    }

    pub fn write_field(&self, field: &str, raw: &str) -> MapperResult<()> {
        Ok(self.store.write_field(self.item_id, field, raw)?)
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Priority-ordered list of data mapper strategies.
#[derive(Clone)]
pub struct DataMapperResolver {
    strategies: Vec<Arc<dyn DataMapper>>,
    /// Number of custom strategies at the front of the list
    custom: usize,
}

impl DataMapperResolver {
    /// Resolver with no strategies at all
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
            custom: 0,
        }
    }

    /// Resolver with the built-in strategies only
    pub fn with_defaults() -> Self {
        Self {
            strategies: Self::defaults(),
            custom: 0,
        }
    }

    /// Built-in strategies in priority order
    pub fn defaults() -> Vec<Arc<dyn DataMapper>> {
        let mut defaults: Vec<Arc<dyn DataMapper>> = [
            ValueType::Text,
            ValueType::Integer,
            ValueType::Float,
            ValueType::Boolean,
            ValueType::DateTime,
            ValueType::Guid,
        ]
        .into_iter()
        .filter_map(ScalarFieldMapper::new)
        .map(|m| Arc::new(m) as Arc<dyn DataMapper>)
        .collect();

        defaults.push(Arc::new(ReferenceMapper));
        defaults.push(Arc::new(ReferenceListMapper));
        defaults.push(Arc::new(ChildrenMapper));
        defaults.push(Arc::new(ParentMapper));
        defaults.push(Arc::new(IdMapper));
        defaults.push(Arc::new(InfoMapper));
        defaults
    }

    /// Add a custom strategy.
    ///
    /// Custom strategies keep their registration order and all take priority
    /// over the built-in ones.
    pub fn register(&mut self, mapper: Arc<dyn DataMapper>) {
        self.strategies.insert(self.custom, mapper);
        self.custom += 1;
    }

    /// Append a strategy after everything already registered
    pub fn push(&mut self, mapper: Arc<dyn DataMapper>) {
        self.strategies.push(mapper);
    }

    /// Pick the strategy for a property.
    ///
    /// Returns `Ok(None)` when nothing matches an ignorable property and
    /// `UnmappableField` when nothing matches any other property.
    pub fn select(
        &self,
        type_key: &TypeKey,
        property: &PropertyDeclaration,
    ) -> MapperResult<Option<Arc<dyn DataMapper>>> {
        match self.strategies.iter().find(|m| m.can_handle(property)) {
            Some(mapper) => Ok(Some(Arc::clone(mapper))),
            None if property.ignorable => Ok(None),
            None => Err(MapperError::unmappable(type_key.as_str(), &property.name)),
        }
    }

    /// Strategy names in priority order
    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for DataMapperResolver {
    fn default() -> Self {
        Self::with_defaults()
    }
}
