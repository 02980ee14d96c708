//! Mapper context.
//!
//! The explicit, process-scoped home of everything the pipelines share: the
//! store handle, the declaration registry, the configuration cache, the
//! resolver and the construction and saving chains. Nothing here is global;
//! a context is built once, wrapped in an `Arc` and passed around. Lazy
//! proxies keep a `Weak` handle back to the context that created them.

use std::borrow::Cow;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use common::{MapperConfig, MapperError, MapperResult, OptionExt};
use domain::{is_item_path, DomainError, Item, ItemId};

use crate::cache::ConfigurationCache;
use crate::config::{DeclarationRegistry, TypeConfiguration, TypeDeclaration, TypeKey};
use crate::ioc::{contracts, resolve_as, resolve_optional, DependencyResolver};
use crate::mappers::{DataMapper, DataMapperResolver, ReadContext};
use crate::object::{MappedObject, MappedType, Value};
use crate::pipeline::{
    construction, saving, ConfigurationResolver, ConfigurationTask, ConstructOptions,
    ConstructionArgs, ConstructionTask, SaveReport, SavingArgs, SavingTask, TaskChain,
    TaskChainBuilder,
};
use crate::store::ItemStore;

/// Shared state and entry point of the mapper.
pub struct MapperContext {
    me: Weak<MapperContext>,
    store: Arc<dyn ItemStore>,
    /// Swapped whole on redeclaration
    declarations: RwLock<Arc<DeclarationRegistry>>,
    cache: Arc<ConfigurationCache>,
    resolver: ConfigurationResolver,
    construction: TaskChain<dyn ConstructionTask>,
    saving: TaskChain<dyn SavingTask>,
    settings: MapperConfig,
}

impl MapperContext {
    pub fn builder(store: Arc<dyn ItemStore>) -> MapperContextBuilder {
        MapperContextBuilder::new(store)
    }

    /// Assemble a context from services registered under [`contracts`].
    ///
    /// Only the item store is required; every other contract falls back to
    /// its default.
    pub fn from_resolver(
        resolver: &dyn DependencyResolver,
        declarations: DeclarationRegistry,
    ) -> MapperResult<Arc<Self>> {
        let store: Arc<dyn ItemStore> = resolve_as(resolver, contracts::ITEM_STORE)?;
        let mut builder = Self::builder(store).declarations(declarations);

        if let Some(settings) = resolve_optional::<MapperConfig>(resolver, contracts::SETTINGS)? {
            builder = builder.settings(settings);
        }
        if let Some(cache) =
            resolve_optional::<Arc<ConfigurationCache>>(resolver, contracts::CONFIGURATION_CACHE)?
        {
            builder = builder.cache(cache);
        }
        if let Some(mappers) =
            resolve_optional::<Vec<Arc<dyn DataMapper>>>(resolver, contracts::DATA_MAPPERS)?
        {
            for mapper in mappers {
                builder = builder.data_mapper(mapper);
            }
        }
        if let Some(tasks) = resolve_optional::<TaskChain<dyn ConfigurationTask>>(
            resolver,
            contracts::CONFIGURATION_TASKS,
        )? {
            builder.configuration_tasks = tasks;
        }
        if let Some(tasks) = resolve_optional::<TaskChain<dyn ConstructionTask>>(
            resolver,
            contracts::CONSTRUCTION_TASKS,
        )? {
            builder.construction_tasks = tasks;
        }
        if let Some(tasks) =
            resolve_optional::<TaskChain<dyn SavingTask>>(resolver, contracts::SAVING_TASKS)?
        {
            builder.saving_tasks = tasks;
        }

        builder.build()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn store(&self) -> &dyn ItemStore {
        self.store.as_ref()
    }

    pub fn settings(&self) -> &MapperConfig {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<ConfigurationCache> {
        &self.cache
    }

    pub fn resolver(&self) -> &ConfigurationResolver {
        &self.resolver
    }

    pub fn construction_tasks(&self) -> &TaskChain<dyn ConstructionTask> {
        &self.construction
    }

    pub fn saving_tasks(&self) -> &TaskChain<dyn SavingTask> {
        &self.saving
    }

    /// Snapshot of the current declarations
    pub fn declarations(&self) -> Arc<DeclarationRegistry> {
        self.declarations.read().clone()
    }

    /// Construct options derived from the settings
    pub fn default_options(&self) -> ConstructOptions {
        ConstructOptions {
            lazy: self.settings.lazy_by_default,
            infer_type: self.settings.infer_type_by_default,
        }
    }

    pub(crate) fn weak(&self) -> Weak<MapperContext> {
        self.me.clone()
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Resolved configuration of a declared type, built on first use.
    pub fn configuration(&self, key: &TypeKey) -> MapperResult<Arc<TypeConfiguration>> {
        self.cache.get_or_build(key, || {
            let registry = self.declarations();
            let declaration = registry.get(key).ok_or_unknown_type(key.as_str())?;
            self.resolver.resolve(declaration, &registry)
        })
    }

    pub fn configuration_of<T: MappedType>(&self) -> MapperResult<Arc<TypeConfiguration>> {
        self.configuration(&T::type_key())
    }

    /// Resolve a declaration against the current registry without caching it
    pub fn resolve_declaration(
        &self,
        declaration: &TypeDeclaration,
    ) -> MapperResult<TypeConfiguration> {
        self.resolver.resolve(declaration, &self.declarations())
    }

    /// Resolve every declared type, returning the failures
    pub fn validate(&self) -> Vec<MapperError> {
        let registry = self.declarations();
        registry
            .iter()
            .filter_map(|d| self.configuration(&d.type_key).err())
            .collect()
    }

    /// First declared type whose template is `template`
    pub fn configuration_for_template(
        &self,
        template: ItemId,
    ) -> MapperResult<Option<Arc<TypeConfiguration>>> {
        let registry = self.declarations();
        let key = registry.iter().find_map(|d| {
            let raw = d.template_id.as_deref()?;
            let id = ItemId::parse_optional(raw).ok().flatten()?;
            (id == template).then(|| d.type_key.clone())
        });
        key.map(|k| self.configuration(&k)).transpose()
    }

    pub fn invalidate(&self, key: &TypeKey) -> bool {
        self.cache.invalidate(key)
    }

    /// Add or replace a declaration.
    ///
    /// The type and every type deriving from it are invalidated; objects
    /// already constructed keep their old configuration.
    pub fn redeclare(&self, declaration: TypeDeclaration) {
        let key = declaration.type_key.clone();
        let affected = {
            let mut current = self.declarations.write();
            let mut next = DeclarationRegistry::clone(&current);
            let mut affected = current.descendants(&key);
            next.upsert(declaration);
            for derived in next.descendants(&key) {
                if !affected.contains(&derived) {
                    affected.push(derived);
                }
            }
            *current = Arc::new(next);
            affected
        };

        self.cache.invalidate(&key);
        for derived in &affected {
            self.cache.invalidate(derived);
        }
        tracing::info!(
            type_key = %key,
            derived = affected.len(),
            "Redeclared type"
        );
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Construct an object for a store item.
    ///
    /// Returns `Ok(None)` when an eager construction finds no item.
    pub fn construct(
        &self,
        configuration: &Arc<TypeConfiguration>,
        item_id: ItemId,
        options: ConstructOptions,
    ) -> MapperResult<Option<MappedObject>> {
        self.run_construction(Arc::clone(configuration), item_id, None, options, false)
    }

    /// Construct an object from an item snapshot the caller already holds
    pub fn construct_item(
        &self,
        configuration: &Arc<TypeConfiguration>,
        item: &Item,
        options: ConstructOptions,
    ) -> MapperResult<Option<MappedObject>> {
        self.run_construction(
            Arc::clone(configuration),
            item.id,
            Some(Cow::Borrowed(item)),
            options,
            false,
        )
    }

    /// Construct a declared type by key
    pub fn get_item(
        &self,
        key: &TypeKey,
        item_id: ItemId,
        options: ConstructOptions,
    ) -> MapperResult<Option<MappedObject>> {
        let configuration = self.configuration(key)?;
        self.construct(&configuration, item_id, options)
    }

    /// Construct a declared type from an item path
    pub fn get_item_by_path(
        &self,
        key: &TypeKey,
        path: &str,
        options: ConstructOptions,
    ) -> MapperResult<Option<MappedObject>> {
        if !is_item_path(path) {
            return Err(
                DomainError::validation(format!("'{}' is not an absolute item path", path)).into(),
            );
        }
        let configuration = self.configuration(key)?;
        match self.store.item_by_path(path)? {
            Some(item_id) => self.construct(&configuration, item_id, options),
            None => Ok(None),
        }
    }

    /// Construct a typed value with the default options
    pub fn get_as<T: MappedType>(&self, item_id: ItemId) -> MapperResult<Option<T>> {
        let configuration = self.configuration_of::<T>()?;
        self.construct(&configuration, item_id, self.default_options())?
            .map(|object| T::from_object(&object))
            .transpose()
    }

    fn run_construction(
        &self,
        configuration: Arc<TypeConfiguration>,
        item_id: ItemId,
        item: Option<Cow<'_, Item>>,
        options: ConstructOptions,
        nested: bool,
    ) -> MapperResult<Option<MappedObject>> {
        let args = ConstructionArgs::new(self, configuration, item_id, item, options, nested);
        construction::run(&self.construction, args)
    }

    /// Object for a referenced item: a proxy, or a nested eager construction
    pub(crate) fn reference(
        &self,
        target: &TypeKey,
        item_id: ItemId,
        eager: bool,
    ) -> MapperResult<Option<MappedObject>> {
        let configuration = self.configuration(target)?;
        if !eager {
            return Ok(Some(MappedObject::lazy(configuration, item_id, self.weak())));
        }
        self.run_construction(configuration, item_id, None, ConstructOptions::eager(), true)
    }

    /// Read one property through its mapper.
    ///
    /// Failures of optional properties are logged and read as `Null`;
    /// configuration errors always propagate unchanged.
    pub(crate) fn read_property(
        &self,
        configuration: &TypeConfiguration,
        index: usize,
        item_id: ItemId,
        snapshot: Option<&Item>,
        nested: bool,
    ) -> MapperResult<Value> {
        let property = configuration.properties().get(index).ok_or_else(|| {
            MapperError::internal(format!(
                "{} has no property at index {}",
                configuration.type_key(),
                index
            ))
        })?;

        let ctx = ReadContext::new(self, configuration, item_id, snapshot, nested);
        match property.mapper().read(&ctx, property) {
            Ok(value) => Ok(value),
            Err(e) if e.is_configuration_time() => Err(e),
            Err(e) if property.is_optional() => {
                tracing::warn!(
                    type_key = %configuration.type_key(),
                    property = %property.name(),
                    item_id = %item_id,
                    error = %e,
                    "Optional property failed to load; leaving it empty"
                );
                Ok(Value::Null)
            }
            Err(e @ MapperError::Construction { .. }) => Err(e),
            Err(e) => Err(MapperError::property_construction(
                configuration.type_key().as_str(),
                property.name(),
                e.to_string(),
            )),
        }
    }

    // =========================================================================
    // Saving
    // =========================================================================

    /// Write an object back to its own item
    pub fn save(&self, object: &MappedObject) -> MapperResult<SaveReport> {
        self.save_to(object, object.configuration(), object.item_id())
    }

    /// Write an object to `item_id` as `configuration`, which must be the
    /// object's type or one of its bases
    pub fn save_to(
        &self,
        object: &MappedObject,
        configuration: &TypeConfiguration,
        item_id: ItemId,
    ) -> MapperResult<SaveReport> {
        if !object
            .configuration()
            .is_assignable_to(configuration.type_key())
        {
            return Err(MapperError::save(
                configuration.type_key().as_str(),
                "*",
                format!(
                    "{} is not assignable to {}",
                    object.type_key(),
                    configuration.type_key()
                ),
                Vec::new(),
            ));
        }
        let args = SavingArgs::new(self, object, configuration, item_id);
        saving::run(&self.saving, args)
    }

    /// Write a typed value to `item_id`; only the properties it sets are written
    pub fn save_as<T: MappedType>(&self, value: &T, item_id: ItemId) -> MapperResult<SaveReport> {
        let configuration = self.configuration_of::<T>()?;
        let mut object = MappedObject::detached(configuration, item_id);
        value.write_to(&mut object)?;
        self.save(&object)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Staged construction of a [`MapperContext`].
pub struct MapperContextBuilder {
    store: Arc<dyn ItemStore>,
    registry: DeclarationRegistry,
    declarations: Vec<TypeDeclaration>,
    mappers: DataMapperResolver,
    configuration_tasks: TaskChain<dyn ConfigurationTask>,
    construction_tasks: TaskChain<dyn ConstructionTask>,
    saving_tasks: TaskChain<dyn SavingTask>,
    cache: Option<Arc<ConfigurationCache>>,
    settings: MapperConfig,
}

impl MapperContextBuilder {
    fn new(store: Arc<dyn ItemStore>) -> Self {
        Self {
            store,
            registry: DeclarationRegistry::new(),
            declarations: Vec::new(),
            mappers: DataMapperResolver::with_defaults(),
            configuration_tasks: ConfigurationResolver::default_tasks(),
            construction_tasks: construction::default_tasks(),
            saving_tasks: saving::default_tasks(),
            cache: None,
            settings: MapperConfig::default(),
        }
    }

    /// Start from an existing registry
    pub fn declarations(mut self, registry: DeclarationRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn declare(mut self, declaration: TypeDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    pub fn declare_type<T: MappedType>(self) -> Self {
        self.declare(T::declaration())
    }

    /// Register a custom strategy ahead of the defaults
    pub fn data_mapper(mut self, mapper: Arc<dyn DataMapper>) -> Self {
        self.mappers.register(mapper);
        self
    }

    /// Replace the whole strategy list
    pub fn data_mappers(mut self, mappers: DataMapperResolver) -> Self {
        self.mappers = mappers;
        self
    }

    pub fn settings(mut self, settings: MapperConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Share a cache with other contexts.
    ///
    /// The cache does not know which registry built an entry; only share it
    /// between contexts with identical declarations and mapper resolvers.
    pub fn cache(mut self, cache: Arc<ConfigurationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn configuration_tasks<F>(mut self, edit: F) -> MapperResult<Self>
    where
        F: FnOnce(
            TaskChainBuilder<dyn ConfigurationTask>,
        ) -> MapperResult<TaskChainBuilder<dyn ConfigurationTask>>,
    {
        self.configuration_tasks = edit(self.configuration_tasks.to_builder())?.build()?;
        Ok(self)
    }

    pub fn construction_tasks<F>(mut self, edit: F) -> MapperResult<Self>
    where
        F: FnOnce(
            TaskChainBuilder<dyn ConstructionTask>,
        ) -> MapperResult<TaskChainBuilder<dyn ConstructionTask>>,
    {
        self.construction_tasks = edit(self.construction_tasks.to_builder())?.build()?;
        Ok(self)
    }

    pub fn saving_tasks<F>(mut self, edit: F) -> MapperResult<Self>
    where
        F: FnOnce(TaskChainBuilder<dyn SavingTask>) -> MapperResult<TaskChainBuilder<dyn SavingTask>>,
    {
        self.saving_tasks = edit(self.saving_tasks.to_builder())?.build()?;
        Ok(self)
    }

    /// Finish the context; fails on duplicate declarations
    pub fn build(self) -> MapperResult<Arc<MapperContext>> {
        let mut registry = self.registry;
        for declaration in self.declarations {
            registry.register(declaration)?;
        }

        let resolver = ConfigurationResolver::new(self.configuration_tasks, self.mappers);
        let cache = self.cache.unwrap_or_default();
        let store = self.store;
        let construction = self.construction_tasks;
        let saving = self.saving_tasks;
        let settings = self.settings;

        tracing::debug!(
            types = registry.len(),
            lazy_by_default = settings.lazy_by_default,
            infer_type_by_default = settings.infer_type_by_default,
            "Built mapper context"
        );

        Ok(Arc::new_cyclic(|me| MapperContext {
            me: me.clone(),
            store,
            declarations: RwLock::new(Arc::new(registry)),
            cache,
            resolver,
            construction,
            saving,
            settings,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PropertyDeclaration, PropertyKind, ValueType};
    use crate::ioc::ServiceRegistry;
    use crate::store::{InMemoryStore, MockItemStore};
    use domain::DomainError;

    const ARTICLE_TEMPLATE: &str = "{0B7F2A8C-1111-4C3B-9A55-0E2F7A1B3C4D}";
    const NEWS_TEMPLATE: &str = "{0B7F2A8C-2222-4C3B-9A55-0E2F7A1B3C4D}";

    fn article() -> TypeDeclaration {
        TypeDeclaration::new("Article")
            .template_id(ARTICLE_TEMPLATE)
            .field("Title", "Title", ValueType::Text)
            .field("Views", "Views", ValueType::Integer)
    }

    fn article_item(id: ItemId) -> Item {
        Item::new(id, "welcome", ItemId::parse(ARTICLE_TEMPLATE).unwrap())
            .with_field("Title", "Hello")
            .with_field("Views", "42")
    }

    fn context(store: impl ItemStore + 'static, declarations: Vec<TypeDeclaration>) -> Arc<MapperContext> {
        declarations
            .into_iter()
            .fold(MapperContext::builder(Arc::new(store)), |b, d| b.declare(d))
            .build()
            .unwrap()
    }

    #[test]
    fn test_lazy_construction_defers_store_access() {
        let id = ItemId::new_random();
        let mut store = MockItemStore::new();
        store.expect_get_item().times(0);
        store
            .expect_read_field()
            .times(1)
            .returning(|_, _| Ok(Some("Hello".to_string())));

        let context = context(store, vec![article()]);
        let configuration = context.configuration(&TypeKey::new("Article")).unwrap();
        let object = context
            .construct(&configuration, id, ConstructOptions::lazy())
            .unwrap()
            .unwrap();

        assert!(object.is_lazy());
        assert!(!object.is_loaded("Title"));
        assert_eq!(object.get_text("Title").unwrap(), Some("Hello"));
        // Second access is served from the slot
        assert_eq!(object.get_text("Title").unwrap(), Some("Hello"));
        assert!(!object.is_loaded("Views"));
    }

    #[test]
    fn test_eager_construction_loads_item_once() {
        let id = ItemId::new_random();
        let item = article_item(id);
        let mut store = MockItemStore::new();
        store
            .expect_get_item()
            .times(1)
            .returning(move |_| Ok(Some(item.clone())));

        let context = context(store, vec![article()]);
        let object = context
            .get_item(&TypeKey::new("Article"), id, ConstructOptions::eager())
            .unwrap()
            .unwrap();

        assert_eq!(object.get_text("Title").unwrap(), Some("Hello"));
        assert_eq!(object.get_integer("Views").unwrap(), Some(42));
        assert_eq!(object.loaded_count(), 2);
    }

    #[test]
    fn test_missing_item_yields_none() {
        let mut store = MockItemStore::new();
        store.expect_get_item().times(1).returning(|_| Ok(None));

        let context = context(store, vec![article()]);
        let result = context
            .get_item(&TypeKey::new("Article"), ItemId::new_random(), ConstructOptions::eager())
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_identity_is_not_cached() {
        let context = context(
            InMemoryStore::new(),
            vec![TypeDeclaration::new("Broken").template_id("not-a-guid")],
        );
        let key = TypeKey::new("Broken");

        let err = context.configuration(&key).unwrap_err();
        assert!(matches!(err, MapperError::Configuration { .. }));
        assert!(!context.cache().contains(&key));
        assert_eq!(context.validate().len(), 1);
    }

    #[test]
    fn test_unknown_type() {
        let context = context(InMemoryStore::new(), vec![]);
        let err = context.configuration(&TypeKey::new("Ghost")).unwrap_err();
        assert_eq!(err, MapperError::UnknownType("Ghost".into()));
    }

    #[test]
    fn test_optional_property_failure_reads_as_null() {
        let id = ItemId::new_random();
        let store = InMemoryStore::with_items([article_item(id).with_field("Views", "many")]);
        let declaration = TypeDeclaration::new("Article")
            .field("Title", "Title", ValueType::Text)
            .property(
                PropertyDeclaration::new(
                    "Views",
                    PropertyKind::Field {
                        field: "Views".into(),
                        value_type: ValueType::Integer,
                    },
                )
                .optional(),
            );

        let context = context(store, vec![declaration]);
        let object = context
            .get_item(&TypeKey::new("Article"), id, ConstructOptions::eager())
            .unwrap()
            .unwrap();
        assert_eq!(object.get("Views").unwrap(), &Value::Null);
        assert_eq!(object.get_text("Title").unwrap(), Some("Hello"));
    }

    #[test]
    fn test_required_property_failure_fails_construction() {
        let id = ItemId::new_random();
        let store = InMemoryStore::with_items([article_item(id).with_field("Views", "many")]);

        let context = context(store, vec![article()]);
        let err = context
            .get_item(&TypeKey::new("Article"), id, ConstructOptions::eager())
            .unwrap_err();
        match err {
            MapperError::Construction { property, .. } => {
                assert_eq!(property.as_deref(), Some("Views"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_infer_type_returns_derived_configuration() {
        let id = ItemId::new_random();
        let item = Item::new(id, "breaking", ItemId::parse(NEWS_TEMPLATE).unwrap())
            .with_field("Title", "Breaking")
            .with_field("Agency", "Wire");
        let store = InMemoryStore::with_items([item]);

        let news = TypeDeclaration::new("NewsArticle")
            .extends("Article")
            .template_id(NEWS_TEMPLATE)
            .field("Agency", "Agency", ValueType::Text);
        let context = context(store, vec![article(), news]);

        let object = context
            .get_item(
                &TypeKey::new("Article"),
                id,
                ConstructOptions::eager().with_infer_type(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(object.type_key(), &TypeKey::new("NewsArticle"));
        assert_eq!(object.get_text("Agency").unwrap(), Some("Wire"));

        let plain = context
            .get_item(&TypeKey::new("Article"), id, ConstructOptions::eager())
            .unwrap()
            .unwrap();
        assert_eq!(plain.type_key(), &TypeKey::new("Article"));
    }

    #[test]
    fn test_eager_references_stop_one_level_down() {
        let article_id = ItemId::new_random();
        let person_id = ItemId::new_random();
        let store = InMemoryStore::with_items([
            Item::new(article_id, "story", ItemId::NULL)
                .with_field("Author", person_id.to_string()),
            Item::new(person_id, "ada", ItemId::NULL)
                .with_field("Latest", article_id.to_string()),
        ]);

        let eager_reference = |name: &str, target: &str| {
            PropertyDeclaration::new(
                name,
                PropertyKind::Reference {
                    field: name.to_string(),
                    target: target.into(),
                },
            )
            .eager()
        };
        let context = context(
            store,
            vec![
                TypeDeclaration::new("Article").property(eager_reference("Author", "Person")),
                TypeDeclaration::new("Person").property(eager_reference("Latest", "Article")),
            ],
        );

        let article = context
            .get_item(&TypeKey::new("Article"), article_id, ConstructOptions::eager())
            .unwrap()
            .unwrap();
        let author = article.get_object("Author").unwrap().unwrap();
        assert!(!author.is_lazy());
        assert_eq!(author.item_id(), person_id);

        let latest = author.get_object("Latest").unwrap().unwrap();
        assert!(latest.is_lazy());
        assert_eq!(latest.item_id(), article_id);
    }

    #[test]
    fn test_proxy_outliving_context_fails_cleanly() {
        let id = ItemId::new_random();
        let context = context(InMemoryStore::with_items([article_item(id)]), vec![article()]);
        let object = context
            .get_item(&TypeKey::new("Article"), id, ConstructOptions::lazy())
            .unwrap()
            .unwrap();
        drop(context);

        let err = object.get("Title").unwrap_err();
        assert!(matches!(err, MapperError::Construction { .. }));
    }

    #[test]
    fn test_save_reports_partial_writes() {
        let id = ItemId::new_random();
        let item = article_item(id);
        let mut store = MockItemStore::new();
        store
            .expect_get_item()
            .returning(move |_| Ok(Some(item.clone())));
        store.expect_write_field().times(2).returning(|_, field, _| {
            if field == "Views" {
                Err(DomainError::store("disk full"))
            } else {
                Ok(())
            }
        });

        let declaration = article().field("Subtitle", "Subtitle", ValueType::Text);
        let context = context(store, vec![declaration]);
        let object = context
            .get_item(&TypeKey::new("Article"), id, ConstructOptions::eager())
            .unwrap()
            .unwrap();

        match context.save(&object).unwrap_err() {
            MapperError::Save {
                property, written, ..
            } => {
                assert_eq!(property, "Views");
                assert_eq!(written, vec!["Title".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_save_to_unrelated_type_fails() {
        let id = ItemId::new_random();
        let context = context(
            InMemoryStore::with_items([article_item(id)]),
            vec![article(), TypeDeclaration::new("Person")],
        );
        let object = context
            .get_item(&TypeKey::new("Article"), id, ConstructOptions::eager())
            .unwrap()
            .unwrap();
        let person = context.configuration(&TypeKey::new("Person")).unwrap();

        let err = context.save_to(&object, &person, id).unwrap_err();
        assert_eq!(err.code(), "SAVE_ERROR");
    }

    #[test]
    fn test_redeclare_invalidates_derived_types() {
        let context = context(
            InMemoryStore::new(),
            vec![
                article(),
                TypeDeclaration::new("NewsArticle").extends("Article"),
            ],
        );
        let news = TypeKey::new("NewsArticle");
        assert_eq!(context.configuration(&news).unwrap().properties().len(), 2);

        context.redeclare(article().field("Summary", "Summary", ValueType::Text));
        assert!(!context.cache().contains(&news));
        assert_eq!(context.configuration(&news).unwrap().properties().len(), 3);
    }

    #[test]
    fn test_from_resolver_uses_registered_services() {
        let id = ItemId::new_random();
        let registry = ServiceRegistry::new();
        let store: Arc<dyn ItemStore> = Arc::new(InMemoryStore::with_items([article_item(id)]));
        registry
            .register(contracts::ITEM_STORE, store)
            .register(
                contracts::SETTINGS,
                MapperConfig {
                    lazy_by_default: true,
                    ..MapperConfig::default()
                },
            );

        let declarations = DeclarationRegistry::from_declarations(vec![article()]).unwrap();
        let context = MapperContext::from_resolver(&registry, declarations).unwrap();
        assert!(context.default_options().lazy);

        let object = context
            .get_item(&TypeKey::new("Article"), id, context.default_options())
            .unwrap()
            .unwrap();
        assert!(object.is_lazy());
    }

    #[test]
    fn test_contexts_with_identical_declarations_share_cache() {
        let cache = Arc::new(ConfigurationCache::new());
        let open = || {
            MapperContext::builder(Arc::new(InMemoryStore::new()))
                .declare(article())
                .cache(Arc::clone(&cache))
                .build()
                .unwrap()
        };
        let first = open();
        let second = open();

        let built = first.configuration(&TypeKey::new("Article")).unwrap();
        let reused = second.configuration(&TypeKey::new("Article")).unwrap();

        assert!(Arc::ptr_eq(&built, &reused));
        assert_eq!(cache.stats().builds, 1);
    }

    #[test]
    fn test_from_resolver_requires_store() {
        let err = MapperContext::from_resolver(&ServiceRegistry::new(), DeclarationRegistry::new())
            .err()
            .unwrap();
        assert_eq!(err, MapperError::dependency(contracts::ITEM_STORE));
    }

    #[test]
    fn test_configuration_for_template() {
        let context = context(InMemoryStore::new(), vec![article()]);
        let found = context
            .configuration_for_template(ItemId::parse(ARTICLE_TEMPLATE).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(found.type_key(), &TypeKey::new("Article"));
        assert!(context
            .configuration_for_template(ItemId::new_random())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_resolve_declaration_is_not_cached() {
        let context = context(InMemoryStore::new(), vec![article()]);
        let draft = TypeDeclaration::new("Draft")
            .extends("Article")
            .field("Notes", "Notes", ValueType::Text);

        let configuration = context.resolve_declaration(&draft).unwrap();
        assert_eq!(configuration.ancestors(), &[TypeKey::new("Article")]);
        assert_eq!(configuration.properties().len(), 3);
        assert!(!context.cache().contains(&TypeKey::new("Draft")));
        assert!(context.cache().is_empty());

        let err = context
            .resolve_declaration(&TypeDeclaration::new("Orphan").extends("Missing"))
            .unwrap_err();
        assert!(err.is_configuration_time());
    }

    fn person_item(id: ItemId) -> Item {
        Item::new(id, "ada", ItemId::NULL).with_field("Name", "Ada")
    }

    fn article_with_author(optional: bool) -> TypeDeclaration {
        let author = PropertyDeclaration::new(
            "Author",
            PropertyKind::Reference {
                field: "Author".into(),
                target: TypeKey::new("Person"),
            },
        )
        .eager();
        let author = if optional { author.optional() } else { author };
        article().property(author)
    }

    #[test]
    fn test_reference_configuration_errors_are_never_swallowed() {
        for optional in [true, false] {
            let article_id = ItemId::new_random();
            let person_id = ItemId::new_random();
            let store = InMemoryStore::with_items([
                article_item(article_id).with_field("Author", person_id.to_string()),
                person_item(person_id),
            ]);
            let context = context(
                store,
                vec![
                    article_with_author(optional),
                    TypeDeclaration::new("Person").field("Name", "Name", ValueType::Text),
                ],
            );
            context.configuration(&TypeKey::new("Article")).unwrap();

            // Person turns unmappable after Article was resolved and cached
            context.redeclare(
                TypeDeclaration::new("Person")
                    .field("Bio", "Bio", ValueType::Custom("rich_text".into())),
            );

            let err = context
                .get_item(&TypeKey::new("Article"), article_id, ConstructOptions::eager())
                .unwrap_err();
            assert_eq!(err, MapperError::unmappable("Person", "Bio"), "optional = {optional}");
        }
    }
}
