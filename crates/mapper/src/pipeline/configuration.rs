//! Configuration resolver pipeline.
//!
//! Turns one [`TypeDeclaration`] into an immutable [`TypeConfiguration`].
//! Default task order:
//!
//! 1. `identity`: type key grammar, template and branch ids
//! 2. `inheritance`: base chain and inherited properties
//! 3. `property_mapping`: one data mapper per property
//! 4. `field_collision`: incompatible strategies on one source field
//!
//! Later tasks rely on earlier ones having succeeded. Any error aborts the
//! whole resolution; no partial configuration ever leaves the resolver.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use common::{MapperError, MapperResult};
use domain::ItemId;

use super::{Task, TaskChain};
use crate::config::{
    DeclarationRegistry, PropertyConfiguration, PropertyDeclaration, TypeConfiguration,
    TypeDeclaration, TypeKey,
};
use crate::mappers::DataMapperResolver;

pub const IDENTITY: &str = "identity";
pub const INHERITANCE: &str = "inheritance";
pub const PROPERTY_MAPPING: &str = "property_mapping";
pub const FIELD_COLLISION: &str = "field_collision";

/// One step of configuration resolution.
pub trait ConfigurationTask: Task {
    fn execute(&self, args: &mut ConfigurationResolverArgs<'_>) -> MapperResult<()>;
}

/// Working state shared by the resolver tasks of one resolution.
pub struct ConfigurationResolverArgs<'a> {
    pub declaration: &'a TypeDeclaration,
    /// Snapshot of every declared type
    pub declarations: &'a DeclarationRegistry,
    pub mappers: &'a DataMapperResolver,
    pub template_id: Option<ItemId>,
    pub branch_id: Option<ItemId>,
    /// Nearest base first
    pub ancestors: Vec<TypeKey>,
    /// Effective property declarations, own ones until inheritance runs
    pub properties: Vec<PropertyDeclaration>,
    pub mappings: Vec<PropertyConfiguration>,
}

impl<'a> ConfigurationResolverArgs<'a> {
    pub fn new(
        declaration: &'a TypeDeclaration,
        declarations: &'a DeclarationRegistry,
        mappers: &'a DataMapperResolver,
    ) -> Self {
        Self {
            declaration,
            declarations,
            mappers,
            template_id: None,
            branch_id: None,
            ancestors: Vec::new(),
            properties: declaration.properties.clone(),
            mappings: Vec::new(),
        }
    }

    pub fn type_key(&self) -> &TypeKey {
        &self.declaration.type_key
    }

    /// Error attributed to the type being resolved
    pub fn error(&self, message: impl Into<String>) -> MapperError {
        MapperError::configuration(self.type_key().as_str(), message)
    }

    fn into_configuration(self) -> TypeConfiguration {
        TypeConfiguration::new(
            self.declaration.type_key.clone(),
            self.template_id.unwrap_or(ItemId::NULL),
            self.branch_id.unwrap_or(ItemId::NULL),
            self.ancestors,
            self.mappings,
        )
    }
}

// =============================================================================
// Default tasks
// =============================================================================

/// Validates the type key and parses template and branch ids.
pub struct IdentityTask;

impl Task for IdentityTask {
    fn name(&self) -> &str {
        IDENTITY
    }
}

impl ConfigurationTask for IdentityTask {
    fn execute(&self, args: &mut ConfigurationResolverArgs<'_>) -> MapperResult<()> {
        if !args.type_key().is_well_formed() {
            return Err(args.error(format!("'{}' is not a valid type key", args.type_key())));
        }
        args.template_id = parse_identity(args, "template", args.declaration.template_id.as_deref())?;
        args.branch_id = parse_identity(args, "branch", args.declaration.branch_id.as_deref())?;
        Ok(())
    }
}

/// Missing or blank identities resolve to `ItemId::NULL`
fn parse_identity(
    args: &ConfigurationResolverArgs<'_>,
    what: &str,
    raw: Option<&str>,
) -> MapperResult<Option<ItemId>> {
    let Some(raw) = raw else {
        return Ok(Some(ItemId::NULL));
    };
    ItemId::parse_optional(raw)
        .map(|id| Some(id.unwrap_or(ItemId::NULL)))
        .map_err(|_| args.error(format!("malformed {} id '{}'", what, raw)))
}

/// Walks the base chain and merges inherited properties.
///
/// A derived property replaces an inherited one of the same name in the
/// inherited position; new properties follow the inherited ones.
pub struct InheritanceTask;

impl Task for InheritanceTask {
    fn name(&self) -> &str {
        INHERITANCE
    }
}

impl ConfigurationTask for InheritanceTask {
    fn execute(&self, args: &mut ConfigurationResolverArgs<'_>) -> MapperResult<()> {
        let mut visited = HashSet::from([args.type_key().clone()]);
        let mut chain: Vec<&TypeDeclaration> = Vec::new();
        let mut current = args.declaration.base_type.as_ref();

        while let Some(base) = current {
            if !visited.insert(base.clone()) {
                return Err(args.error(format!("inheritance cycle through '{}'", base)));
            }
            let declaration = args
                .declarations
                .get(base)
                .ok_or_else(|| args.error(format!("base type '{}' is not declared", base)))?;
            chain.push(declaration);
            current = declaration.base_type.as_ref();
        }

        let mut merged: Vec<PropertyDeclaration> = Vec::new();
        for layer in chain.iter().rev().map(|d| &d.properties).chain([&args.properties]) {
            ensure_unique_names(args, layer)?;
            for property in layer {
                match merged.iter().position(|p| p.name == property.name) {
                    Some(index) => merged[index] = property.clone(),
                    None => merged.push(property.clone()),
                }
            }
        }

        args.ancestors = chain.iter().map(|d| d.type_key.clone()).collect();
        args.properties = merged;
        Ok(())
    }
}

fn ensure_unique_names(
    args: &ConfigurationResolverArgs<'_>,
    properties: &[PropertyDeclaration],
) -> MapperResult<()> {
    let mut names = HashSet::new();
    for property in properties {
        if !names.insert(property.name.as_str()) {
            return Err(args.error(format!(
                "property '{}' is declared more than once",
                property.name
            )));
        }
    }
    Ok(())
}

/// Selects one data mapper per property.
pub struct PropertyMappingTask;

impl Task for PropertyMappingTask {
    fn name(&self) -> &str {
        PROPERTY_MAPPING
    }
}

impl ConfigurationTask for PropertyMappingTask {
    fn execute(&self, args: &mut ConfigurationResolverArgs<'_>) -> MapperResult<()> {
        ensure_unique_names(args, &args.properties)?;

        let mut mappings = Vec::with_capacity(args.properties.len());
        for property in &args.properties {
            if property.name.trim().is_empty() {
                return Err(args.error("property name must not be blank"));
            }
            if property.kind.source_field().is_some_and(|f| f.trim().is_empty()) {
                return Err(args.error(format!(
                    "property '{}' has a blank source field",
                    property.name
                )));
            }
            if let Some(target) = property.kind.target() {
                if !args.declarations.contains(target) {
                    return Err(args.error(format!(
                        "property '{}' references undeclared type '{}'",
                        property.name, target
                    )));
                }
            }

            match args.mappers.select(args.type_key(), property)? {
                Some(mapper) => mappings.push(PropertyConfiguration::new(property, mapper)),
                None => tracing::debug!(
                    type_key = %args.type_key(),
                    property = %property.name,
                    "Dropping ignorable property with no data mapper"
                ),
            }
        }

        ensure_targets_mappable(args)?;
        args.mappings = mappings;
        Ok(())
    }
}

/// Check every type reachable through references and base links, so that a
/// target which can never be mapped fails this resolution instead of a
/// later construction.
fn ensure_targets_mappable(args: &ConfigurationResolverArgs<'_>) -> MapperResult<()> {
    let mut visited = HashSet::from([args.type_key().clone()]);
    let mut pending: Vec<&TypeKey> = args
        .properties
        .iter()
        .filter_map(|p| p.kind.target())
        .collect();

    while let Some(key) = pending.pop() {
        if !visited.insert(key.clone()) {
            continue;
        }
        let declaration = args.declarations.get(key).ok_or_else(|| {
            args.error(format!("reachable type '{}' is not declared", key))
        })?;
        pending.extend(declaration.base_type.as_ref());
        for property in &declaration.properties {
            pending.extend(property.kind.target());
            args.mappers.select(key, property)?;
        }
    }
    Ok(())
}

/// Rejects two properties bound to one field through different strategies.
pub struct FieldCollisionTask;

impl Task for FieldCollisionTask {
    fn name(&self) -> &str {
        FIELD_COLLISION
    }
}

impl ConfigurationTask for FieldCollisionTask {
    fn execute(&self, args: &mut ConfigurationResolverArgs<'_>) -> MapperResult<()> {
        let mut bound: HashMap<&str, &PropertyConfiguration> = HashMap::new();
        for mapping in &args.mappings {
            let Some(field) = mapping.source_field() else {
                continue;
            };
            match bound.get(field) {
                Some(other) if other.mapper().name() != mapping.mapper().name() => {
                    return Err(args.error(format!(
                        "properties '{}' ({}) and '{}' ({}) collide on field '{}'",
                        other.name(),
                        other.mapper().name(),
                        mapping.name(),
                        mapping.mapper().name(),
                        field
                    )));
                }
                Some(_) => {}
                None => {
                    bound.insert(field, mapping);
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Runs the configuration task chain for one declaration at a time.
#[derive(Clone)]
pub struct ConfigurationResolver {
    tasks: TaskChain<dyn ConfigurationTask>,
    mappers: DataMapperResolver,
}

impl ConfigurationResolver {
    pub fn new(tasks: TaskChain<dyn ConfigurationTask>, mappers: DataMapperResolver) -> Self {
        Self { tasks, mappers }
    }

    /// Default tasks with the default data mappers
    pub fn with_defaults() -> Self {
        Self::new(Self::default_tasks(), DataMapperResolver::with_defaults())
    }

    pub fn default_tasks() -> TaskChain<dyn ConfigurationTask> {
        let tasks: Vec<Arc<dyn ConfigurationTask>> = vec![
            Arc::new(IdentityTask),
            Arc::new(InheritanceTask),
            Arc::new(PropertyMappingTask),
            Arc::new(FieldCollisionTask),
        ];
        TaskChain::from_unique(tasks)
    }

    pub fn tasks(&self) -> &TaskChain<dyn ConfigurationTask> {
        &self.tasks
    }

    pub fn mappers(&self) -> &DataMapperResolver {
        &self.mappers
    }

    /// Resolve one declaration against a registry snapshot.
    pub fn resolve(
        &self,
        declaration: &TypeDeclaration,
        declarations: &DeclarationRegistry,
    ) -> MapperResult<TypeConfiguration> {
        let mut args = ConfigurationResolverArgs::new(declaration, declarations, &self.mappers);

        for task in self.tasks.iter() {
            if let Err(e) = task.execute(&mut args) {
                tracing::warn!(
                    type_key = %declaration.type_key,
                    task = task.name(),
                    error = %e,
                    "Configuration resolution failed"
                );
                return Err(e);
            }
        }

        let configuration = args.into_configuration();
        tracing::debug!(
            type_key = %configuration.type_key(),
            properties = configuration.properties().len(),
            "Resolved configuration"
        );
        Ok(configuration)
    }
}

impl Default for ConfigurationResolver {
    fn default() -> Self {
        Self::with_defaults()
    }
}
