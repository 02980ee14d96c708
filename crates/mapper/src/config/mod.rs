//! Configuration model.
//!
//! A [`TypeConfiguration`] is the resolved, immutable description of how one
//! declared type maps onto store items. It is created once per type by the
//! resolver pipeline, published to the configuration cache as an `Arc`, and
//! never mutated afterwards.

pub mod declaration;
pub mod registry;

pub use declaration::{
    InfoKind, PropertyDeclaration, PropertyKind, TypeDeclaration, TypeKey, ValueType,
};
pub use registry::DeclarationRegistry;

use std::fmt;
use std::sync::Arc;

use domain::ItemId;
use serde::Serialize;

use crate::mappers::DataMapper;

/// One resolved property binding.
#[derive(Clone)]
pub struct PropertyConfiguration {
    name: String,
    kind: PropertyKind,
    mapper: Arc<dyn DataMapper>,
    lazy: bool,
    optional: bool,
    read_only: bool,
}

impl PropertyConfiguration {
    /// Bind a declared property to the mapper selected for it
    pub fn new(declaration: &PropertyDeclaration, mapper: Arc<dyn DataMapper>) -> Self {
        let read_only = declaration.read_only || mapper.is_read_only();
        Self {
            name: declaration.name.clone(),
            kind: declaration.kind.clone(),
            mapper,
            lazy: declaration.lazy,
            optional: declaration.optional,
            read_only,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn mapper(&self) -> &Arc<dyn DataMapper> {
        &self.mapper
    }

    /// Source field, if the property reads one
    pub fn source_field(&self) -> Option<&str> {
        self.kind.source_field()
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Serializable summary for diagnostics
    pub fn summary(&self) -> PropertySummary {
        PropertySummary {
            name: self.name.clone(),
            kind: self.kind.label(),
            field: self.source_field().map(str::to_string),
            target: self.kind.target().map(|t| t.to_string()),
            mapper: self.mapper.name().to_string(),
            lazy: self.lazy,
            optional: self.optional,
            read_only: self.read_only,
        }
    }
}

impl PartialEq for PropertyConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.mapper.name() == other.mapper.name()
            && self.lazy == other.lazy
            && self.optional == other.optional
            && self.read_only == other.read_only
    }
}

impl fmt::Debug for PropertyConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyConfiguration")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("mapper", &self.mapper.name())
            .field("lazy", &self.lazy)
            .field("optional", &self.optional)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Resolved configuration of one mapped type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeConfiguration {
    type_key: TypeKey,
    template_id: ItemId,
    branch_id: ItemId,
    /// Nearest base first
    ancestors: Vec<TypeKey>,
    properties: Vec<PropertyConfiguration>,
}

impl TypeConfiguration {
    pub fn new(
        type_key: TypeKey,
        template_id: ItemId,
        branch_id: ItemId,
        ancestors: Vec<TypeKey>,
        properties: Vec<PropertyConfiguration>,
    ) -> Self {
        Self {
            type_key,
            template_id,
            branch_id,
            ancestors,
            properties,
        }
    }

    pub fn type_key(&self) -> &TypeKey {
        &self.type_key
    }

    pub fn template_id(&self) -> ItemId {
        self.template_id
    }

    pub fn branch_id(&self) -> ItemId {
        self.branch_id
    }

    pub fn ancestors(&self) -> &[TypeKey] {
        &self.ancestors
    }

    pub fn properties(&self) -> &[PropertyConfiguration] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyConfiguration> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    /// Whether an object of this type may stand in for `other`
    pub fn is_assignable_to(&self, other: &TypeKey) -> bool {
        &self.type_key == other || self.ancestors.contains(other)
    }

    /// Serializable summary for diagnostics
    pub fn summary(&self) -> ConfigurationSummary {
        ConfigurationSummary {
            type_key: self.type_key.to_string(),
            template_id: self.template_id.to_string(),
            branch_id: self.branch_id.to_string(),
            ancestors: self.ancestors.iter().map(ToString::to_string).collect(),
            properties: self.properties.iter().map(|p| p.summary()).collect(),
        }
    }
}

/// Flattened view of a [`TypeConfiguration`]
#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationSummary {
    #[serde(rename = "type")]
    pub type_key: String,
    pub template_id: String,
    pub branch_id: String,
    pub ancestors: Vec<String>,
    pub properties: Vec<PropertySummary>,
}

/// Flattened view of a [`PropertyConfiguration`]
#[derive(Debug, Clone, Serialize)]
pub struct PropertySummary {
    pub name: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub mapper: String,
    pub lazy: bool,
    pub optional: bool,
    pub read_only: bool,
}
