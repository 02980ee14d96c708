//! Raw mapping declarations.
//!
//! A declaration is plain data describing how a type should map onto store
//! items. Nothing here is validated; the configuration resolver pipeline
//! turns declarations into immutable [`TypeConfiguration`]s and rejects the
//! malformed ones.
//!
//! [`TypeConfiguration`]: super::TypeConfiguration

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TYPE_KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.:]*$").expect("type key pattern is valid")
});

/// Identity of a mapped type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeKey(String);

impl TypeKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key matches the type key grammar
    pub fn is_well_formed(&self) -> bool {
        TYPE_KEY_PATTERN.is_match(&self.0)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for TypeKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl AsRef<str> for TypeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Typed interpretation of a raw scalar field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    Text,
    Integer,
    Float,
    Boolean,
    DateTime,
    Guid,
    /// Only mappable through a registered custom strategy
    Custom(String),
}

/// Item metadata exposed through `Info` properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoKind {
    Name,
    Path,
    TemplateId,
}

/// Shape of a declared property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    /// Scalar value read from one raw field
    Field {
        field: String,
        #[serde(default)]
        value_type: ValueType,
    },
    /// Single item id in a raw field, mapped to another type
    Reference { field: String, target: TypeKey },
    /// Separated item ids in a raw field, mapped to another type
    ReferenceList { field: String, target: TypeKey },
    /// Child items, mapped to another type
    Children { target: TypeKey },
    /// Parent item, mapped to another type
    Parent { target: TypeKey },
    /// The item's own id
    Id,
    /// Item metadata
    Info { info: InfoKind },
    /// Value produced by a named computation
    Computed { computation: String },
}

impl PropertyKind {
    /// Raw field this property is bound to, if any
    pub fn source_field(&self) -> Option<&str> {
        match self {
            PropertyKind::Field { field, .. }
            | PropertyKind::Reference { field, .. }
            | PropertyKind::ReferenceList { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Mapped type this property points at, if any
    pub fn target(&self) -> Option<&TypeKey> {
        match self {
            PropertyKind::Reference { target, .. }
            | PropertyKind::ReferenceList { target, .. }
            | PropertyKind::Children { target }
            | PropertyKind::Parent { target } => Some(target),
            _ => None,
        }
    }

    /// Short label used in logs and CLI output
    pub fn label(&self) -> &'static str {
        match self {
            PropertyKind::Field { .. } => "field",
            PropertyKind::Reference { .. } => "reference",
            PropertyKind::ReferenceList { .. } => "reference_list",
            PropertyKind::Children { .. } => "children",
            PropertyKind::Parent { .. } => "parent",
            PropertyKind::Id => "id",
            PropertyKind::Info { .. } => "info",
            PropertyKind::Computed { .. } => "computed",
        }
    }
}

fn default_lazy() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One declared property of a mapped type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDeclaration {
    pub name: String,
    #[serde(flatten)]
    pub kind: PropertyKind,
    /// Load referenced items as proxies (reference kinds only)
    #[serde(default = "default_lazy", skip_serializing_if = "is_true")]
    pub lazy: bool,
    /// Leave the property `Null` instead of failing construction
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    /// Drop the property when no data mapper can handle it
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignorable: bool,
    /// Never write the property back
    #[serde(default, skip_serializing_if = "is_false")]
    pub read_only: bool,
}

impl PropertyDeclaration {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            lazy: true,
            optional: false,
            ignorable: false,
            read_only: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn ignorable(mut self) -> Self {
        self.ignorable = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn eager(mut self) -> Self {
        self.lazy = false;
        self
    }
}

/// Declared mapping of one type.
///
/// Built either from JSON or fluently:
///
/// ```
/// use mapper::config::{TypeDeclaration, ValueType};
///
/// let article = TypeDeclaration::new("Article")
///     .template_id("{6F1C2B9E-4D1A-4C3B-9A55-0E2F7A1B3C4D}")
///     .field("Title", "Title", ValueType::Text)
///     .reference("Author", "Author", "Person");
/// assert_eq!(article.properties.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDeclaration {
    #[serde(rename = "type")]
    pub type_key: TypeKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_type: Option<TypeKey>,
    #[serde(default)]
    pub properties: Vec<PropertyDeclaration>,
}

impl TypeDeclaration {
    pub fn new(type_key: impl Into<TypeKey>) -> Self {
        Self {
            type_key: type_key.into(),
            template_id: None,
            branch_id: None,
            base_type: None,
            properties: Vec::new(),
        }
    }

    pub fn template_id(mut self, raw: impl Into<String>) -> Self {
        self.template_id = Some(raw.into());
        self
    }

    pub fn branch_id(mut self, raw: impl Into<String>) -> Self {
        self.branch_id = Some(raw.into());
        self
    }

    pub fn extends(mut self, base: impl Into<TypeKey>) -> Self {
        self.base_type = Some(base.into());
        self
    }

    /// Append an already-built property declaration
    pub fn property(mut self, property: PropertyDeclaration) -> Self {
        self.properties.push(property);
        self
    }

    pub fn field(self, name: &str, field: &str, value_type: ValueType) -> Self {
        self.property(PropertyDeclaration::new(
            name,
            PropertyKind::Field {
                field: field.to_string(),
                value_type,
            },
        ))
    }

    pub fn reference(self, name: &str, field: &str, target: &str) -> Self {
        self.property(PropertyDeclaration::new(
            name,
            PropertyKind::Reference {
                field: field.to_string(),
                target: target.into(),
            },
        ))
    }

    pub fn reference_list(self, name: &str, field: &str, target: &str) -> Self {
        self.property(PropertyDeclaration::new(
            name,
            PropertyKind::ReferenceList {
                field: field.to_string(),
                target: target.into(),
            },
        ))
    }

    pub fn children(self, name: &str, target: &str) -> Self {
        self.property(PropertyDeclaration::new(
            name,
            PropertyKind::Children {
                target: target.into(),
            },
        ))
    }

    pub fn parent(self, name: &str, target: &str) -> Self {
        self.property(PropertyDeclaration::new(
            name,
            PropertyKind::Parent {
                target: target.into(),
            },
        ))
    }

    pub fn id(self, name: &str) -> Self {
        self.property(PropertyDeclaration::new(name, PropertyKind::Id))
    }

    pub fn info(self, name: &str, info: InfoKind) -> Self {
        self.property(PropertyDeclaration::new(name, PropertyKind::Info { info }))
    }

    pub fn computed(self, name: &str, computation: &str) -> Self {
        self.property(PropertyDeclaration::new(
            name,
            PropertyKind::Computed {
                computation: computation.to_string(),
            },
        ))
    }
}
