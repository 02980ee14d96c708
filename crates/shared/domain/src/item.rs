//! Item entity and identity types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{MULTI_REFERENCE_SEPARATOR, PATH_SEPARATOR};
use crate::error::{DomainError, DomainResult};

/// Store-native item identity.
///
/// Accepts plain, hyphenated and braced GUID text. Always displayed braced
/// and upper-case, which is also the form written back into raw fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(Uuid);

impl ItemId {
    /// The nil identity, used for "no template" / "no branch"
    pub const NULL: ItemId = ItemId(Uuid::nil());

    /// Generate a fresh random identity
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identity from raw store text.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(trimmed);

        Uuid::parse_str(inner)
            .map(Self)
            .map_err(|_| DomainError::invalid_id(raw))
    }

    /// Parse an optional identity; blank text means "not set".
    pub fn parse_optional(raw: &str) -> DomainResult<Option<Self>> {
        if raw.trim().is_empty() {
            Ok(None)
        } else {
            Self::parse(raw).map(Some)
        }
    }

    /// Parse a multi-reference field (`{id}|{id}`), skipping empty segments.
    pub fn parse_list(raw: &str) -> DomainResult<Vec<Self>> {
        raw.split(MULTI_REFERENCE_SEPARATOR)
            .filter(|segment| !segment.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    /// Join identities into multi-reference field text
    pub fn join(ids: &[ItemId]) -> String {
        ids.iter()
            .map(ItemId::to_string)
            .collect::<Vec<_>>()
            .join(&MULTI_REFERENCE_SEPARATOR.to_string())
    }

    /// Check if this is the nil identity
    pub fn is_null(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.0.hyphenated().to_string().to_uppercase();
        write!(f, "{{{}}}", text)
    }
}

impl FromStr for ItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ItemId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.to_string()
    }
}

/// Content item as held by the backing store.
///
/// Field values are raw strings; typing them is the job of data mappers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub template_id: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ItemId>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Item {
    /// Create a new item without fields
    pub fn new(id: ItemId, name: impl Into<String>, template_id: ItemId) -> Self {
        let name = name.into();
        Self {
            id,
            path: format!("{}{}", PATH_SEPARATOR, name),
            name,
            template_id,
            parent_id: None,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder-style parent assignment
    pub fn with_parent(mut self, parent: &Item) -> Self {
        self.parent_id = Some(parent.id);
        self.path = format!(
            "{}{}{}",
            parent.path.trim_end_matches(PATH_SEPARATOR),
            PATH_SEPARATOR,
            self.name
        );
        self
    }

    /// Raw value of a field, if present
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Overwrite a raw field value
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }
}
