//! Mapped object instances.
//!
//! A [`MappedObject`] carries one value slot per configured property. Eager
//! objects have every slot filled by the construction pipeline. Lazy proxies
//! start empty and fill each slot on first access; every slot has its own
//! guard, so concurrent accesses to different properties never block each
//! other and concurrent accesses to the same property perform one store read.
//!
//! Proxies keep only a `Weak` handle on the context that created them plus
//! the item id, never the referenced object graph.

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use common::{MapperError, MapperResult};
use domain::ItemId;

use crate::config::{TypeConfiguration, TypeDeclaration, TypeKey};
use crate::context::MapperContext;

static NULL: Value = Value::Null;

/// Typed property value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Guid(ItemId),
    Object(MappedObject),
    Objects(Vec<MappedObject>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Variant name used in mismatch messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::DateTime(_) => "date_time",
            Value::Guid(_) => "guid",
            Value::Object(_) => "object",
            Value::Objects(_) => "objects",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_guid(&self) -> Option<ItemId> {
        match self {
            Value::Guid(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&MappedObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_objects(&self) -> Option<&[MappedObject]> {
        match self {
            Value::Objects(list) => Some(list),
            _ => None,
        }
    }
}

/// Mapped objects compare by identity (type and item), not by content.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Guid(a), Value::Guid(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.same_identity(b),
            (Value::Objects(a), Value::Objects(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_identity(y))
            }
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::DateTime(d)
    }
}

impl From<ItemId> for Value {
    fn from(id: ItemId) -> Self {
        Value::Guid(id)
    }
}

impl From<MappedObject> for Value {
    fn from(o: MappedObject) -> Self {
        Value::Object(o)
    }
}

impl From<Vec<MappedObject>> for Value {
    fn from(list: Vec<MappedObject>) -> Self {
        Value::Objects(list)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Nested objects serialize as `{ "type", "id" }` references, never inline.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::DateTime(d) => serializer.serialize_str(&d.to_rfc3339()),
            Value::Guid(id) => serializer.serialize_str(&id.to_string()),
            Value::Object(o) => o.reference().serialize(serializer),
            Value::Objects(list) => {
                let mut seq = serializer.serialize_seq(Some(list.len()))?;
                for o in list {
                    seq.serialize_element(&o.reference())?;
                }
                seq.end()
            }
        }
    }
}

/// Serialized form of a nested object
struct ObjectReference<'a> {
    type_key: &'a TypeKey,
    item_id: ItemId,
}

impl Serialize for ObjectReference<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", self.type_key.as_str())?;
        map.serialize_entry("id", &self.item_id.to_string())?;
        map.end()
    }
}

/// Handle an adapter uses to mark one property as directly editable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldHandle {
    pub item_id: ItemId,
    pub type_key: TypeKey,
    pub property: String,
    /// Raw field backing the property, if any
    pub field: Option<String>,
    /// Only field-backed, writable properties can be edited in place
    pub editable: bool,
}

/// A populated domain object or lazy proxy.
#[derive(Clone)]
pub struct MappedObject {
    configuration: Arc<TypeConfiguration>,
    item_id: ItemId,
    slots: Box<[OnceCell<Value>]>,
    /// Set for lazy proxies only
    origin: Option<Weak<MapperContext>>,
}

impl MappedObject {
    /// Empty object whose slots are filled by the caller or the pipeline
    pub fn detached(configuration: Arc<TypeConfiguration>, item_id: ItemId) -> Self {
        let slots = empty_slots(configuration.properties().len());
        Self {
            configuration,
            item_id,
            slots,
            origin: None,
        }
    }

    /// Proxy resolving each property from the store on first access
    pub(crate) fn lazy(
        configuration: Arc<TypeConfiguration>,
        item_id: ItemId,
        origin: Weak<MapperContext>,
    ) -> Self {
        let slots = empty_slots(configuration.properties().len());
        Self {
            configuration,
            item_id,
            slots,
            origin: Some(origin),
        }
    }

    pub fn configuration(&self) -> &Arc<TypeConfiguration> {
        &self.configuration
    }

    pub fn type_key(&self) -> &TypeKey {
        self.configuration.type_key()
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn is_lazy(&self) -> bool {
        self.origin.is_some()
    }

    /// Same type and same backing item
    pub fn same_identity(&self, other: &MappedObject) -> bool {
        self.item_id == other.item_id && self.type_key() == other.type_key()
    }

    /// Value of a property, resolving it first if this is a proxy.
    pub fn get(&self, name: &str) -> MapperResult<&Value> {
        let index = self.index_of(name)?;
        let slot = &self.slots[index];

        let Some(origin) = &self.origin else {
            return Ok(slot.get().unwrap_or(&NULL));
        };

        slot.get_or_try_init(|| {
            let context = origin.upgrade().ok_or_else(|| {
                MapperError::property_construction(
                    self.type_key().as_str(),
                    name,
                    "mapper context has been dropped",
                )
            })?;
            context.read_property(&self.configuration, index, self.item_id, None, false)
        })
    }

    /// Value of a property only if it has already been loaded or set
    pub fn loaded(&self, name: &str) -> Option<&Value> {
        let index = self.configuration.property_index(name)?;
        self.slots[index].get()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded(name).is_some()
    }

    /// Number of slots holding a value
    pub fn loaded_count(&self) -> usize {
        self.slots.iter().filter(|s| s.get().is_some()).count()
    }

    /// Replace a property value; the new value is what a save writes back.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> MapperResult<()> {
        let index = self.index_of(name)?;
        self.slots[index] = OnceCell::with_value(value.into());
        Ok(())
    }

    /// Fill a slot during construction; an already filled slot is kept.
    pub(crate) fn fill(&self, index: usize, value: Value) {
        let _ = self.slots[index].set(value);
    }

    pub fn field_handle(&self, name: &str) -> MapperResult<FieldHandle> {
        let property = self
            .configuration
            .property(name)
            .ok_or_else(|| MapperError::unknown_property(self.type_key().as_str(), name))?;
        let field = property.source_field().map(str::to_string);
        Ok(FieldHandle {
            item_id: self.item_id,
            type_key: self.type_key().clone(),
            property: property.name().to_string(),
            editable: field.is_some() && !property.is_read_only(),
            field,
        })
    }

    // =========================================================================
    // Typed accessors
    // =========================================================================

    pub fn get_text(&self, name: &str) -> MapperResult<Option<&str>> {
        self.typed(name, Value::as_text)
    }

    pub fn get_integer(&self, name: &str) -> MapperResult<Option<i64>> {
        self.typed(name, Value::as_integer)
    }

    pub fn get_float(&self, name: &str) -> MapperResult<Option<f64>> {
        self.typed(name, Value::as_float)
    }

    pub fn get_bool(&self, name: &str) -> MapperResult<Option<bool>> {
        self.typed(name, Value::as_bool)
    }

    pub fn get_date_time(&self, name: &str) -> MapperResult<Option<DateTime<Utc>>> {
        self.typed(name, Value::as_date_time)
    }

    pub fn get_guid(&self, name: &str) -> MapperResult<Option<ItemId>> {
        self.typed(name, Value::as_guid)
    }

    pub fn get_object(&self, name: &str) -> MapperResult<Option<&MappedObject>> {
        self.typed(name, Value::as_object)
    }

    pub fn get_objects(&self, name: &str) -> MapperResult<Option<&[MappedObject]>> {
        self.typed(name, Value::as_objects)
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        extract: impl FnOnce(&'a Value) -> Option<T>,
    ) -> MapperResult<Option<T>> {
        let value = self.get(name)?;
        if value.is_null() {
            return Ok(None);
        }
        let kind = value.type_name();
        extract(value).map(Some).ok_or_else(|| {
            MapperError::mapping(format!(
                "{}.{} holds a {} value",
                self.type_key(),
                name,
                kind
            ))
        })
    }

    fn index_of(&self, name: &str) -> MapperResult<usize> {
        self.configuration
            .property_index(name)
            .ok_or_else(|| MapperError::unknown_property(self.type_key().as_str(), name))
    }

    fn reference(&self) -> ObjectReference<'_> {
        ObjectReference {
            type_key: self.type_key(),
            item_id: self.item_id,
        }
    }
}

fn empty_slots(len: usize) -> Box<[OnceCell<Value>]> {
    (0..len).map(|_| OnceCell::new()).collect()
}

impl fmt::Debug for MappedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedObject")
            .field("type", self.type_key())
            .field("item_id", &self.item_id)
            .field("lazy", &self.is_lazy())
            .field("loaded", &self.loaded_count())
            .finish()
    }
}

/// Serializes every loaded property; unloaded proxy slots are omitted.
impl Serialize for MappedObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.type_key().as_str())?;
        map.serialize_entry("id", &self.item_id.to_string())?;
        for (property, slot) in self.configuration.properties().iter().zip(self.slots.iter()) {
            if let Some(value) = slot.get() {
                map.serialize_entry(property.name(), value)?;
            }
        }
        map.end()
    }
}

/// Typed facade over [`MappedObject`] for plain Rust structs.
///
/// ```ignore
/// impl MappedType for Article {
///     fn declaration() -> TypeDeclaration {
///         TypeDeclaration::new("Article").field("Title", "Title", ValueType::Text)
///     }
///     fn from_object(object: &MappedObject) -> MapperResult<Self> {
///         Ok(Self { title: object.get_text("Title")?.map(str::to_string) })
///     }
///     fn write_to(&self, object: &mut MappedObject) -> MapperResult<()> {
///         object.set("Title", self.title.clone())
///     }
/// }
/// ```
pub trait MappedType: Sized {
    fn declaration() -> TypeDeclaration;

    fn type_key() -> TypeKey {
        Self::declaration().type_key
    }

    fn from_object(object: &MappedObject) -> MapperResult<Self>;

    fn write_to(&self, object: &mut MappedObject) -> MapperResult<()>;
}
