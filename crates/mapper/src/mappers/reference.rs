//! Strategies mapping item relations to other mapped types.

use common::{MapperError, MapperResult};
use domain::ItemId;

use super::{DataMapper, ReadContext, WriteContext};
use crate::config::{PropertyConfiguration, PropertyDeclaration, PropertyKind, TypeKey};
use crate::object::{MappedObject, Value};

fn target_of(property: &PropertyConfiguration) -> MapperResult<&TypeKey> {
    property.kind().target().ok_or_else(|| {
        MapperError::mapping(format!("{} has no target type", property.name()))
    })
}

fn field_of(property: &PropertyConfiguration) -> MapperResult<&str> {
    property.source_field().ok_or_else(|| {
        MapperError::mapping(format!("{} is not bound to a field", property.name()))
    })
}

/// Map every id to `target`, dropping ids whose items no longer exist
fn references(
    ctx: &ReadContext<'_>,
    target: &TypeKey,
    ids: Vec<ItemId>,
    lazy: bool,
) -> MapperResult<Value> {
    let mut objects = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(object) = ctx.reference(target, id, lazy)? {
            objects.push(object);
        }
    }
    Ok(Value::Objects(objects))
}

fn id_of(value: &MappedObject) -> ItemId {
    value.item_id()
}

/// Single item id stored in a raw field.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceMapper;

impl DataMapper for ReferenceMapper {
    fn name(&self) -> &str {
        "reference"
    }

    fn can_handle(&self, property: &PropertyDeclaration) -> bool {
        matches!(property.kind, PropertyKind::Reference { .. })
    }

    fn read(&self, ctx: &ReadContext<'_>, property: &PropertyConfiguration) -> MapperResult<Value> {
        let target = target_of(property)?;
        let raw = ctx.field(field_of(property)?)?.unwrap_or_default();
        let Some(id) = ItemId::parse_optional(&raw)
            .map_err(|e| MapperError::mapping(format!("{}.{}: {}", ctx.type_key(), property.name(), e)))?
        else {
            return Ok(Value::Null);
        };
        Ok(ctx
            .reference(target, id, property.is_lazy())?
            .map(Value::Object)
            .unwrap_or(Value::Null))
    }

    fn write(
        &self,
        ctx: &WriteContext<'_>,
        property: &PropertyConfiguration,
        value: &Value,
    ) -> MapperResult<()> {
        let raw = match value {
            Value::Null => String::new(),
            Value::Object(object) => id_of(object).to_string(),
            Value::Guid(id) => id.to_string(),
            other => {
                return Err(MapperError::mapping(format!(
                    "{}.{}: expected object, got {}",
                    ctx.type_key(),
                    property.name(),
                    other.type_name()
                )))
            }
        };
        ctx.write_field(field_of(property)?, &raw)
    }
}

/// Separated item ids stored in a raw field.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceListMapper;

impl DataMapper for ReferenceListMapper {
    fn name(&self) -> &str {
        "reference_list"
    }

    fn can_handle(&self, property: &PropertyDeclaration) -> bool {
        matches!(property.kind, PropertyKind::ReferenceList { .. })
    }

    fn read(&self, ctx: &ReadContext<'_>, property: &PropertyConfiguration) -> MapperResult<Value> {
        let target = target_of(property)?;
        let raw = ctx.field(field_of(property)?)?.unwrap_or_default();
        let ids = ItemId::parse_list(&raw).map_err(|e| {
            MapperError::mapping(format!("{}.{}: {}", ctx.type_key(), property.name(), e))
        })?;
        references(ctx, target, ids, property.is_lazy())
    }

    fn write(
        &self,
        ctx: &WriteContext<'_>,
        property: &PropertyConfiguration,
        value: &Value,
    ) -> MapperResult<()> {
        let raw = match value {
            Value::Null => String::new(),
            Value::Objects(objects) => {
                let ids: Vec<ItemId> = objects.iter().map(id_of).collect();
                ItemId::join(&ids)
            }
            other => {
                return Err(MapperError::mapping(format!(
                    "{}.{}: expected objects, got {}",
                    ctx.type_key(),
                    property.name(),
                    other.type_name()
                )))
            }
        };
        ctx.write_field(field_of(property)?, &raw)
    }
}

/// Direct children of the item.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildrenMapper;

impl DataMapper for ChildrenMapper {
    fn name(&self) -> &str {
        "children"
    }

    fn can_handle(&self, property: &PropertyDeclaration) -> bool {
        matches!(property.kind, PropertyKind::Children { .. })
    }

    fn read(&self, ctx: &ReadContext<'_>, property: &PropertyConfiguration) -> MapperResult<Value> {
        let target = target_of(property)?;
        let ids = ctx.children()?;
        references(ctx, target, ids, property.is_lazy())
    }

    fn write(
        &self,
        _ctx: &WriteContext<'_>,
        _property: &PropertyConfiguration,
        _value: &Value,
    ) -> MapperResult<()> {
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        true
    }
}

/// Parent of the item.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentMapper;

impl DataMapper for ParentMapper {
    fn name(&self) -> &str {
        "parent"
    }

    fn can_handle(&self, property: &PropertyDeclaration) -> bool {
        matches!(property.kind, PropertyKind::Parent { .. })
    }

    fn read(&self, ctx: &ReadContext<'_>, property: &PropertyConfiguration) -> MapperResult<Value> {
        let target = target_of(property)?;
        let Some(parent) = ctx.item()?.parent_id else {
            return Ok(Value::Null);
        };
        Ok(ctx
            .reference(target, parent, property.is_lazy())?
            .map(Value::Object)
            .unwrap_or(Value::Null))
    }

    fn write(
        &self,
        _ctx: &WriteContext<'_>,
        _property: &PropertyConfiguration,
        _value: &Value,
    ) -> MapperResult<()> {
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        true
    }
}
