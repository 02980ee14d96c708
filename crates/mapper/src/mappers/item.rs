//! Strategies exposing item identity and metadata.

use common::MapperResult;

use super::{DataMapper, ReadContext, WriteContext};
use crate::config::{InfoKind, PropertyConfiguration, PropertyDeclaration, PropertyKind};
use crate::object::Value;

/// The item's own id. Never touches the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdMapper;

impl DataMapper for IdMapper {
    fn name(&self) -> &str {
        "item_id"
    }

    fn can_handle(&self, property: &PropertyDeclaration) -> bool {
        matches!(property.kind, PropertyKind::Id)
    }

    fn read(&self, ctx: &ReadContext<'_>, _property: &PropertyConfiguration) -> MapperResult<Value> {
        Ok(Value::Guid(ctx.item_id()))
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

/// Item name, path or template.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfoMapper;

impl DataMapper for InfoMapper {
    fn name(&self) -> &str {
        "item_info"
    }

    fn can_handle(&self, property: &PropertyDeclaration) -> bool {
        matches!(property.kind, PropertyKind::Info { .. })
    }

    fn read(&self, ctx: &ReadContext<'_>, property: &PropertyConfiguration) -> MapperResult<Value> {
        let PropertyKind::Info { info } = property.kind() else {
            return Ok(Value::Null);
        };
        let item = ctx.item()?;
        Ok(match info {
            InfoKind::Name => Value::Text(item.name.clone()),
            InfoKind::Path => Value::Text(item.path.clone()),
            InfoKind::TemplateId => Value::Guid(item.template_id),
        })
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
