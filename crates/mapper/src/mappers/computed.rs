//! User-supplied computed properties.

use std::fmt;
use std::sync::Arc;

use common::MapperResult;

use super::{DataMapper, ReadContext, WriteContext};
use crate::config::{PropertyConfiguration, PropertyDeclaration, PropertyKind};
use crate::object::Value;

type Computation = dyn Fn(&ReadContext<'_>) -> MapperResult<Value> + Send + Sync;

/// Read-only strategy for `Computed` properties with a matching computation
/// name. Not part of the defaults; register one per computation.
#[derive(Clone)]
pub struct ComputedMapper {
    computation: String,
    name: String,
    compute: Arc<Computation>,
}

impl ComputedMapper {
    pub fn new<F>(computation: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&ReadContext<'_>) -> MapperResult<Value> + Send + Sync + 'static,
    {
        let computation = computation.into();
        Self {
            name: format!("computed:{}", computation),
            computation,
            compute: Arc::new(compute),
        }
    }

    pub fn computation(&self) -> &str {
        &self.computation
    }
}

impl DataMapper for ComputedMapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_handle(&self, property: &PropertyDeclaration) -> bool {
        matches!(&property.kind, PropertyKind::Computed { computation } if *computation == self.computation)
    }

    fn read(&self, ctx: &ReadContext<'_>, _property: &PropertyConfiguration) -> MapperResult<Value> {
        (self.compute)(ctx)
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

impl fmt::Debug for ComputedMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedMapper")
            .field("computation", &self.computation)
            .finish()
    }
}
