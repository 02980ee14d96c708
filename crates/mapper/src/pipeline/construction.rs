//! Object construction pipeline.
//!
//! Default task order:
//!
//! 1. `infer_type`: switch to the most-derived declared type for the item
//! 2. `create_instance`: allocate a lazy proxy or an empty eager object
//! 3. `populate`: run every property's mapper against the item snapshot
//!
//! A task may abort the construction (eager construction of a missing item),
//! in which case the caller receives `Ok(None)`.

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use common::{MapperError, MapperResult};
use domain::{Item, ItemId};

use super::{Task, TaskChain};
use crate::config::TypeConfiguration;
use crate::context::MapperContext;
use crate::object::MappedObject;

pub const INFER_TYPE: &str = "infer_type";
pub const CREATE_INSTANCE: &str = "create_instance";
pub const POPULATE: &str = "populate";

/// Per-call construction settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructOptions {
    /// Defer every property to first access
    pub lazy: bool,
    /// Return the most-derived declared type matching the item's template
    pub infer_type: bool,
}

impl ConstructOptions {
    pub fn eager() -> Self {
        Self::default()
    }

    pub fn lazy() -> Self {
        Self {
            lazy: true,
            infer_type: false,
        }
    }

    pub fn with_infer_type(mut self) -> Self {
        self.infer_type = true;
        self
    }
}

/// One step of object construction.
pub trait ConstructionTask: Task {
    fn execute(&self, args: &mut ConstructionArgs<'_>) -> MapperResult<()>;
}

/// Working state of one construction.
pub struct ConstructionArgs<'a> {
    pub context: &'a MapperContext,
    /// Requested type, replaced by `infer_type` with a derived one
    pub configuration: Arc<TypeConfiguration>,
    pub item_id: ItemId,
    /// Item snapshot, when supplied by the caller or loaded by a task
    pub item: Option<Cow<'a, Item>>,
    pub options: ConstructOptions,
    /// Constructing an eagerly loaded reference; its own references stay lazy
    pub nested: bool,
    pub result: Option<MappedObject>,
    aborted: bool,
}

impl<'a> ConstructionArgs<'a> {
    pub fn new(
        context: &'a MapperContext,
        configuration: Arc<TypeConfiguration>,
        item_id: ItemId,
        item: Option<Cow<'a, Item>>,
        options: ConstructOptions,
        nested: bool,
    ) -> Self {
        Self {
            context,
            configuration,
            item_id,
            item,
            options,
            nested,
            result: None,
            aborted: false,
        }
    }

    /// Stop the chain; the construction yields no object
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Load the item snapshot once; `false` when the item does not exist
    pub fn load_item(&mut self) -> MapperResult<bool> {
        if self.item.is_none() {
            self.item = self.context.store().get_item(self.item_id)?.map(Cow::Owned);
        }
        Ok(self.item.is_some())
    }
}

// =============================================================================
// Default tasks
// =============================================================================

/// Picks the most-derived declared type whose template matches the item.
pub struct InferTypeTask;

impl Task for InferTypeTask {
    fn name(&self) -> &str {
        INFER_TYPE
    }
}

impl ConstructionTask for InferTypeTask {
    fn execute(&self, args: &mut ConstructionArgs<'_>) -> MapperResult<()> {
        if !args.options.infer_type {
            return Ok(());
        }
        if !args.load_item()? {
            args.abort();
            return Ok(());
        }
        let template = match args.item.as_deref() {
            Some(item) => item.template_id,
            None => return Ok(()),
        };

        let registry = args.context.declarations();
        let requested = args.configuration.type_key().clone();
        let mut best: Option<Arc<TypeConfiguration>> = None;

        for candidate in registry.descendants(&requested) {
            let matches = registry
                .get(&candidate)
                .and_then(|d| d.template_id.as_deref())
                .and_then(|raw| ItemId::parse_optional(raw).ok().flatten())
                .is_some_and(|id| id == template);
            if !matches {
                continue;
            }
            let configuration = args.context.configuration(&candidate)?;
            let deeper = best
                .as_ref()
                .map_or(true, |b| configuration.ancestors().len() > b.ancestors().len());
            if deeper {
                best = Some(configuration);
            }
        }

        if let Some(inferred) = best {
            tracing::debug!(
                requested = %requested,
                inferred = %inferred.type_key(),
                item_id = %args.item_id,
                "Inferred derived type"
            );
            args.configuration = inferred;
        }
        Ok(())
    }
}

/// Allocates the instance: a proxy when lazy, an empty object otherwise.
pub struct CreateInstanceTask;

impl Task for CreateInstanceTask {
    fn name(&self) -> &str {
        CREATE_INSTANCE
    }
}

impl ConstructionTask for CreateInstanceTask {
    fn execute(&self, args: &mut ConstructionArgs<'_>) -> MapperResult<()> {
        if args.result.is_some() {
            return Ok(());
        }

        if args.options.lazy && !args.nested {
            args.result = Some(MappedObject::lazy(
                Arc::clone(&args.configuration),
                args.item_id,
                args.context.weak(),
            ));
            return Ok(());
        }

        if !args.load_item()? {
            tracing::debug!(
                type_key = %args.configuration.type_key(),
                item_id = %args.item_id,
                "Item not found"
            );
            args.abort();
            return Ok(());
        }
        args.result = Some(MappedObject::detached(
            Arc::clone(&args.configuration),
            args.item_id,
        ));
        Ok(())
    }
}

/// Fills every slot of an eager object from the item snapshot.
pub struct PopulateTask;

impl Task for PopulateTask {
    fn name(&self) -> &str {
        POPULATE
    }
}

impl ConstructionTask for PopulateTask {
    fn execute(&self, args: &mut ConstructionArgs<'_>) -> MapperResult<()> {
        let Some(object) = args.result.as_ref() else {
            return Ok(());
        };
        if object.is_lazy() {
            return Ok(());
        }
        let Some(item) = args.item.as_deref() else {
            return Ok(());
        };

        let configuration = object.configuration();
        for index in 0..configuration.properties().len() {
            let value = args.context.read_property(
                configuration,
                index,
                args.item_id,
                Some(item),
                args.nested,
            )?;
            object.fill(index, value);
        }
        Ok(())
    }
}

// =============================================================================
// Driver
// =============================================================================

pub fn default_tasks() -> TaskChain<dyn ConstructionTask> {
    let tasks: Vec<Arc<dyn ConstructionTask>> = vec![
        Arc::new(InferTypeTask),
        Arc::new(CreateInstanceTask),
        Arc::new(PopulateTask),
    ];
    TaskChain::from_unique(tasks)
}

/// Run a construction chain to completion.
pub fn run(
    tasks: &TaskChain<dyn ConstructionTask>,
    mut args: ConstructionArgs<'_>,
) -> MapperResult<Option<MappedObject>> {
    for task in tasks.iter() {
        task.execute(&mut args)?;
        if args.is_aborted() {
            return Ok(None);
        }
    }

    match args.result {
        Some(object) => Ok(Some(object)),
        None => Err(MapperError::construction(
            args.configuration.type_key().as_str(),
            "no construction task produced an instance",
        )),
    }
}
