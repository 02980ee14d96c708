//! Object saving pipeline.
//!
//! The default `write_properties` task writes each property back in
//! configuration order. Writes are not transactional: when one property
//! fails, the ones written before it stay committed and the error lists
//! them.

use std::sync::Arc;

use serde::Serialize;

use common::{MapperError, MapperResult};
use domain::ItemId;

use super::{Task, TaskChain};
use crate::config::TypeConfiguration;
use crate::context::MapperContext;
use crate::mappers::WriteContext;
use crate::object::MappedObject;

pub const WRITE_PROPERTIES: &str = "write_properties";

/// Outcome of a successful save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub item_id: ItemId,
    /// Properties written, in order
    pub written: Vec<String>,
    /// Read-only or never loaded properties
    pub skipped: Vec<String>,
}

/// One step of object saving.
pub trait SavingTask: Task {
    fn execute(&self, args: &mut SavingArgs<'_>) -> MapperResult<()>;
}

/// Working state of one save.
pub struct SavingArgs<'a> {
    pub context: &'a MapperContext,
    pub object: &'a MappedObject,
    /// Configuration the object is saved as; the object's own or a base type
    pub configuration: &'a TypeConfiguration,
    pub item_id: ItemId,
    pub report: SaveReport,
}

impl<'a> SavingArgs<'a> {
    pub fn new(
        context: &'a MapperContext,
        object: &'a MappedObject,
        configuration: &'a TypeConfiguration,
        item_id: ItemId,
    ) -> Self {
        Self {
            context,
            object,
            configuration,
            item_id,
            report: SaveReport {
                item_id,
                ..SaveReport::default()
            },
        }
    }
}

/// Writes loaded, writable properties through their mappers.
pub struct WritePropertiesTask;

impl Task for WritePropertiesTask {
    fn name(&self) -> &str {
        WRITE_PROPERTIES
    }
}

impl SavingTask for WritePropertiesTask {
    fn execute(&self, args: &mut SavingArgs<'_>) -> MapperResult<()> {
        let configuration = args.configuration;
        let type_key = configuration.type_key();
        let ctx = WriteContext::new(args.context.store(), type_key, args.item_id);

        for property in configuration.properties() {
            let value = match args.object.loaded(property.name()) {
                Some(value) if !property.is_read_only() => value,
                _ => {
                    args.report.skipped.push(property.name().to_string());
                    continue;
                }
            };

            if let Err(e) = property.mapper().write(&ctx, property, value) {
                tracing::warn!(
                    type_key = %type_key,
                    item_id = %args.item_id,
                    property = %property.name(),
                    written = args.report.written.len(),
                    error = %e,
                    "Save failed; earlier writes remain committed"
                );
                return Err(MapperError::save(
                    type_key.as_str(),
                    property.name(),
                    e.to_string(),
                    args.report.written.clone(),
                ));
            }
            args.report.written.push(property.name().to_string());
        }
        Ok(())
    }
}

pub fn default_tasks() -> TaskChain<dyn SavingTask> {
    let tasks: Vec<Arc<dyn SavingTask>> = vec![Arc::new(WritePropertiesTask)];
    TaskChain::from_unique(tasks)
}

/// Run a saving chain to completion.
pub fn run(tasks: &TaskChain<dyn SavingTask>, mut args: SavingArgs<'_>) -> MapperResult<SaveReport> {
    for task in tasks.iter() {
        task.execute(&mut args)?;
    }
    tracing::info!(
        type_key = %args.configuration.type_key(),
        item_id = %args.item_id,
        written = args.report.written.len(),
        skipped = args.report.skipped.len(),
        "Saved object"
    );
    Ok(args.report)
}
