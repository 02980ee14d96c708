//! Task chains.
//!
//! Each pipeline (configuration resolution, object construction, object
//! saving) is an ordered list of named tasks. A [`TaskChain`] is built once
//! and is immutable afterwards, so one chain can be shared by any number of
//! concurrent calls. Extension happens at build time through
//! [`TaskChainBuilder`], anchored on the names of existing tasks.

pub mod configuration;
pub mod construction;
pub mod saving;

pub use configuration::{ConfigurationResolver, ConfigurationResolverArgs, ConfigurationTask};
pub use construction::{ConstructOptions, ConstructionArgs, ConstructionTask};
pub use saving::{SaveReport, SavingArgs, SavingTask};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use common::{MapperError, MapperResult};

/// Pseudo type key used for chain assembly errors
const CHAIN: &str = "<task chain>";

/// A named pipeline step.
pub trait Task: Send + Sync {
    /// Unique name within its chain, used as an insertion anchor
    fn name(&self) -> &str;
}

/// Immutable ordered list of tasks.
pub struct TaskChain<T: ?Sized> {
    tasks: Arc<[Arc<T>]>,
}

impl<T: ?Sized> Clone for TaskChain<T> {
    fn clone(&self) -> Self {
        Self {
            tasks: Arc::clone(&self.tasks),
        }
    }
}

impl<T: ?Sized + Task> TaskChain<T> {
    pub fn builder() -> TaskChainBuilder<T> {
        TaskChainBuilder { tasks: Vec::new() }
    }

    /// Chain from tasks whose names are known to be unique
    pub(crate) fn from_unique(tasks: Vec<Arc<T>>) -> Self {
        Self {
            tasks: Arc::from(tasks),
        }
    }

    /// Builder seeded with this chain's tasks
    pub fn to_builder(&self) -> TaskChainBuilder<T> {
        TaskChainBuilder {
            tasks: self.tasks.to_vec(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.tasks.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<T: ?Sized + Task> fmt::Debug for TaskChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Mutable staging area for a [`TaskChain`].
pub struct TaskChainBuilder<T: ?Sized> {
    tasks: Vec<Arc<T>>,
}

impl<T: ?Sized + Task> TaskChainBuilder<T> {
    /// Append a task at the end
    pub fn push(mut self, task: Arc<T>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Insert a task immediately before the task named `anchor`
    pub fn insert_before(mut self, anchor: &str, task: Arc<T>) -> MapperResult<Self> {
        let index = self.position(anchor)?;
        self.tasks.insert(index, task);
        Ok(self)
    }

    /// Insert a task immediately after the task named `anchor`
    pub fn insert_after(mut self, anchor: &str, task: Arc<T>) -> MapperResult<Self> {
        let index = self.position(anchor)?;
        self.tasks.insert(index + 1, task);
        Ok(self)
    }

    /// Drop the task named `name`
    pub fn remove(mut self, name: &str) -> MapperResult<Self> {
        let index = self.position(name)?;
        self.tasks.remove(index);
        Ok(self)
    }

    /// Freeze the chain; task names must be unique
    pub fn build(self) -> MapperResult<TaskChain<T>> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.name()) {
                return Err(MapperError::configuration(
                    CHAIN,
                    format!("task '{}' appears more than once", task.name()),
                ));
            }
        }
        Ok(TaskChain {
            tasks: Arc::from(self.tasks),
        })
    }

    fn position(&self, name: &str) -> MapperResult<usize> {
        self.tasks
            .iter()
            .position(|t| t.name() == name)
            .ok_or_else(|| MapperError::configuration(CHAIN, format!("no task named '{}'", name)))
    }
}
