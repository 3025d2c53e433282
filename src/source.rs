//! Configuration sources, validation hooks, and change events.

use std::time::SystemTime;

use crate::error::Result;
use crate::value::{Table, Value};

/// A producer of configuration data.
///
/// Sources are loaded lowest priority first so that higher-priority trees
/// override lower ones during the merge fold.
pub trait Source: Send + Sync {
    /// Name used in diagnostics and [`crate::Error::Source`].
    fn name(&self) -> &str;

    /// Merge order; lower loads first.
    fn priority(&self) -> i32;

    /// Produce the source's current tree.
    ///
    /// # Errors
    ///
    /// Implementations report their own failures; the accessor wraps them
    /// in [`crate::Error::Source`].
    fn load(&self) -> Result<Table>;
}

/// A fixed in-memory source, mainly useful for seeding defaults and tests.
#[derive(Clone, Debug)]
pub struct MemorySource {
    name: String,
    priority: i32,
    data: Table,
}

impl MemorySource {
    /// Wrap `data` as a loadable source.
    #[must_use]
    pub fn new(name: impl Into<String>, priority: i32, data: Table) -> Self {
        Self {
            name: name.into(),
            priority,
            data,
        }
    }
}

impl Source for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn load(&self) -> Result<Table> {
        Ok(self.data.clone())
    }
}

/// Whole-tree validation, run after loads, reloads, and source-driven
/// updates.
pub trait Validate: Send + Sync {
    /// Inspect the tree and reject it with an error to block the update.
    ///
    /// # Errors
    ///
    /// Any error marks the tree invalid.
    fn validate(&self, data: &Table) -> Result<()>;
}

impl<F> Validate for F
where
    F: Fn(&Table) -> Result<()> + Send + Sync,
{
    fn validate(&self, data: &Table) -> Result<()> {
        self(data)
    }
}

/// How a failed validation affects a source-driven update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// Log the failure and keep the new tree.
    #[default]
    Lenient,
    /// Roll the update back.
    Strict,
}

/// What kind of mutation produced a [`ChangeEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// A direct write through [`crate::Config::set`].
    Set,
    /// A source pushed new data.
    Update,
    /// A key was removed.
    Delete,
    /// The whole tree was rebuilt from its sources.
    Reload,
}

/// A configuration change, delivered to [`crate::Config::watch_changes`]
/// callbacks.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    /// Source name, or `"manager"` for direct writes.
    pub source: String,
    /// The mutation kind.
    pub kind: ChangeKind,
    /// Affected key for single-key mutations; `None` for bulk updates.
    pub key: Option<String>,
    /// Value previously at the key, if any.
    pub old_value: Option<Value>,
    /// Value now at the key, if any.
    pub new_value: Option<Value>,
    /// When the mutation happened.
    pub timestamp: SystemTime,
}
