// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// A single command queued inside a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Deletes the key.
    Delete(String),
}

/// The commands applied atomically when a [`Transaction`](crate::Transaction) commits.
///
/// A batch is only applied if none of the watched keys changed between the watch and
/// the commit. Either all of its commands take effect or none do.
///
/// # Examples
///
/// ```
/// use tether_store::{Batch, Command};
///
/// let batch = Batch::new().delete("lock:orders");
/// assert_eq!(batch.commands(), &[Command::Delete("lock:orders".to_string())]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the deletion of `key`.
    #[must_use]
    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.commands.push(Command::Delete(key.into()));
        self
    }

    /// Returns the queued commands in submission order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Returns `true` if no commands are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl IntoIterator for Batch {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}
