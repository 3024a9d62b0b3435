//! Command log consumption.
//!
//! Entries for the same path are interpreted in append order and a later
//! entry supersedes an earlier one. [`collapse_superseded`] drops superseded
//! entries before they are handed to an agent; [`AgentState`] is the
//! reference consumer used to check that collapsing never changes what the
//! agent ends up with.

use std::collections::{BTreeMap, HashMap};

use crate::models::{CommandOperation, EdgeAsyncCommand};

/// Keeps only the last entry for each path, at the position of that entry.
pub fn collapse_superseded(entries: Vec<EdgeAsyncCommand>) -> Vec<EdgeAsyncCommand> {
    let mut last_index: HashMap<String, usize> = HashMap::new();
    for (index, entry) in entries.iter().enumerate() {
        last_index.insert(entry.path().to_string(), index);
    }

    entries
        .into_iter()
        .enumerate()
        .filter(|(index, entry)| last_index.get(entry.path()) == Some(index))
        .map(|(_, entry)| entry)
        .collect()
}

/// Resources an agent holds after applying commands, keyed by path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentState {
    resources: BTreeMap<String, (i32, serde_json::Value)>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add and Replace upsert, Remove deletes.
    pub fn apply(&mut self, entry: &EdgeAsyncCommand) {
        match entry.operation() {
            CommandOperation::Add | CommandOperation::Replace => {
                self.resources.insert(
                    entry.path().to_string(),
                    (entry.envelope.version, entry.envelope.value.clone()),
                );
            }
            CommandOperation::Remove => {
                self.resources.remove(entry.path());
            }
        }
    }

    pub fn apply_all<'a>(&mut self, entries: impl IntoIterator<Item = &'a EdgeAsyncCommand>) {
        for entry in entries {
            self.apply(entry);
        }
    }

    pub fn version_of(&self, path: &str) -> Option<i32> {
        self.resources.get(path).map(|(version, _)| *version)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }
}
