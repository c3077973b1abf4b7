use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::CommandHandler;

/// Category assigned when a command is registered without one
pub const DEFAULT_CATEGORY: &str = "Other";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a command must be registered under at least one name")]
    NoNames,

    #[error("command names must not be empty")]
    EmptyName,
}

/// A registered command: the handler plus its menu category
#[derive(Clone)]
pub struct CommandEntry {
    pub handler: Arc<dyn CommandHandler>,
    pub category: String,
}

/// Registry of commands, keyed by name. Several names may point at the same
/// handler. Lookups happen on every message, writes only at startup.
#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, CommandEntry>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under every name in `names`, replacing any
    /// existing mapping. An empty category becomes [`DEFAULT_CATEGORY`].
    pub fn register(
        &self,
        names: &[&str],
        handler: Arc<dyn CommandHandler>,
        category: &str,
    ) -> Result<(), RegistryError> {
        if names.is_empty() {
            return Err(RegistryError::NoNames);
        }
        if names.iter().any(|name| name.trim().is_empty()) {
            return Err(RegistryError::EmptyName);
        }

        let category = match category.trim() {
            "" => DEFAULT_CATEGORY.to_string(),
            other => other.to_string(),
        };

        let mut commands = self.commands.write();
        for name in names {
            commands.insert(
                name.to_string(),
                CommandEntry {
                    handler: handler.clone(),
                    category: category.clone(),
                },
            );
        }
        info!("Registered command: {} [{}]", names.join(", "), category);
        Ok(())
    }

    /// Exact, case-sensitive lookup
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.commands.read().get(name).map(|entry| entry.handler.clone())
    }

    /// Snapshot of all commands grouped by lowercased category. Both levels
    /// are sorted.
    pub fn by_category(&self) -> BTreeMap<String, BTreeMap<String, CommandEntry>> {
        let commands = self.commands.read();
        let mut grouped: BTreeMap<String, BTreeMap<String, CommandEntry>> = BTreeMap::new();
        for (name, entry) in commands.iter() {
            grouped
                .entry(entry.category.to_lowercase())
                .or_default()
                .insert(name.clone(), entry.clone());
        }
        grouped
    }

    #[cfg(test)]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }
}
