/*!
 * Live command registry
 *
 * Name-keyed map of every registered name (primaries and aliases) plus a
 * path index mapping each tracked file to the command it declares. Reads are
 * lock-free per key through `DashMap`; mutation is crate-private and only the
 * loader performs it.
 */

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::descriptor::{CommandDescriptor, Scope};

/// One registered name
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// Name this entry is registered under
    pub name: String,
    pub descriptor: Arc<CommandDescriptor>,
    /// Primary command name when this entry is an alias
    pub alias_of: Option<String>,
}

impl RegistryEntry {
    pub fn is_alias(&self) -> bool {
        self.alias_of.is_some()
    }

    /// Command that owns this name (itself for primaries)
    pub fn owner(&self) -> &str {
        self.alias_of.as_deref().unwrap_or(&self.name)
    }

    pub fn scope(&self) -> Scope {
        self.descriptor.scope
    }
}

#[derive(Debug, Default)]
pub struct CommandRegistry {
    entries: DashMap<String, RegistryEntry>,
    by_path: DashMap<PathBuf, String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<RegistryEntry> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered names, aliases included
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every entry
    pub fn values(&self) -> Vec<RegistryEntry> {
        self.entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Sorted snapshot of every registered name
    pub fn names(&self) -> BTreeSet<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Primary descriptors only
    pub fn primaries(&self) -> Vec<Arc<CommandDescriptor>> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_alias())
            .map(|entry| Arc::clone(&entry.descriptor))
            .collect()
    }

    /// Command currently loaded from `path`
    pub fn command_for_path(&self, path: &Path) -> Option<String> {
        self.by_path.get(path).map(|name| name.value().clone())
    }

    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        self.by_path.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Live aliases registered for `command_name`
    pub fn aliases_of(&self, command_name: &str) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|entry| entry.alias_of.as_deref() == Some(command_name))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Command that owns `name`, whether as primary or alias
    pub fn owner_of(&self, name: &str) -> Option<String> {
        self.entries
            .get(name)
            .map(|entry| entry.owner().to_string())
    }

    pub(crate) fn insert_primary(&self, descriptor: Arc<CommandDescriptor>) {
        let name = descriptor.name.clone();
        self.by_path
            .insert(descriptor.source_path.clone(), name.clone());
        self.entries.insert(
            name.clone(),
            RegistryEntry {
                name,
                descriptor,
                alias_of: None,
            },
        );
    }

    pub(crate) fn insert_alias(&self, alias: &str, descriptor: Arc<CommandDescriptor>) {
        let owner = descriptor.name.clone();
        self.entries.insert(
            alias.to_string(),
            RegistryEntry {
                name: alias.to_string(),
                descriptor,
                alias_of: Some(owner),
            },
        );
    }

    /// Remove `alias` if it is still an alias of `command_name`
    pub(crate) fn remove_alias(&self, command_name: &str, alias: &str) -> bool {
        self.entries
            .remove_if(alias, |_, entry| {
                entry.alias_of.as_deref() == Some(command_name)
            })
            .is_some()
    }

    /// Remove the primary `command_name` if it was loaded from `path`
    pub(crate) fn remove_primary(&self, command_name: &str, path: &Path) -> bool {
        self.entries
            .remove_if(command_name, |_, entry| {
                !entry.is_alias() && entry.descriptor.source_path == path
            })
            .is_some()
    }

    pub(crate) fn unbind_path(&self, path: &Path) {
        self.by_path.remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(name: &str, path: &str, aliases: &[&str]) -> Arc<CommandDescriptor> {
        Arc::new(CommandDescriptor {
            name: name.to_string(),
            handler: name.to_string(),
            schema: json!({}),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            scope: Scope::Global,
            source_path: PathBuf::from(path),
        })
    }

    #[test]
    fn primary_and_alias_lookup() {
        let registry = CommandRegistry::new();
        let foo = descriptor("foo", "/c/foo.toml", &["f"]);
        registry.insert_primary(Arc::clone(&foo));
        registry.insert_alias("f", Arc::clone(&foo));

        assert_eq!(registry.size(), 2);
        assert!(registry.has("foo"));
        assert!(registry.get("f").unwrap().is_alias());
        assert_eq!(registry.owner_of("f").as_deref(), Some("foo"));
        assert_eq!(registry.owner_of("foo").as_deref(), Some("foo"));
        assert_eq!(
            registry.command_for_path(Path::new("/c/foo.toml")).as_deref(),
            Some("foo")
        );
        assert_eq!(registry.aliases_of("foo").len(), 1);
        assert_eq!(registry.primaries().len(), 1);
    }

    #[test]
    fn remove_alias_checks_owner() {
        let registry = CommandRegistry::new();
        let foo = descriptor("foo", "/c/foo.toml", &["f"]);
        registry.insert_primary(Arc::clone(&foo));
        registry.insert_alias("f", foo);

        assert!(!registry.remove_alias("bar", "f"));
        assert!(registry.has("f"));
        assert!(registry.remove_alias("foo", "f"));
        assert!(!registry.has("f"));
    }

    #[test]
    fn remove_primary_checks_source_path() {
        let registry = CommandRegistry::new();
        registry.insert_primary(descriptor("foo", "/c/foo.toml", &[]));

        assert!(!registry.remove_primary("foo", Path::new("/c/other.toml")));
        assert!(registry.remove_primary("foo", Path::new("/c/foo.toml")));
        assert!(registry.is_empty());
    }

    #[test]
    fn names_are_sorted() {
        let registry = CommandRegistry::new();
        registry.insert_primary(descriptor("zeta", "/c/z.toml", &[]));
        registry.insert_primary(descriptor("alpha", "/c/a.toml", &[]));
        let names: Vec<_> = registry.names().into_iter().collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
