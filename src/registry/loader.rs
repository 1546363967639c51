/*!
 * Module loader
 *
 * Turns a command file into a registry change. Every change follows the same
 * three steps:
 *
 * 1. plan: parse, validate and check collisions against the live registry
 * 2. commit: write hash and alias records to the store
 * 3. apply: swap the new descriptor and aliases into the registry
 *
 * A failure in steps 1 or 2 leaves the registry exactly as it was, so a bad
 * edit never takes down a working command.
 *
 * Writers lock the source path and every command name and alias they touch,
 * in sorted order, so a plan stays valid until its apply while loads of
 * unrelated commands run side by side. Readers never wait on these locks.
 *
 * A file that lost a collision stays registered as a claimant of the name it
 * wanted. When a retirement, rename or alias removal frees that name, the
 * claimant path is queued in `take_unblocked` for a forced reload.
 */

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::command_registry::CommandRegistry;
use super::descriptor::CommandDescriptor;
use super::name_locks::{KeyedGuard, KeyedLocks};
use crate::error::{SyncError, SyncResult};
use crate::hashing::{content_hash, ContentHash};
use crate::storage::SyncStore;

/// Result of a successful `load`
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// Descriptor installed or replaced
    Loaded(LoadedCommand),
    /// Bytes match the committed hash and the command is live
    Unchanged { name: String },
}

#[derive(Debug, Clone)]
pub struct LoadedCommand {
    pub descriptor: Arc<CommandDescriptor>,
    pub added_aliases: Vec<String>,
    pub removed_aliases: Vec<String>,
    /// Declared aliases skipped because another command owns the name
    pub rejected_aliases: Vec<String>,
    /// Previous name when the file now declares a different command
    pub renamed_from: Option<String>,
}

impl LoadOutcome {
    pub fn name(&self) -> &str {
        match self {
            LoadOutcome::Loaded(loaded) => &loaded.descriptor.name,
            LoadOutcome::Unchanged { name } => name,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, LoadOutcome::Unchanged { .. })
    }
}

/// Registry changes decided during planning
struct LoadPlan {
    descriptor: Arc<CommandDescriptor>,
    hash: ContentHash,
    added: Vec<String>,
    kept: Vec<String>,
    removed: Vec<String>,
    rejected: Vec<String>,
    renamed_from: Option<(String, BTreeSet<String>)>,
}

/// Paths waiting for a name another command holds
#[derive(Debug, Default)]
struct PendingClaims {
    waiting: HashMap<String, BTreeSet<PathBuf>>,
    unblocked: BTreeSet<PathBuf>,
}

struct WithdrawnClaims {
    names: Vec<String>,
    unblocked: bool,
}

pub struct ModuleLoader {
    registry: Arc<CommandRegistry>,
    store: Arc<dyn SyncStore>,
    locks: KeyedLocks,
    claims: Mutex<PendingClaims>,
}

impl ModuleLoader {
    pub fn new(registry: Arc<CommandRegistry>, store: Arc<dyn SyncStore>) -> Self {
        Self {
            registry,
            store,
            locks: KeyedLocks::new(),
            claims: Mutex::new(PendingClaims::default()),
        }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Read `path` and load it, comparing against the stored hash
    pub async fn load(&self, path: &Path) -> SyncResult<LoadOutcome> {
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        let stored = self.store.get_hash(path).await?;
        self.load_contents(path, &contents, stored).await
    }

    /// Read and load `path` even if its bytes match the stored hash
    pub async fn load_forced(&self, path: &Path) -> SyncResult<LoadOutcome> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) => {
                self.forget_claims(path);
                return Err(SyncError::io(path, e));
            }
        };
        self.load_contents(path, &contents, None).await
    }

    /// Load already-read bytes; `stored_hash` is the store's record for `path`
    pub async fn load_contents(
        &self,
        path: &Path,
        contents: &[u8],
        stored_hash: Option<ContentHash>,
    ) -> SyncResult<LoadOutcome> {
        let hash = content_hash(contents);
        if stored_hash == Some(hash) && !self.is_waiting(path) {
            if let Some(name) = self.registry.command_for_path(path) {
                debug!("Unchanged: {} ({})", name, path.display());
                return Ok(LoadOutcome::Unchanged { name });
            }
        }

        let descriptor = match std::str::from_utf8(contents)
            .map_err(|_| SyncError::validation(path, "file is not valid UTF-8"))
            .and_then(|source| CommandDescriptor::parse(source, path))
        {
            Ok(descriptor) => descriptor,
            Err(e) => {
                // an invalid file no longer wants any name
                self.forget_claims(path);
                return Err(e);
            }
        };

        let _guard = self.lock_keys(path, Some(&descriptor)).await?;
        let withdrawn = self.forget_claims(path);
        let committed = match self.plan(descriptor, hash).await {
            Ok(plan) => self.commit(path, &plan).await.map(|()| plan),
            Err(e) => Err(e),
        };
        match committed {
            Ok(plan) => Ok(LoadOutcome::Loaded(self.apply(plan))),
            Err(e) => {
                if matches!(e, SyncError::Store(_)) {
                    // nothing changed, so the path still wants what it wanted
                    self.restore_claims(path, withdrawn);
                }
                Err(e)
            }
        }
    }

    /// Drop the command loaded from `path`; returns its name if one was live
    pub async fn retire(&self, path: &Path) -> SyncResult<Option<String>> {
        let _guard = self.lock_keys(path, None).await?;
        self.forget_claims(path);

        let name = self.registry.command_for_path(path);
        self.store.delete_hash(path).await?;
        if let Some(name) = &name {
            self.store.delete_all_aliases(name).await?;
        }

        if let Some(name) = &name {
            let mut freed = Vec::new();
            for alias in self.registry.aliases_of(name) {
                if self.registry.remove_alias(name, &alias) {
                    freed.push(alias);
                }
            }
            if self.registry.remove_primary(name, path) {
                freed.push(name.clone());
            }
            self.release_names(&freed, path);
            info!("Retired command {} ({})", name, path.display());
        } else {
            debug!("Retired untracked path {}", path.display());
        }
        self.registry.unbind_path(path);

        Ok(name)
    }

    /// Paths whose wanted name was freed since the last call, sorted
    pub fn take_unblocked(&self) -> Vec<PathBuf> {
        std::mem::take(&mut self.claims.lock().unblocked)
            .into_iter()
            .collect()
    }

    /// Whether `path` lost a collision and has not been reloaded since
    pub fn is_waiting(&self, path: &Path) -> bool {
        let claims = self.claims.lock();
        claims.unblocked.contains(path)
            || claims.waiting.values().any(|paths| paths.contains(path))
    }

    fn record_claim(&self, name: &str, path: &Path) {
        self.claims
            .lock()
            .waiting
            .entry(name.to_string())
            .or_default()
            .insert(path.to_path_buf());
    }

    /// Drop every claim of `path`; returns what was dropped
    fn forget_claims(&self, path: &Path) -> WithdrawnClaims {
        let mut claims = self.claims.lock();
        let unblocked = claims.unblocked.remove(path);
        let mut names = Vec::new();
        claims.waiting.retain(|name, paths| {
            if paths.remove(path) {
                names.push(name.clone());
            }
            !paths.is_empty()
        });
        WithdrawnClaims { names, unblocked }
    }

    fn restore_claims(&self, path: &Path, withdrawn: WithdrawnClaims) {
        for name in &withdrawn.names {
            self.record_claim(name, path);
        }
        if withdrawn.unblocked {
            self.claims.lock().unblocked.insert(path.to_path_buf());
        }
    }

    fn release_names(&self, names: &[String], except: &Path) {
        let mut claims = self.claims.lock();
        for name in names {
            let Some(paths) = claims.waiting.remove(name) else {
                continue;
            };
            for path in paths {
                if path != except {
                    debug!("Name '{}' freed, queueing {}", name, path.display());
                    claims.unblocked.insert(path);
                }
            }
        }
    }

    /// Every alias the store or the registry associates with `name`
    async fn known_aliases(&self, name: &str) -> SyncResult<BTreeSet<String>> {
        let mut aliases = self.store.get_aliases(name).await?;
        aliases.extend(self.registry.aliases_of(name));
        Ok(aliases)
    }

    /// Lock keys for a write to `path`, declaring `declared` if it is a load
    async fn keys_for(
        &self,
        path: &Path,
        declared: Option<&CommandDescriptor>,
    ) -> SyncResult<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        if let Some(descriptor) = declared {
            names.insert(descriptor.name.clone());
            names.extend(descriptor.aliases.iter().cloned());
            names.extend(self.known_aliases(&descriptor.name).await?);
        }
        if let Some(previous) = self.registry.command_for_path(path) {
            names.extend(self.known_aliases(&previous).await?);
            names.insert(previous);
        }

        let mut keys: BTreeSet<String> = names
            .into_iter()
            .map(|name| format!("name:{}", name))
            .collect();
        keys.insert(format!("path:{}", path.to_string_lossy()));
        Ok(keys)
    }

    /// The key set can move while we wait, so lock and re-check until it is covered
    async fn lock_keys(
        &self,
        path: &Path,
        declared: Option<&CommandDescriptor>,
    ) -> SyncResult<KeyedGuard<'_>> {
        let mut keys = self.keys_for(path, declared).await?;
        loop {
            let guard = self.locks.acquire(keys.clone()).await;
            let current = self.keys_for(path, declared).await?;
            if guard.covers(&current) {
                return Ok(guard);
            }
            drop(guard);
            keys.extend(current);
        }
    }

    async fn plan(&self, descriptor: CommandDescriptor, hash: ContentHash) -> SyncResult<LoadPlan> {
        let path = descriptor.source_path.clone();
        let name = descriptor.name.clone();
        let previous_name = self.registry.command_for_path(&path);

        // Primary name must be free, or already ours
        if let Some(existing) = self.registry.get(&name) {
            let ours = match &existing.alias_of {
                Some(owner) => previous_name.as_deref() == Some(owner.as_str()),
                None => existing.descriptor.source_path == path,
            };
            if !ours {
                warn!(
                    "Collision: {} declares '{}' which is owned by '{}' ({})",
                    path.display(),
                    name,
                    existing.owner(),
                    existing.descriptor.source_path.display()
                );
                self.record_claim(&name, &path);
                return Err(SyncError::collision(&path, &name, existing.owner()));
            }
        }

        // Alias history: what the store recorded plus what is live right now
        let previous_aliases = self.known_aliases(&name).await?;

        let mut added = Vec::new();
        let mut kept = Vec::new();
        let mut rejected = Vec::new();
        for alias in &descriptor.aliases {
            let owner = self.registry.owner_of(alias);
            let free = match owner.as_deref() {
                None => true,
                Some(owner) => owner == name || Some(owner) == previous_name.as_deref(),
            };
            if !free {
                warn!(
                    "Collision: alias '{}' of {} is already owned by '{}', skipping",
                    alias,
                    name,
                    owner.unwrap_or_default()
                );
                self.record_claim(alias, &path);
                rejected.push(alias.clone());
            } else if self.registry.aliases_of(&name).contains(alias) {
                kept.push(alias.clone());
            } else {
                added.push(alias.clone());
            }
        }

        let accepted: BTreeSet<&String> = added.iter().chain(kept.iter()).collect();
        let removed: Vec<String> = previous_aliases
            .into_iter()
            .filter(|alias| !accepted.contains(alias))
            .collect();

        let renamed_from = match previous_name {
            Some(old) if old != name => {
                let old_aliases = self.known_aliases(&old).await?;
                Some((old, old_aliases))
            }
            _ => None,
        };

        let live_aliases: Vec<String> = descriptor
            .aliases
            .iter()
            .filter(|alias| !rejected.contains(alias))
            .cloned()
            .collect();
        let descriptor = Arc::new(descriptor.with_aliases(live_aliases));

        Ok(LoadPlan {
            descriptor,
            hash,
            added,
            kept,
            removed,
            rejected,
            renamed_from,
        })
    }

    async fn commit(&self, path: &Path, plan: &LoadPlan) -> SyncResult<()> {
        let name = &plan.descriptor.name;

        if let Some((old, _)) = &plan.renamed_from {
            self.store.delete_all_aliases(old).await?;
        }
        for alias in &plan.removed {
            self.store.delete_alias(name, alias).await?;
        }
        // Re-write kept aliases too so a previously interrupted commit heals
        for alias in plan.added.iter().chain(plan.kept.iter()) {
            self.store.set_alias(name, alias).await?;
        }
        self.store.set_hash(path, plan.hash).await?;
        Ok(())
    }

    fn apply(&self, plan: LoadPlan) -> LoadedCommand {
        let LoadPlan {
            descriptor,
            added,
            removed,
            rejected,
            renamed_from,
            ..
        } = plan;
        let name = descriptor.name.clone();
        let path = descriptor.source_path.clone();
        let mut freed = Vec::new();

        let renamed_from = renamed_from.map(|(old, old_aliases)| {
            for alias in &old_aliases {
                // an old alias may be re-declared under the new name below
                if self.registry.remove_alias(&old, alias) {
                    freed.push(alias.clone());
                }
            }
            if self.registry.remove_primary(&old, &path) {
                freed.push(old.clone());
            }
            info!("Command {} renamed to {} ({})", old, name, path.display());
            old
        });

        for alias in &removed {
            if self.registry.remove_alias(&name, alias) {
                info!("Removed old alias {} from {}", alias, name);
                freed.push(alias.clone());
            }
        }

        self.registry.insert_primary(Arc::clone(&descriptor));
        for alias in &descriptor.aliases {
            self.registry.insert_alias(alias, Arc::clone(&descriptor));
        }
        for alias in &added {
            info!("Loaded alias {} for {}", alias, name);
        }

        freed.retain(|freed_name| *freed_name != name && !descriptor.aliases.contains(freed_name));
        self.release_names(&freed, &path);

        info!("Loaded command {} ({})", name, path.display());

        LoadedCommand {
            descriptor,
            added_aliases: added,
            removed_aliases: removed,
            rejected_aliases: rejected,
            renamed_from,
        }
    }
}
