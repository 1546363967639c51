/*!
 * Test fixtures: a command tree on disk, stores and engines wired to it
 */

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use command_sync::hashing::ContentHash;
use command_sync::storage::{
    open_sqlite_store, DatabaseOptions, SqliteSyncStore, StorageError, StorageResult, SyncStore,
};
use command_sync::{SyncConfig, SyncEngine};

use super::catalog::RecordingCatalog;

/// A command root plus a database directory, both removed on drop
pub struct CommandTree {
    root: TempDir,
    data: TempDir,
}

impl CommandTree {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            data: TempDir::new().unwrap(),
        }
    }

    /// Canonical root, the form the engine reports paths in
    pub fn root(&self) -> PathBuf {
        std::fs::canonicalize(self.root.path()).unwrap()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data.path().join("sync.db")
    }

    pub fn write_raw(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Write `<name>.toml`-style command file at `relative`
    pub fn write_command(
        &self,
        relative: &str,
        name: &str,
        aliases: &[&str],
        scope: &str,
    ) -> PathBuf {
        self.write_raw(relative, &command_source(name, aliases, scope))
    }

    pub fn remove(&self, relative: &str) {
        std::fs::remove_file(self.path(relative)).unwrap();
    }

    /// Configuration pointing at this tree with remote I/O off and short timers
    pub fn config(&self) -> SyncConfig {
        let mut config = SyncConfig::default();
        config.command_roots = vec![self.root()];
        config.database_path = self.database_path();
        config.remote.enabled = false;
        config.remote.request_timeout_secs = 2;
        config.hot_reload.debounce_ms = 50;
        config.hot_reload.cooldown_ms = 20;
        config.hot_reload.reconcile_window_ms = 50;
        config
    }

    pub async fn open_store(&self) -> SqliteSyncStore {
        open_sqlite_store(&self.database_path(), DatabaseOptions::default())
            .await
            .unwrap()
    }

    /// Engine over this tree, the SQLite store and `catalog`
    pub async fn engine(&self, catalog: Arc<RecordingCatalog>) -> Arc<SyncEngine> {
        let store = self.open_store().await;
        SyncEngine::new(self.config(), Arc::new(store), catalog)
    }
}

pub fn command_source(name: &str, aliases: &[&str], scope: &str) -> String {
    let aliases = aliases
        .iter()
        .map(|alias| format!("\"{}\"", alias))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "name = \"{name}\"\nhandler = \"handlers.{name}\"\nscope = \"{scope}\"\naliases = [{aliases}]\n\n[schema]\ndescription = \"The {name} command\"\n"
    )
}

/// Store wrapper that can be switched off to simulate an outage
pub struct SwitchableStore {
    inner: SqliteSyncStore,
    down: AtomicBool,
}

impl SwitchableStore {
    pub fn new(inner: SqliteSyncStore) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable("simulated outage"));
        }
        Ok(())
    }
}

#[async_trait]
impl SyncStore for SwitchableStore {
    async fn health_check(&self) -> StorageResult<()> {
        self.check()?;
        self.inner.health_check().await
    }

    async fn get_hash(&self, path: &Path) -> StorageResult<Option<ContentHash>> {
        self.check()?;
        self.inner.get_hash(path).await
    }

    async fn set_hash(&self, path: &Path, hash: ContentHash) -> StorageResult<()> {
        self.check()?;
        self.inner.set_hash(path, hash).await
    }

    async fn delete_hash(&self, path: &Path) -> StorageResult<()> {
        self.check()?;
        self.inner.delete_hash(path).await
    }

    async fn get_aliases(&self, command_name: &str) -> StorageResult<BTreeSet<String>> {
        self.check()?;
        self.inner.get_aliases(command_name).await
    }

    async fn set_alias(&self, command_name: &str, alias: &str) -> StorageResult<()> {
        self.check()?;
        self.inner.set_alias(command_name, alias).await
    }

    async fn delete_alias(&self, command_name: &str, alias: &str) -> StorageResult<()> {
        self.check()?;
        self.inner.delete_alias(command_name, alias).await
    }

    async fn delete_all_aliases(&self, command_name: &str) -> StorageResult<()> {
        self.check()?;
        self.inner.delete_all_aliases(command_name).await
    }

    async fn list_all_hashes(&self) -> StorageResult<HashMap<PathBuf, ContentHash>> {
        self.check()?;
        self.inner.list_all_hashes().await
    }

    async fn list_all_aliases(&self) -> StorageResult<HashMap<String, BTreeSet<String>>> {
        self.check()?;
        self.inner.list_all_aliases().await
    }
}
