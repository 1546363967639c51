/*!
 * Persistent hash/alias store
 *
 * Durable record of "what have I already synchronized": the content hash last
 * committed for every tracked command file, and the aliases each command
 * registered. After a crash this is the only source of truth, so every write
 * must be durable before it returns.
 */

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::hashing::ContentHash;
use crate::storage::database::DatabaseManager;
use crate::storage::error::StorageResult;
use crate::storage::repositories::{CommandAliases, CommandHashes};

#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Cheap query used to detect a store-wide outage before a pass commits anything
    async fn health_check(&self) -> StorageResult<()>;

    async fn get_hash(&self, path: &Path) -> StorageResult<Option<ContentHash>>;
    async fn set_hash(&self, path: &Path, hash: ContentHash) -> StorageResult<()>;
    async fn delete_hash(&self, path: &Path) -> StorageResult<()>;

    async fn get_aliases(&self, command_name: &str) -> StorageResult<BTreeSet<String>>;
    async fn set_alias(&self, command_name: &str, alias: &str) -> StorageResult<()>;
    async fn delete_alias(&self, command_name: &str, alias: &str) -> StorageResult<()>;
    async fn delete_all_aliases(&self, command_name: &str) -> StorageResult<()>;

    async fn list_all_hashes(&self) -> StorageResult<HashMap<PathBuf, ContentHash>>;
    async fn list_all_aliases(&self) -> StorageResult<HashMap<String, BTreeSet<String>>>;
}

/// SQLite-backed store
#[derive(Debug, Clone)]
pub struct SqliteSyncStore {
    db: Arc<DatabaseManager>,
}

impl SqliteSyncStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.db
    }

    fn hashes(&self) -> CommandHashes<'_> {
        CommandHashes::new(&self.db)
    }

    fn aliases(&self) -> CommandAliases<'_> {
        CommandAliases::new(&self.db)
    }
}

#[async_trait]
impl SyncStore for SqliteSyncStore {
    async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(self.db.pool()).await?;
        Ok(())
    }

    async fn get_hash(&self, path: &Path) -> StorageResult<Option<ContentHash>> {
        self.hashes().get(path).await
    }

    async fn set_hash(&self, path: &Path, hash: ContentHash) -> StorageResult<()> {
        self.hashes().set(path, hash).await
    }

    async fn delete_hash(&self, path: &Path) -> StorageResult<()> {
        self.hashes().delete(path).await
    }

    async fn get_aliases(&self, command_name: &str) -> StorageResult<BTreeSet<String>> {
        self.aliases().get(command_name).await
    }

    async fn set_alias(&self, command_name: &str, alias: &str) -> StorageResult<()> {
        self.aliases().set(command_name, alias).await
    }

    async fn delete_alias(&self, command_name: &str, alias: &str) -> StorageResult<()> {
        self.aliases().delete(command_name, alias).await
    }

    async fn delete_all_aliases(&self, command_name: &str) -> StorageResult<()> {
        self.aliases().delete_all(command_name).await
    }

    async fn list_all_hashes(&self) -> StorageResult<HashMap<PathBuf, ContentHash>> {
        self.hashes().list().await
    }

    async fn list_all_aliases(&self) -> StorageResult<HashMap<String, BTreeSet<String>>> {
        self.aliases().list().await
    }
}
