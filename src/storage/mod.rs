/*!
 * Persistent sync bookkeeping
 *
 * SQLite (via sqlx) holds the file-hash and alias tables that let a restart
 * skip unchanged command files and diff alias history.
 */

pub mod database;
pub mod error;
pub mod repositories;
pub mod sync_store;

pub use database::{DatabaseManager, DatabaseOptions};
pub use error::{StorageError, StorageResult};
pub use sync_store::{SqliteSyncStore, SyncStore};

/// Default database file name when only a directory is configured
pub const DATABASE_FILE_NAME: &str = "command_sync.db";

/// Open (creating if needed) and initialize the SQLite store at `path`
pub async fn open_sqlite_store(
    path: &std::path::Path,
    options: DatabaseOptions,
) -> StorageResult<SqliteSyncStore> {
    let db = DatabaseManager::new(path, options).await?;
    db.initialize().await?;
    Ok(SqliteSyncStore::new(std::sync::Arc::new(db)))
}
