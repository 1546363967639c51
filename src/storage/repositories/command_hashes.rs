/*!
 * command_hashes table: file path -> last synchronized content hash
 */

use crate::hashing::ContentHash;
use crate::storage::database::DatabaseManager;
use crate::storage::error::{StorageError, StorageResult};
use sqlx::Row;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct CommandHashes<'a> {
    db: &'a DatabaseManager,
}

impl<'a> CommandHashes<'a> {
    pub fn new(db: &'a DatabaseManager) -> Self {
        Self { db }
    }

    fn pool(&self) -> &sqlx::SqlitePool {
        self.db.pool()
    }

    pub async fn get(&self, path: &Path) -> StorageResult<Option<ContentHash>> {
        let row = sqlx::query("SELECT hash FROM command_hashes WHERE command_path = ? LIMIT 1")
            .bind(path_key(path))
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("hash")?;
                parse_hash(&raw).map(Some)
            }
            None => Ok(None),
        }
    }

    pub async fn set(&self, path: &Path, hash: ContentHash) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO command_hashes (command_path, hash, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(command_path) DO UPDATE SET hash = excluded.hash, updated_at = excluded.updated_at
            "#,
        )
        .bind(path_key(path))
        .bind(hash.to_hex())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn delete(&self, path: &Path) -> StorageResult<()> {
        sqlx::query("DELETE FROM command_hashes WHERE command_path = ?")
            .bind(path_key(path))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list(&self) -> StorageResult<HashMap<PathBuf, ContentHash>> {
        let rows = sqlx::query("SELECT command_path, hash FROM command_hashes")
            .fetch_all(self.pool())
            .await?;

        let mut hashes = HashMap::with_capacity(rows.len());
        for row in rows {
            let path: String = row.try_get("command_path")?;
            let raw: String = row.try_get("hash")?;
            hashes.insert(PathBuf::from(path), parse_hash(&raw)?);
        }
        Ok(hashes)
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn parse_hash(raw: &str) -> StorageResult<ContentHash> {
    raw.parse::<ContentHash>()
        .map_err(|_| StorageError::CorruptValue {
            table: "command_hashes",
            value: raw.to_string(),
        })
}
