/*!
 * command_aliases table: command name -> alias names it registered
 */

use crate::storage::database::DatabaseManager;
use crate::storage::error::StorageResult;
use sqlx::Row;
use std::collections::{BTreeSet, HashMap};

pub struct CommandAliases<'a> {
    db: &'a DatabaseManager,
}

impl<'a> CommandAliases<'a> {
    pub fn new(db: &'a DatabaseManager) -> Self {
        Self { db }
    }

    fn pool(&self) -> &sqlx::SqlitePool {
        self.db.pool()
    }

    pub async fn get(&self, command_name: &str) -> StorageResult<BTreeSet<String>> {
        let aliases = sqlx::query_scalar::<_, String>(
            "SELECT alias FROM command_aliases WHERE command_name = ? ORDER BY alias",
        )
        .bind(command_name)
        .fetch_all(self.pool())
        .await?;
        Ok(aliases.into_iter().collect())
    }

    pub async fn set(&self, command_name: &str, alias: &str) -> StorageResult<()> {
        sqlx::query("INSERT OR REPLACE INTO command_aliases (command_name, alias) VALUES (?, ?)")
            .bind(command_name)
            .bind(alias)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn delete(&self, command_name: &str, alias: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM command_aliases WHERE command_name = ? AND alias = ?")
            .bind(command_name)
            .bind(alias)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn delete_all(&self, command_name: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM command_aliases WHERE command_name = ?")
            .bind(command_name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list(&self) -> StorageResult<HashMap<String, BTreeSet<String>>> {
        let rows = sqlx::query("SELECT command_name, alias FROM command_aliases")
            .fetch_all(self.pool())
            .await?;

        let mut aliases: HashMap<String, BTreeSet<String>> = HashMap::new();
        for row in rows {
            let command_name: String = row.try_get("command_name")?;
            let alias: String = row.try_get("alias")?;
            aliases.entry(command_name).or_default().insert(alias);
        }
        Ok(aliases)
    }
}
