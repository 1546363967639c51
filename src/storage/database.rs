use crate::storage::error::{StorageError, StorageResult};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{ConnectOptions, Executor};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Schema for the sync bookkeeping tables, applied idempotently at startup
const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS command_hashes (
        command_path TEXT PRIMARY KEY,
        hash TEXT NOT NULL,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS command_aliases (
        command_name TEXT NOT NULL,
        alias TEXT NOT NULL,
        PRIMARY KEY (command_name, alias)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_command_aliases_name ON command_aliases(command_name)",
];

#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub connection_timeout: Duration,
    pub statement_timeout: Duration,
    pub wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 4,
            connection_timeout: Duration::from_secs(10),
            statement_timeout: Duration::from_secs(30),
            wal: true,
        }
    }
}

pub struct DatabaseManager {
    pool: SqlitePool,
    db_path: PathBuf,
    options: DatabaseOptions,
}

impl fmt::Debug for DatabaseManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseManager")
            .field("db_path", &self.db_path)
            .field("options", &self.options)
            .finish()
    }
}

impl DatabaseManager {
    pub async fn new(db_path: &Path, options: DatabaseOptions) -> StorageResult<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::io(
                    format!("creating database directory {}", parent.display()),
                    e,
                )
            })?;
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(if options.wal {
                SqliteJournalMode::Wal
            } else {
                SqliteJournalMode::Delete
            })
            // FULL so a returned write survives power loss, not just a process crash
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(options.statement_timeout)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(options.max_connections.max(1))
            .acquire_timeout(options.connection_timeout)
            .idle_timeout(Some(Duration::from_secs(30)))
            .max_lifetime(Some(Duration::from_secs(60 * 15)))
            .connect_with(connect_options)
            .await?;

        info!("Opened sync database at {}", db_path.display());

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
            options,
        })
    }

    pub async fn initialize(&self) -> StorageResult<()> {
        for statement in SCHEMA_STATEMENTS {
            debug!("Applying schema statement");
            self.pool.execute(*statement).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
