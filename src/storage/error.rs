use sqlx::Error as SqlxError;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupt value in {table}: {value}")]
    CorruptValue { table: &'static str, value: String },
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage internal error: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        StorageError::Unavailable(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        StorageError::Internal(message.into())
    }
}
