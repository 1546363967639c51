use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::remote::error::RemoteError;
use crate::storage::error::StorageError;

pub type SyncResult<T> = Result<T, SyncError>;

/// Outcome taxonomy for one synchronization step (file load, retire, reconcile)
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid command file {}: {reason}", path.display())]
    Validation { path: PathBuf, reason: String },

    #[error("Name collision in {}: '{name}' is already owned by '{owner}'", path.display())]
    Collision {
        path: PathBuf,
        name: String,
        owner: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store error: {0}")]
    Store(#[from] StorageError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

impl SyncError {
    pub fn validation(path: &Path, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn collision(path: &Path, name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::Collision {
            path: path.to_path_buf(),
            name: name.into(),
            owner: owner.into(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short label used in logs and events
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Collision { .. } => "collision",
            Self::Io { .. } => "io",
            Self::Store(_) => "store",
            Self::Remote(_) => "remote",
        }
    }

    /// Whether the next trigger for the same path may succeed without the file changing
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Store(_) | Self::Remote(_))
    }
}
