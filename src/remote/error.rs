use std::time::Duration;

use thiserror::Error;

use super::types::Partition;

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Authentication error, verify the token has the required permissions: {0}")]
    Unauthorized(String),
    #[error("Invalid application or guild identifier: {0}")]
    InvalidIdentifier(String),
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Platform returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Malformed response: {0}")]
    Decode(String),
    #[error("Partition {0} is not configured")]
    PartitionUnavailable(Partition),
}

impl RemoteError {
    pub fn decode(message: impl Into<String>) -> Self {
        RemoteError::Decode(message.into())
    }

    /// Failures the next reconciliation pass may clear on its own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::RateLimited { .. }
                | RemoteError::Timeout(_)
                | RemoteError::Transport(_)
                | RemoteError::Status { status: 500..=599, .. }
        )
    }
}
