use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::file_watcher::now_timestamp_ms;
use crate::remote::{Partition, ReconcileReport};

/// Observable synchronization step, broadcast to subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    #[serde(rename_all = "camelCase")]
    FileLoaded {
        path: PathBuf,
        name: String,
        timestamp_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    FileUnchanged {
        path: PathBuf,
        name: String,
        timestamp_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    FileRejected {
        path: PathBuf,
        kind: &'static str,
        reason: String,
        timestamp_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    FileRetired {
        path: PathBuf,
        name: Option<String>,
        timestamp_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    ReconcileStarted { timestamp_ms: u64 },
    #[serde(rename_all = "camelCase")]
    ReconcileCompleted {
        report: ReconcileReport,
        timestamp_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    PartitionFailed {
        partition: Partition,
        reason: String,
        timestamp_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    StoreDegraded { reason: String, timestamp_ms: u64 },
}

impl SyncEvent {
    pub fn file_loaded(path: &Path, name: &str) -> Self {
        Self::FileLoaded {
            path: path.to_path_buf(),
            name: name.to_string(),
            timestamp_ms: now_timestamp_ms(),
        }
    }

    pub fn file_unchanged(path: &Path, name: &str) -> Self {
        Self::FileUnchanged {
            path: path.to_path_buf(),
            name: name.to_string(),
            timestamp_ms: now_timestamp_ms(),
        }
    }

    pub fn file_rejected(path: &Path, kind: &'static str, reason: String) -> Self {
        Self::FileRejected {
            path: path.to_path_buf(),
            kind,
            reason,
            timestamp_ms: now_timestamp_ms(),
        }
    }

    pub fn file_retired(path: &Path, name: Option<String>) -> Self {
        Self::FileRetired {
            path: path.to_path_buf(),
            name,
            timestamp_ms: now_timestamp_ms(),
        }
    }

    pub fn reconcile_started() -> Self {
        Self::ReconcileStarted {
            timestamp_ms: now_timestamp_ms(),
        }
    }

    pub fn reconcile_completed(report: ReconcileReport) -> Self {
        Self::ReconcileCompleted {
            report,
            timestamp_ms: now_timestamp_ms(),
        }
    }

    pub fn partition_failed(partition: Partition, reason: String) -> Self {
        Self::PartitionFailed {
            partition,
            reason,
            timestamp_ms: now_timestamp_ms(),
        }
    }

    pub fn store_degraded(reason: String) -> Self {
        Self::StoreDegraded {
            reason,
            timestamp_ms: now_timestamp_ms(),
        }
    }
}
