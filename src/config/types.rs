//! Configuration data types
//!
//! Mirrors the TOML layout one to one:
//!
//! ```toml
//! command_roots = ["commands"]
//! file_extension = "toml"
//! ignore_patterns = ["**/drafts/**"]
//! database_path = "data/command_sync.db"
//! log_level = "info"
//!
//! [hot_reload]
//! enabled = true
//! debounce_ms = 200
//!
//! [remote]
//! application_id = "..."
//! restricted_guild_id = "..."
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::defaults;
use crate::utils::logging::DEFAULT_LOG_FILTER;
use crate::file_watcher::SchedulerOptions;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Directories scanned recursively for command files
    pub command_roots: Vec<PathBuf>,
    pub file_extension: String,
    /// Glob patterns matched against full paths
    pub ignore_patterns: Vec<String>,
    pub database_path: PathBuf,
    /// `tracing` filter directive; `RUST_LOG` and `--log-level` take precedence
    pub log_level: String,
    pub hot_reload: HotReloadConfig,
    pub remote: RemoteConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            command_roots: vec![PathBuf::from(defaults::DEFAULT_COMMAND_ROOT)],
            file_extension: defaults::DEFAULT_FILE_EXTENSION.to_string(),
            ignore_patterns: Vec::new(),
            database_path: PathBuf::from(defaults::DEFAULT_DATABASE_PATH),
            log_level: DEFAULT_LOG_FILTER.to_string(),
            hot_reload: HotReloadConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

/// `[hot_reload]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HotReloadConfig {
    pub enabled: bool,
    pub debounce_ms: u64,
    pub cooldown_ms: u64,
    /// Window in which finished reloads share one reconciliation
    pub reconcile_window_ms: u64,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: defaults::DEFAULT_DEBOUNCE_MS,
            cooldown_ms: defaults::DEFAULT_COOLDOWN_MS,
            reconcile_window_ms: defaults::DEFAULT_RECONCILE_WINDOW_MS,
        }
    }
}

impl HotReloadConfig {
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            debounce: Duration::from_millis(self.debounce_ms),
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }

    pub fn reconcile_window(&self) -> Duration {
        Duration::from_millis(self.reconcile_window_ms)
    }
}

/// `[remote]`
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub api_base: String,
    /// Resolved from the token when absent
    pub application_id: Option<String>,
    /// Target of the restricted partition; without it that partition is skipped
    pub restricted_guild_id: Option<String>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: defaults::DEFAULT_API_BASE.to_string(),
            application_id: None,
            restricted_guild_id: None,
            token: None,
            request_timeout_secs: defaults::DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// keep the token out of logs
impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("enabled", &self.enabled)
            .field("api_base", &self.api_base)
            .field("application_id", &self.application_id)
            .field("restricted_guild_id", &self.restricted_guild_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}
