/*!
 * Configuration defaults
 */

pub const DEFAULT_COMMAND_ROOT: &str = "commands";
pub const DEFAULT_FILE_EXTENSION: &str = "toml";
pub const DEFAULT_DATABASE_PATH: &str = "data/command_sync.db";

pub const DEFAULT_DEBOUNCE_MS: u64 = 200;
pub const DEFAULT_COOLDOWN_MS: u64 = 100;
pub const DEFAULT_RECONCILE_WINDOW_MS: u64 = 200;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Environment overrides applied after the file is read
pub const ENV_TOKEN: &str = "COMMAND_SYNC_TOKEN";
pub const ENV_APPLICATION_ID: &str = "COMMAND_SYNC_APPLICATION_ID";
pub const ENV_GUILD_ID: &str = "COMMAND_SYNC_GUILD_ID";
