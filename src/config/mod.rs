/*!
 * Configuration
 *
 * TOML file with every field defaulted, plus environment overrides for
 * secrets and identifiers.
 */

pub mod defaults;
pub mod loader;
pub mod types;

pub use types::{HotReloadConfig, RemoteConfig, SyncConfig};

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "command-sync.toml";
