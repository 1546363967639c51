//! Writes a configuration file populated with every default

use command_sync::config::{SyncConfig, CONFIG_FILE_NAME};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let default_config = SyncConfig::default();

    let toml_content = toml::to_string_pretty(&default_config)?;

    println!("=== Default configuration ===");
    println!("{}", toml_content);

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    if config_path.exists() {
        return Err(format!("{} already exists, not overwriting", config_path.display()).into());
    }
    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&config_path, toml_content).await?;

    println!("\n=== Written to {} ===", config_path.display());

    Ok(())
}
