use anyhow::{bail, Context};
use std::path::Path;
use tracing::{debug, info};

use super::defaults::{ENV_APPLICATION_ID, ENV_GUILD_ID, ENV_TOKEN};
use super::types::SyncConfig;
use crate::utils::error::AppResult;
use crate::utils::logging::build_filter;

impl SyncConfig {
    /// Read, apply environment overrides, then validate
    pub async fn load(path: &Path) -> AppResult<Self> {
        let config = Self::read(path).await?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path` (defaults when it does not exist) and apply environment
    /// overrides without validating
    pub async fn read(path: &Path) -> AppResult<Self> {
        let mut config = if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config = Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            info!("Config file {} not found, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content).context("Invalid TOML configuration")?;
        Ok(config)
    }

    /// Override secrets and identifiers from the environment; blank values are ignored
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(token) = get(ENV_TOKEN) {
            debug!("Using token from {}", ENV_TOKEN);
            self.remote.token = Some(token);
        }
        if let Some(id) = get(ENV_APPLICATION_ID) {
            self.remote.application_id = Some(id);
        }
        if let Some(id) = get(ENV_GUILD_ID) {
            self.remote.restricted_guild_id = Some(id);
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();

        if self.command_roots.is_empty() {
            errors.push("command_roots must not be empty".to_string());
        }
        if self.file_extension.trim_start_matches('.').is_empty() {
            errors.push("file_extension must not be empty".to_string());
        }
        if let Err(e) = build_filter(None, &self.log_level) {
            errors.push(format!("log_level: {:#}", e));
        }
        if self.hot_reload.debounce_ms == 0 {
            errors.push("hot_reload.debounce_ms must be greater than 0".to_string());
        }
        if self.remote.enabled {
            if self.remote.token.as_deref().map_or(true, str::is_empty) {
                errors.push(format!(
                    "remote.token is required when remote sync is enabled (or set {})",
                    ENV_TOKEN
                ));
            }
            if url::Url::parse(&self.remote.api_base).is_err() {
                errors.push(format!("remote.api_base is not a URL: {}", self.remote.api_base));
            }
            if self.remote.request_timeout_secs == 0 {
                errors.push("remote.request_timeout_secs must be greater than 0".to_string());
            }
        }

        if !errors.is_empty() {
            bail!("Configuration validation failed: {}", errors.join(", "));
        }
        Ok(())
    }
}
