// Logging bootstrap

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use super::error::AppResult;

/// Filter used when neither `RUST_LOG` nor the configuration names one
pub const DEFAULT_LOG_FILTER: &str = "info";

/// `RUST_LOG` (passed in as `env_value`) wins over `default_filter`.
/// Either one failing to parse is an error rather than a silent fallback.
pub fn build_filter(env_value: Option<&str>, default_filter: &str) -> AppResult<EnvFilter> {
    match env_value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid {}: {}", EnvFilter::DEFAULT_ENV, directives)),
        None => EnvFilter::try_new(default_filter)
            .with_context(|| format!("Invalid log level: {}", default_filter)),
    }
}

/// Initialize the global tracing subscriber
pub fn init_logging(default_filter: &str) -> AppResult<()> {
    let env_value = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(env_value.as_deref(), default_filter)?;
    let active = filter.to_string();

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized ({})", active);
    Ok(())
}
