/*!
 * Application-level error plumbing
 *
 * Subsystems keep their own `thiserror` enums; the binary and configuration
 * layer work in `anyhow` and attach context as errors bubble up.
 */

/// Result type used by application plumbing (config, startup)
pub type AppResult<T> = anyhow::Result<T>;

/// Error type used by application plumbing
pub type AppError = anyhow::Error;
