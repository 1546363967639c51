// Shared utilities

pub mod error;
pub mod logging;

pub use error::{AppError, AppResult};
pub use logging::{build_filter, init_logging, DEFAULT_LOG_FILTER};
