use tracing_subscriber::{EnvFilter, fmt};

use crate::app::AppError;

const DEFAULT_DIRECTIVES: &str = "info,gp_joule_sync=info";

/// Tenant workers run on named threads, so thread names are part of every line.
pub fn init() -> Result<(), AppError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .map_err(AppError::logging_init)
}
