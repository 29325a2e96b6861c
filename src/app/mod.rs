mod config;
mod error;
pub mod flight;
mod logging;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod services;
pub mod sync;

pub use config::AppConfig;
pub use error::AppError;

fn bootstrap() -> Result<AppConfig, AppError> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let config = AppConfig::from_env()?;

    tracing::info!(
        db_path = %config.db_path,
        api_endpoint = %config.api_endpoint,
        http_bind = %config.http_bind,
        tick_interval_ms = config.tick_interval_ms,
        platform_timeout_secs = config.platform_timeout_secs,
        "application bootstrap initialized"
    );

    Ok(config)
}

pub fn run() -> Result<(), AppError> {
    runtime::run(bootstrap()?)
}

pub fn run_service() -> Result<(), AppError> {
    runtime::run_scheduler(bootstrap()?)
}

pub fn run_api() -> Result<(), AppError> {
    runtime::run_api(bootstrap()?)
}
