use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::db::{open_connection, run_migrations};
use crate::adapters::platform_http::ElionaHttpClient;
use crate::adapters::provider_http::GpJouleHttpClient;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::scheduler::{Scheduler, start_scheduler};
use crate::app::services::SqliteStore;
use crate::app::sync::{PassRunner, Synchronizer};

type LiveSynchronizer = Synchronizer<GpJouleHttpClient, ElionaHttpClient, SqliteStore>;

pub fn open_store(db_path: &str) -> Result<SqliteStore, AppError> {
    let mut connection = open_connection(db_path).map_err(AppError::database_init)?;
    run_migrations(&mut connection).map_err(AppError::database_init)?;
    Ok(SqliteStore::new(Arc::new(Mutex::new(connection))))
}

fn build_synchronizer(config: &AppConfig) -> Result<Arc<LiveSynchronizer>, AppError> {
    let store = open_store(&config.db_path)?;
    let provider = GpJouleHttpClient::new().map_err(AppError::runtime)?;
    let platform = ElionaHttpClient::new(
        &config.api_endpoint,
        &config.api_token,
        Duration::from_secs(config.platform_timeout_secs),
    )
    .map_err(AppError::runtime)?;

    Ok(Arc::new(Synchronizer::new(provider, platform, store)))
}

/// Scheduler and ops API in one process.
pub fn run(config: AppConfig) -> Result<(), AppError> {
    let synchronizer = build_synchronizer(&config)?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let scheduler = Scheduler::new(Arc::clone(&synchronizer), Arc::clone(&stop_flag));
    let scheduler_handle = start_scheduler(
        scheduler,
        Duration::from_millis(config.tick_interval_ms),
    );

    let runner: Arc<dyn PassRunner> = synchronizer;
    let server_result = serve(runner, &config.http_bind);

    stop_flag.store(true, Ordering::Relaxed);
    if scheduler_handle.join().is_err() {
        return Err(AppError::runtime("scheduler thread panicked"));
    }

    server_result
}

/// Scheduler only; blocks until the process is terminated.
pub fn run_scheduler(config: AppConfig) -> Result<(), AppError> {
    let synchronizer = build_synchronizer(&config)?;
    let mut scheduler = Scheduler::new(synchronizer, Arc::new(AtomicBool::new(false)));

    tracing::info!(tick_interval_ms = config.tick_interval_ms, "scheduler starting");
    scheduler.run(Duration::from_millis(config.tick_interval_ms));
    Ok(())
}

/// Ops API only; passes run when triggered through `POST /tenants/{id}/run`.
pub fn run_api(config: AppConfig) -> Result<(), AppError> {
    let synchronizer = build_synchronizer(&config)?;
    let runner: Arc<dyn PassRunner> = synchronizer.clone();
    let server_result = serve(runner, &config.http_bind);

    // the blocking http clients must not be dropped on an actix worker
    drop(synchronizer);
    server_result
}

fn serve(runner: Arc<dyn PassRunner>, bind: &str) -> Result<(), AppError> {
    let api_state = ApiState { runner };

    tracing::info!(bind = %bind, "http server starting");

    let server_result = actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .wrap(
                    Cors::default()
                        .allow_any_origin()
                        .allowed_methods(vec!["GET", "POST"]),
                )
                .app_data(web::Data::new(api_state.clone()))
                .configure(configure_routes)
        })
        .bind(bind)?
        .run()
        .await
    });

    server_result.map_err(AppError::runtime)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::adapters::db::{insert_configuration, open_connection, schema_version};
    use crate::app::services::TenantStore;
    use crate::app::sync::{PassRunner, Synchronizer};
    use crate::domain::models::NewTenantConfig;
    use crate::test_support::{FakePlatform, FakeProvider};

    use super::{open_store, serve};

    fn temp_db_path(name: &str) -> std::path::PathBuf {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join(name);
        std::mem::forget(dir);
        path
    }

    #[test]
    fn open_store_migrates_fresh_database() {
        let db_path = temp_db_path("runtime-fresh.sqlite");

        let store = open_store(db_path.to_string_lossy().as_ref()).expect("store should open");

        assert!(store.list_tenants().expect("query should succeed").is_empty());
        let connection =
            open_connection(db_path.to_string_lossy().as_ref()).expect("db should reopen");
        assert_eq!(schema_version(&connection).expect("version should read"), 1);
    }

    #[test]
    fn open_store_keeps_existing_tenants() {
        let db_path = temp_db_path("runtime-existing.sqlite");
        {
            let store = open_store(db_path.to_string_lossy().as_ref()).expect("store should open");
            drop(store);
            let connection =
                open_connection(db_path.to_string_lossy().as_ref()).expect("db should reopen");
            insert_configuration(
                &connection,
                &NewTenantConfig {
                    root_url: "https://provider.test".to_string(),
                    api_key: "secret".to_string(),
                    enable: true,
                    refresh_interval_secs: 60,
                    request_timeout_secs: 0,
                    project_ids: vec!["1".to_string()],
                    asset_filter: Vec::new(),
                    user_id: None,
                },
            )
            .expect("tenant should insert");
        }

        let store = open_store(db_path.to_string_lossy().as_ref()).expect("store should reopen");
        let tenants = store.list_tenants().expect("query should succeed");

        assert_eq!(tenants.len(), 1);
        assert!(!tenants[0].active);
    }

    #[test]
    fn serve_hands_the_last_runner_reference_back_to_the_caller() {
        let db_path = temp_db_path("runtime-serve.sqlite");
        let store = open_store(db_path.to_string_lossy().as_ref()).expect("store should open");
        let synchronizer = Arc::new(Synchronizer::new(
            FakeProvider::default(),
            FakePlatform::default(),
            store,
        ));
        let runner: Arc<dyn PassRunner> = synchronizer.clone();

        let result = serve(runner, "not-a-socket-address");

        assert!(result.is_err());
        assert_eq!(Arc::strong_count(&synchronizer), 1);
    }
}
