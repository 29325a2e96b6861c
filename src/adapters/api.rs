use std::sync::Arc;

use actix_web::{HttpResponse, Responder, get, post, web};
use serde::Serialize;

use crate::app::services::ServiceError;
use crate::app::sync::{PassOutcome, PassRunner, SyncError};
use crate::domain::models::TenantConfig;

#[derive(Clone)]
pub struct ApiState {
    pub runner: Arc<dyn PassRunner>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TenantResponse {
    pub id: i64,
    pub root_url: String,
    pub enable: bool,
    pub active: bool,
    pub running: bool,
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub project_ids: Vec<String>,
    pub filter_groups: usize,
}

impl TenantResponse {
    fn from_tenant(tenant: TenantConfig, running: bool) -> Self {
        Self {
            id: tenant.id,
            root_url: tenant.root_url,
            enable: tenant.enable,
            active: tenant.active,
            running,
            refresh_interval_secs: tenant.refresh_interval_secs,
            request_timeout_secs: tenant.request_timeout_secs,
            project_ids: tenant.project_ids,
            filter_groups: tenant.asset_filter.len(),
        }
    }
}

enum ManualRun {
    UnknownTenant,
    Finished(Result<PassOutcome, SyncError>),
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(list_tenants_endpoint)
        .service(run_tenant_endpoint);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[get("/tenants")]
async fn list_tenants_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.runner.list_tenants() {
        Ok(tenants) => {
            let mapped: Vec<TenantResponse> = tenants
                .into_iter()
                .map(|tenant| {
                    let running = state.runner.is_running(tenant.id);
                    TenantResponse::from_tenant(tenant, running)
                })
                .collect();
            HttpResponse::Ok().json(mapped)
        }
        Err(error) => service_error_response(error),
    }
}

#[post("/tenants/{tenant_id}/run")]
async fn run_tenant_endpoint(state: web::Data<ApiState>, path: web::Path<i64>) -> impl Responder {
    let tenant_id = path.into_inner();
    let runner = Arc::clone(&state.runner);

    // passes make blocking outbound calls
    let result = web::block(move || -> Result<ManualRun, ServiceError> {
        let Some(tenant) = runner.get_tenant(tenant_id)? else {
            return Ok(ManualRun::UnknownTenant);
        };
        Ok(ManualRun::Finished(runner.run_one_pass(&tenant)))
    })
    .await;

    match result {
        Ok(Ok(ManualRun::Finished(Ok(PassOutcome::Completed(report))))) => {
            HttpResponse::Ok().json(report)
        }
        Ok(Ok(ManualRun::Finished(Ok(PassOutcome::AlreadyRunning)))) => {
            HttpResponse::Conflict().json(serde_json::json!({
                "error": "tenant pass already running"
            }))
        }
        Ok(Ok(ManualRun::Finished(Err(error)))) => {
            tracing::warn!(tenant_id, error = %error, "manual pass failed");
            HttpResponse::BadGateway().json(serde_json::json!({
                "error": error.to_string()
            }))
        }
        Ok(Ok(ManualRun::UnknownTenant)) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "tenant not found"
        })),
        Ok(Err(error)) => service_error_response(error),
        Err(error) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("pass worker failed: {error}")
        })),
    }
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    match error {
        ServiceError::DbLockPoisoned => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "database lock poisoned"
            }))
        }
        ServiceError::Database(error) => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("database query failed: {error}")
            }))
        }
    }
}
