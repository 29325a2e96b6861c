use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::adapters::platform_http::AssetPlatform;
use crate::adapters::provider_http::ProviderApi;
use crate::app::flight::FlightGuard;
use crate::app::services::{ServiceError, SyncStore};
use crate::app::sync::Synchronizer;
use crate::domain::models::TenantConfig;

const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// Polls tenant configurations and starts one worker per eligible tenant.
///
/// A worker holds the tenant's single-flight guard for the whole pass and the
/// refresh interval that follows it, so a tenant is eligible again only after
/// it has slept.
pub struct Scheduler<P, A, S> {
    synchronizer: Arc<Synchronizer<P, A, S>>,
    stop_flag: Arc<AtomicBool>,
    warned_no_tenants: bool,
    workers: Vec<JoinHandle<()>>,
}

impl<P, A, S> Scheduler<P, A, S>
where
    P: ProviderApi + Send + Sync + 'static,
    A: AssetPlatform + Send + Sync + 'static,
    S: SyncStore + Send + Sync + 'static,
{
    pub fn new(synchronizer: Arc<Synchronizer<P, A, S>>, stop_flag: Arc<AtomicBool>) -> Self {
        Self {
            synchronizer,
            stop_flag,
            warned_no_tenants: false,
            workers: Vec::new(),
        }
    }

    pub fn warned_no_tenants(&self) -> bool {
        self.warned_no_tenants
    }

    /// Reads every tenant once and returns how many passes were started.
    pub fn tick(&mut self) -> Result<usize, ServiceError> {
        self.workers.retain(|worker| !worker.is_finished());

        let tenants = self.synchronizer.list_tenants()?;
        if tenants.is_empty() {
            if !self.warned_no_tenants {
                tracing::info!("no tenants configured yet");
                self.warned_no_tenants = true;
            }
            return Ok(0);
        }

        let mut started = 0;
        for tenant in tenants {
            if !tenant.enable {
                if tenant.active {
                    self.set_active(&tenant, false);
                    tracing::info!(tenant_id = tenant.id, "tenant disabled");
                }
                continue;
            }

            if !tenant.active {
                self.set_active(&tenant, true);
                tracing::info!(
                    tenant_id = tenant.id,
                    root_url = %tenant.root_url,
                    refresh_interval_secs = tenant.refresh_interval_secs,
                    request_timeout_secs = tenant.request_timeout_secs,
                    project_ids = ?tenant.project_ids,
                    "tenant initialized"
                );
            }

            let Some(guard) = self.synchronizer.flights().try_acquire(tenant.id) else {
                tracing::trace!(tenant_id = tenant.id, "tenant still running or sleeping");
                continue;
            };

            if self.spawn_worker(tenant, guard) {
                started += 1;
            }
        }

        Ok(started)
    }

    pub fn run(&mut self, tick_interval: Duration) {
        while !self.stop_flag.load(Ordering::Relaxed) {
            if let Err(error) = self.tick() {
                tracing::warn!(error = %error, "scheduler tick failed");
            }
            std::thread::sleep(tick_interval);
        }

        self.join_workers();
    }

    /// Waits for every started worker; callers set the stop flag first.
    pub fn join_workers(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("tenant worker panicked");
            }
        }
    }

    fn set_active(&self, tenant: &TenantConfig, active: bool) {
        if let Err(error) = self
            .synchronizer
            .store()
            .set_tenant_active(tenant.id, active)
        {
            tracing::warn!(tenant_id = tenant.id, active, error = %error, "failed to persist tenant state");
        }
    }

    fn spawn_worker(&mut self, tenant: TenantConfig, guard: FlightGuard) -> bool {
        let synchronizer = Arc::clone(&self.synchronizer);
        let stop_flag = Arc::clone(&self.stop_flag);

        let spawned = std::thread::Builder::new()
            .name(format!("tenant-{}", tenant.id))
            .spawn(move || {
                if let Err(error) = synchronizer.execute_pass(&tenant) {
                    tracing::warn!(tenant_id = tenant.id, error = %error, "tenant pass failed");
                }
                sleep_unless_stopped(tenant.refresh_interval(), &stop_flag);
                drop(guard);
            });

        match spawned {
            Ok(handle) => {
                self.workers.push(handle);
                true
            }
            Err(error) => {
                tracing::error!(error = %error, "failed to spawn tenant worker");
                false
            }
        }
    }
}

pub fn start_scheduler<P, A, S>(
    mut scheduler: Scheduler<P, A, S>,
    tick_interval: Duration,
) -> JoinHandle<()>
where
    P: ProviderApi + Send + Sync + 'static,
    A: AssetPlatform + Send + Sync + 'static,
    S: SyncStore + Send + Sync + 'static,
{
    std::thread::spawn(move || scheduler.run(tick_interval))
}

fn sleep_unless_stopped(duration: Duration, stop_flag: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while !stop_flag.load(Ordering::Relaxed) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        std::thread::sleep(remaining.min(SLEEP_SLICE));
    }
}
