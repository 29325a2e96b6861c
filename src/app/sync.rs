//! One synchronization pass for a tenant: tree-sync, asset init, session
//! delta-sync and error delta-sync, strictly in that order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::adapters::platform_http::AssetPlatform;
use crate::adapters::provider_http::ProviderApi;
use crate::adapters::remote::RemoteError;
use crate::app::flight::SingleFlight;
use crate::app::registry;
use crate::app::services::{ServiceError, SyncStore};
use crate::domain::delta::{
    FoldState, PlannedPush, apply_plan, plan_open_errors, plan_resolved_errors, plan_sessions,
    relevant_errors,
};
use crate::domain::filter::FilterError;
use crate::domain::models::{
    AlarmRule, AssetRecord, CursorKind, DataPoint, NewAsset, TenantConfig,
};
use crate::domain::tree::{
    ASSET_TYPE_CONNECTOR, ASSET_TYPE_SESSION_LOG, ResourceNode, build_tree,
};

pub const CURRENT_INIT_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transient network failure: {0}")]
    TransientNetwork(String),
    #[error("remote protocol failure: {0}")]
    RemoteProtocol(String),
    #[error("filter evaluation failed for {kind}: {source}")]
    Filter {
        kind: &'static str,
        #[source]
        source: FilterError,
    },
    #[error("asset registry failure: {0}")]
    Registry(#[from] ServiceError),
}

impl From<RemoteError> for SyncError {
    fn from(error: RemoteError) -> Self {
        if error.is_transient() {
            Self::TransientNetwork(error.to_string())
        } else {
            Self::RemoteProtocol(error.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub assets_created: usize,
    pub assets_initialized: usize,
    pub sessions_pushed: usize,
    pub errors_opened: usize,
    pub errors_closed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(PassReport),
    AlreadyRunning,
}

/// Tenant and project a tree walk runs for.
struct TreeContext<'a> {
    tenant: &'a TenantConfig,
    project_id: &'a str,
    timestamp: DateTime<Utc>,
}

pub struct Synchronizer<P, A, S> {
    provider: P,
    platform: A,
    store: S,
    flights: SingleFlight,
}

impl<P, A, S> Synchronizer<P, A, S>
where
    P: ProviderApi,
    A: AssetPlatform,
    S: SyncStore,
{
    pub fn new(provider: P, platform: A, store: S) -> Self {
        Self {
            provider,
            platform,
            store,
            flights: SingleFlight::default(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn platform(&self) -> &A {
        &self.platform
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn flights(&self) -> &SingleFlight {
        &self.flights
    }

    pub fn list_tenants(&self) -> Result<Vec<TenantConfig>, ServiceError> {
        self.store.list_tenants()
    }

    /// Runs a pass unless one is already in flight for this tenant.
    pub fn run_one_pass(&self, tenant: &TenantConfig) -> Result<PassOutcome, SyncError> {
        let Some(_guard) = self.flights.try_acquire(tenant.id) else {
            tracing::debug!(tenant_id = tenant.id, "pass skipped, tenant already running");
            return Ok(PassOutcome::AlreadyRunning);
        };

        self.execute_pass(tenant).map(PassOutcome::Completed)
    }

    /// Runs all stages; the caller owns the single-flight guard.
    pub fn execute_pass(&self, tenant: &TenantConfig) -> Result<PassReport, SyncError> {
        let pass_id = Uuid::new_v4();
        let span = tracing::info_span!("tenant_pass", tenant_id = tenant.id, pass_id = %pass_id);
        let _entered = span.enter();

        tracing::info!("collecting started");
        let mut report = PassReport::default();

        report.assets_created = self
            .sync_tree(tenant)
            .inspect_err(|error| log_stage_failure("tree", error))?;
        report.assets_initialized = self
            .init_assets(tenant)
            .inspect_err(|error| log_stage_failure("asset_init", error))?;
        report.sessions_pushed = self
            .sync_sessions(tenant)
            .inspect_err(|error| log_stage_failure("sessions", error))?;
        let (errors_opened, errors_closed) = self
            .sync_errors(tenant)
            .inspect_err(|error| log_stage_failure("errors", error))?;
        report.errors_opened = errors_opened;
        report.errors_closed = errors_closed;

        tracing::info!(
            assets_created = report.assets_created,
            assets_initialized = report.assets_initialized,
            sessions_pushed = report.sessions_pushed,
            errors_opened = report.errors_opened,
            errors_closed = report.errors_closed,
            "collecting finished"
        );

        Ok(report)
    }

    fn sync_tree(&self, tenant: &TenantConfig) -> Result<usize, SyncError> {
        if tenant.project_ids.is_empty() {
            tracing::warn!("no project ids defined, skipping asset creation");
            return Ok(0);
        }

        let clusters = self.provider.fetch_clusters(tenant)?;
        tracing::trace!(clusters = clusters.len(), "clusters fetched");
        let root = build_tree(&clusters);
        let timestamp = Utc::now();

        let mut created = 0;
        for project_id in &tenant.project_ids {
            let context = TreeContext {
                tenant,
                project_id,
                timestamp,
            };
            let project_created = self.sync_node(&context, &root, None)?;
            tracing::debug!(project_id = %project_id, assets_created = project_created, "asset tree synced");
            created += project_created;
        }

        Ok(created)
    }

    /// A node that fails the filter is not mirrored; its provider children are
    /// still considered and attach to the nearest mirrored ancestor.
    fn sync_node(
        &self,
        context: &TreeContext<'_>,
        node: &ResourceNode,
        parent_asset_id: Option<i32>,
    ) -> Result<usize, SyncError> {
        let asset = node.as_node();
        let adheres = asset
            .adheres_to_filter(&context.tenant.asset_filter)
            .map_err(|source| {
                tracing::warn!(kind = asset.asset_type(), error = %source, "filter evaluation failed");
                SyncError::Filter {
                    kind: asset.asset_type(),
                    source,
                }
            })?;

        if !adheres {
            tracing::trace!(gai = %asset.global_asset_id(), "node filtered out");
            let mut created = 0;
            for child in asset.children() {
                if matches!(child, ResourceNode::EventLog(_)) {
                    continue;
                }
                created += self.sync_node(context, child, parent_asset_id)?;
            }
            return Ok(created);
        }

        let mut created = 0;
        let asset_id =
            match registry::resolve(&self.store, context.tenant, context.project_id, asset)? {
                Some(asset_id) => asset_id,
                None => {
                    let platform_id = self.platform.create_asset(&NewAsset {
                        project_id: context.project_id.to_string(),
                        global_asset_identifier: asset.global_asset_id(),
                        name: asset.name(),
                        description: asset.description(),
                        asset_type: asset.asset_type().to_string(),
                        parent_locational_asset_id: parent_asset_id,
                    })?;
                    created += 1;
                    registry::register(
                        &self.store,
                        context.tenant,
                        context.project_id,
                        asset,
                        platform_id,
                    )?
                }
            };

        for (subtype, data) in asset.data() {
            self.platform.upsert_data(&DataPoint {
                asset_id,
                subtype,
                timestamp: context.timestamp,
                data,
            })?;
        }

        for child in asset.children() {
            created += self.sync_node(context, child, Some(asset_id))?;
        }

        Ok(created)
    }

    fn init_assets(&self, tenant: &TenantConfig) -> Result<usize, SyncError> {
        let mut initialized = 0;

        for asset in self.store.pending_init(tenant.id, CURRENT_INIT_VERSION)? {
            if asset.init_version < 1 {
                if asset.asset_type == ASSET_TYPE_CONNECTOR
                    && self.platform.asset_exists(asset.asset_id)?
                {
                    self.platform
                        .create_alarm_rule(&AlarmRule::connector_error(asset.asset_id))?;
                    tracing::debug!(asset_id = asset.asset_id, "alarm rule added");
                    initialized += 1;
                }
                self.store.set_init_version(&asset, 1)?;
            }
        }

        Ok(initialized)
    }

    fn sync_sessions(&self, tenant: &TenantConfig) -> Result<usize, SyncError> {
        let mut pushed = 0;

        for connector in self.store.assets_of_type(tenant.id, ASSET_TYPE_CONNECTOR)? {
            if !self.platform.asset_exists(connector.asset_id)? {
                tracing::debug!(asset_id = connector.asset_id, "connector asset gone, skipping sessions");
                continue;
            }

            let Some(session_log) = self.store.child_asset(
                tenant.id,
                &connector.project_id,
                ASSET_TYPE_SESSION_LOG,
                &connector.provider_id,
            )?
            else {
                continue;
            };

            let cursor = connector.latest_session_ts;
            let sessions = self.provider.fetch_sessions(
                tenant,
                &connector.parent_provider_id,
                cursor,
                Utc::now(),
            )?;
            let plan = plan_sessions(sessions, &connector.provider_id, session_log.asset_id, cursor);
            let state = self.apply(plan, &connector, CursorKind::Session, cursor)?;

            tracing::debug!(
                asset_id = connector.asset_id,
                sessions_pushed = state.pushed,
                "sessions sent"
            );
            pushed += state.pushed;
        }

        Ok(pushed)
    }

    fn sync_errors(&self, tenant: &TenantConfig) -> Result<(usize, usize), SyncError> {
        let mut opened = 0;
        let mut closed = 0;

        for connector in self.store.assets_of_type(tenant.id, ASSET_TYPE_CONNECTOR)? {
            if !self.platform.asset_exists(connector.asset_id)? {
                tracing::debug!(asset_id = connector.asset_id, "connector asset gone, skipping errors");
                continue;
            }

            let cursor = connector.latest_error_ts;
            let notifications = self.provider.fetch_errors(
                tenant,
                &connector.parent_provider_id,
                cursor,
                Utc::now(),
            )?;
            let resolved = relevant_errors(notifications, &connector.provider_id, cursor);
            let state = self.apply(
                plan_resolved_errors(&resolved, connector.asset_id),
                &connector,
                CursorKind::Error,
                cursor,
            )?;
            closed += state.pushed;

            // open errors are re-read from the advanced cursor
            let cursor = state.cursor;
            let notifications = self.provider.fetch_errors(
                tenant,
                &connector.parent_provider_id,
                cursor,
                Utc::now(),
            )?;
            let open = relevant_errors(notifications, &connector.provider_id, cursor);
            let state = self.apply(
                plan_open_errors(&open, connector.asset_id),
                &connector,
                CursorKind::Error,
                cursor,
            )?;
            opened += state.pushed;

            tracing::debug!(
                asset_id = connector.asset_id,
                errors_opened = state.pushed,
                "errors sent"
            );
        }

        Ok((opened, closed))
    }

    fn apply(
        &self,
        plan: Vec<PlannedPush>,
        asset: &AssetRecord,
        kind: CursorKind,
        cursor: DateTime<Utc>,
    ) -> Result<FoldState, SyncError> {
        apply_plan(
            plan,
            cursor,
            |point| self.platform.upsert_data(point).map_err(SyncError::from),
            |timestamp| {
                self.store
                    .advance_cursor(asset, kind, timestamp)
                    .map_err(SyncError::from)
            },
        )
        .map_err(|failure| {
            tracing::warn!(
                asset_id = asset.asset_id,
                pushed = failure.state.pushed,
                cursor = %failure.state.cursor,
                "delta push interrupted"
            );
            failure.error
        })
    }
}

/// Entry points the ops API drives a pass through.
pub trait PassRunner: Send + Sync {
    fn list_tenants(&self) -> Result<Vec<TenantConfig>, ServiceError>;
    fn get_tenant(&self, tenant_id: i64) -> Result<Option<TenantConfig>, ServiceError>;
    fn is_running(&self, tenant_id: i64) -> bool;
    fn run_one_pass(&self, tenant: &TenantConfig) -> Result<PassOutcome, SyncError>;
}

impl<P, A, S> PassRunner for Synchronizer<P, A, S>
where
    P: ProviderApi + Send + Sync,
    A: AssetPlatform + Send + Sync,
    S: SyncStore + Send + Sync,
{
    fn list_tenants(&self) -> Result<Vec<TenantConfig>, ServiceError> {
        Synchronizer::list_tenants(self)
    }

    fn get_tenant(&self, tenant_id: i64) -> Result<Option<TenantConfig>, ServiceError> {
        self.store.get_tenant(tenant_id)
    }

    fn is_running(&self, tenant_id: i64) -> bool {
        self.flights.is_running(tenant_id)
    }

    fn run_one_pass(&self, tenant: &TenantConfig) -> Result<PassOutcome, SyncError> {
        Synchronizer::run_one_pass(self, tenant)
    }
}

fn log_stage_failure(stage: &'static str, error: &SyncError) {
    tracing::error!(stage, error = %error, "collecting aborted");
}
