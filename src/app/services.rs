use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

use crate::adapters::db;
use crate::adapters::db::DbError;
use crate::domain::models::{AssetRecord, CursorKind, NewAssetRecord, TenantConfig};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("database operation failed: {0}")]
    Database(#[from] DbError),
}

pub trait TenantStore {
    fn list_tenants(&self) -> Result<Vec<TenantConfig>, ServiceError>;
    fn get_tenant(&self, tenant_id: i64) -> Result<Option<TenantConfig>, ServiceError>;
    fn set_tenant_active(&self, tenant_id: i64, active: bool) -> Result<(), ServiceError>;
}

/// Persisted identity mapping, scoped by tenant and project.
pub trait AssetRegistry {
    fn lookup(
        &self,
        tenant_id: i64,
        project_id: &str,
        global_asset_id: &str,
    ) -> Result<Option<i32>, ServiceError>;
    fn insert(&self, record: &NewAssetRecord) -> Result<i32, ServiceError>;
    fn assets_of_type(
        &self,
        tenant_id: i64,
        asset_type: &str,
    ) -> Result<Vec<AssetRecord>, ServiceError>;
    fn child_asset(
        &self,
        tenant_id: i64,
        project_id: &str,
        asset_type: &str,
        parent_provider_id: &str,
    ) -> Result<Option<AssetRecord>, ServiceError>;
    fn pending_init(
        &self,
        tenant_id: i64,
        below_version: i64,
    ) -> Result<Vec<AssetRecord>, ServiceError>;
    fn set_init_version(&self, asset: &AssetRecord, version: i64) -> Result<(), ServiceError>;
}

pub trait CursorStore {
    fn advance_cursor(
        &self,
        asset: &AssetRecord,
        kind: CursorKind,
        timestamp: DateTime<Utc>,
    ) -> Result<(), ServiceError>;
}

pub trait SyncStore: TenantStore + AssetRegistry + CursorStore {}

impl<T: TenantStore + AssetRegistry + CursorStore> SyncStore for T {}

#[derive(Clone)]
pub struct SqliteStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)?;
        op(&connection).map_err(ServiceError::from)
    }
}

impl TenantStore for SqliteStore {
    fn list_tenants(&self) -> Result<Vec<TenantConfig>, ServiceError> {
        self.with_connection(db::list_configurations)
    }

    fn get_tenant(&self, tenant_id: i64) -> Result<Option<TenantConfig>, ServiceError> {
        self.with_connection(|connection| db::get_configuration(connection, tenant_id))
    }

    fn set_tenant_active(&self, tenant_id: i64, active: bool) -> Result<(), ServiceError> {
        self.with_connection(|connection| {
            db::set_configuration_active(connection, tenant_id, active)
        })
    }
}

impl AssetRegistry for SqliteStore {
    fn lookup(
        &self,
        tenant_id: i64,
        project_id: &str,
        global_asset_id: &str,
    ) -> Result<Option<i32>, ServiceError> {
        self.with_connection(|connection| {
            db::find_asset_id(connection, tenant_id, project_id, global_asset_id)
        })
    }

    fn insert(&self, record: &NewAssetRecord) -> Result<i32, ServiceError> {
        self.with_connection(|connection| db::insert_asset(connection, record))
    }

    fn assets_of_type(
        &self,
        tenant_id: i64,
        asset_type: &str,
    ) -> Result<Vec<AssetRecord>, ServiceError> {
        self.with_connection(|connection| {
            db::list_assets_by_type(connection, tenant_id, asset_type)
        })
    }

    fn child_asset(
        &self,
        tenant_id: i64,
        project_id: &str,
        asset_type: &str,
        parent_provider_id: &str,
    ) -> Result<Option<AssetRecord>, ServiceError> {
        self.with_connection(|connection| {
            db::find_child_asset(
                connection,
                tenant_id,
                project_id,
                asset_type,
                parent_provider_id,
            )
        })
    }

    fn pending_init(
        &self,
        tenant_id: i64,
        below_version: i64,
    ) -> Result<Vec<AssetRecord>, ServiceError> {
        self.with_connection(|connection| {
            db::list_assets_pending_init(connection, tenant_id, below_version)
        })
    }

    fn set_init_version(&self, asset: &AssetRecord, version: i64) -> Result<(), ServiceError> {
        self.with_connection(|connection| db::set_init_version(connection, asset, version))
    }
}

impl CursorStore for SqliteStore {
    fn advance_cursor(
        &self,
        asset: &AssetRecord,
        kind: CursorKind,
        timestamp: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.with_connection(|connection| db::update_cursor(connection, asset, kind, timestamp))
    }
}
