use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use crate::domain::models::{
    AssetRecord, CursorKind, NewAssetRecord, NewTenantConfig, TenantConfig,
};

pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS configurations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    root_url TEXT NOT NULL,
    api_key TEXT NOT NULL,
    enable INTEGER NOT NULL DEFAULT 1,
    refresh_interval INTEGER NOT NULL DEFAULT 60,
    request_timeout INTEGER NOT NULL DEFAULT 120,
    project_ids TEXT NOT NULL DEFAULT '[]',
    asset_filter TEXT NOT NULL DEFAULT '[]',
    active INTEGER NOT NULL DEFAULT 0,
    user_id TEXT
);

CREATE TABLE IF NOT EXISTS assets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    configuration_id INTEGER NOT NULL REFERENCES configurations (id) ON DELETE CASCADE,
    project_id TEXT NOT NULL,
    global_asset_id TEXT NOT NULL,
    asset_id INTEGER NOT NULL,
    asset_type TEXT NOT NULL,
    parent_provider_id TEXT NOT NULL DEFAULT '',
    provider_id TEXT NOT NULL DEFAULT '',
    latest_session_ts TEXT NOT NULL DEFAULT '1970-01-01T00:00:00Z',
    latest_error_ts TEXT NOT NULL DEFAULT '1970-01-01T00:00:00Z',
    init_version INTEGER NOT NULL DEFAULT 0,
    UNIQUE (configuration_id, project_id, global_asset_id)
);

CREATE INDEX IF NOT EXISTS idx_assets_configuration_type
ON assets (configuration_id, asset_type);
"#,
)];

const ASSET_COLUMNS: &str = "configuration_id, project_id, global_asset_id, asset_id, asset_type, \
     parent_provider_id, provider_id, latest_session_ts, latest_error_ts, init_version";

const CONFIGURATION_COLUMNS: &str = "id, root_url, api_key, enable, refresh_interval, \
     request_timeout, project_ids, asset_filter, active, user_id";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
    #[error("stored timestamp {value:?} is invalid: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("stored json column {column} is invalid: {source}")]
    InvalidJson {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    let connection = Connection::open(path)?;
    connection.pragma_update(None, "foreign_keys", true)?;
    Ok(connection)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Cursors keep sub-second precision so they compare exactly against event times.
fn format_cursor(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::InvalidTimestamp { value, source })
}

fn to_json<T: serde::Serialize>(column: &'static str, value: &T) -> Result<String, DbError> {
    serde_json::to_string(value).map_err(|source| DbError::InvalidJson { column, source })
}

fn from_json<T: serde::de::DeserializeOwned>(column: &'static str, raw: &str) -> Result<T, DbError> {
    serde_json::from_str(raw).map_err(|source| DbError::InvalidJson { column, source })
}

// Tenant configurations

struct ConfigurationRow {
    id: i64,
    root_url: String,
    api_key: String,
    enable: bool,
    refresh_interval: i64,
    request_timeout: i64,
    project_ids: String,
    asset_filter: String,
    active: bool,
    user_id: Option<String>,
}

impl ConfigurationRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            root_url: row.get(1)?,
            api_key: row.get(2)?,
            enable: row.get(3)?,
            refresh_interval: row.get(4)?,
            request_timeout: row.get(5)?,
            project_ids: row.get(6)?,
            asset_filter: row.get(7)?,
            active: row.get(8)?,
            user_id: row.get(9)?,
        })
    }

    fn into_config(self) -> Result<TenantConfig, DbError> {
        Ok(TenantConfig {
            id: self.id,
            root_url: self.root_url,
            api_key: self.api_key,
            enable: self.enable,
            refresh_interval_secs: u64::try_from(self.refresh_interval).unwrap_or(0),
            request_timeout_secs: u64::try_from(self.request_timeout).unwrap_or(0),
            project_ids: from_json("project_ids", &self.project_ids)?,
            asset_filter: from_json("asset_filter", &self.asset_filter)?,
            active: self.active,
            user_id: self.user_id,
        })
    }
}

pub fn insert_configuration(
    connection: &Connection,
    new_config: &NewTenantConfig,
) -> Result<i64, DbError> {
    connection.execute(
        "INSERT INTO configurations (root_url, api_key, enable, refresh_interval, request_timeout, project_ids, asset_filter, user_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            new_config.root_url,
            new_config.api_key,
            new_config.enable,
            i64::try_from(new_config.refresh_interval_secs).unwrap_or(i64::MAX),
            i64::try_from(new_config.request_timeout_secs).unwrap_or(i64::MAX),
            to_json("project_ids", &new_config.project_ids)?,
            to_json("asset_filter", &new_config.asset_filter)?,
            new_config.user_id,
        ],
    )?;

    Ok(connection.last_insert_rowid())
}

pub fn list_configurations(connection: &Connection) -> Result<Vec<TenantConfig>, DbError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {CONFIGURATION_COLUMNS} FROM configurations ORDER BY id"
    ))?;

    let rows = statement.query_map([], ConfigurationRow::from_row)?;

    let mut configs = Vec::new();
    for row in rows {
        configs.push(row?.into_config()?);
    }

    Ok(configs)
}

pub fn get_configuration(connection: &Connection, id: i64) -> Result<Option<TenantConfig>, DbError> {
    let row = connection
        .query_row(
            &format!("SELECT {CONFIGURATION_COLUMNS} FROM configurations WHERE id = ?1"),
            params![id],
            ConfigurationRow::from_row,
        )
        .optional()?;

    row.map(ConfigurationRow::into_config).transpose()
}

pub fn set_configuration_active(
    connection: &Connection,
    id: i64,
    active: bool,
) -> Result<(), DbError> {
    connection.execute(
        "UPDATE configurations SET active = ?1 WHERE id = ?2",
        params![active, id],
    )?;
    Ok(())
}

// Identity mapping and cursors

struct AssetRow {
    configuration_id: i64,
    project_id: String,
    global_asset_id: String,
    asset_id: i32,
    asset_type: String,
    parent_provider_id: String,
    provider_id: String,
    latest_session_ts: String,
    latest_error_ts: String,
    init_version: i64,
}

impl AssetRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            configuration_id: row.get(0)?,
            project_id: row.get(1)?,
            global_asset_id: row.get(2)?,
            asset_id: row.get(3)?,
            asset_type: row.get(4)?,
            parent_provider_id: row.get(5)?,
            provider_id: row.get(6)?,
            latest_session_ts: row.get(7)?,
            latest_error_ts: row.get(8)?,
            init_version: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<AssetRecord, DbError> {
        Ok(AssetRecord {
            configuration_id: self.configuration_id,
            project_id: self.project_id,
            global_asset_id: self.global_asset_id,
            asset_id: self.asset_id,
            asset_type: self.asset_type,
            parent_provider_id: self.parent_provider_id,
            provider_id: self.provider_id,
            latest_session_ts: parse_timestamp(self.latest_session_ts)?,
            latest_error_ts: parse_timestamp(self.latest_error_ts)?,
            init_version: self.init_version,
        })
    }
}

fn collect_assets(
    statement: &mut rusqlite::Statement<'_>,
    params: impl rusqlite::Params,
) -> Result<Vec<AssetRecord>, DbError> {
    let rows = statement.query_map(params, AssetRow::from_row)?;

    let mut assets = Vec::new();
    for row in rows {
        assets.push(row?.into_record()?);
    }

    Ok(assets)
}

pub fn find_asset_id(
    connection: &Connection,
    configuration_id: i64,
    project_id: &str,
    global_asset_id: &str,
) -> Result<Option<i32>, DbError> {
    let asset_id = connection
        .query_row(
            "SELECT asset_id FROM assets
             WHERE configuration_id = ?1 AND project_id = ?2 AND global_asset_id = ?3",
            params![configuration_id, project_id, global_asset_id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(asset_id)
}

/// Inserts the mapping unless one already exists and returns the committed asset id.
pub fn insert_asset(connection: &Connection, new_asset: &NewAssetRecord) -> Result<i32, DbError> {
    connection.execute(
        "INSERT INTO assets (configuration_id, project_id, global_asset_id, asset_id, asset_type, parent_provider_id, provider_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (configuration_id, project_id, global_asset_id) DO NOTHING",
        params![
            new_asset.configuration_id,
            new_asset.project_id,
            new_asset.global_asset_id,
            new_asset.asset_id,
            new_asset.asset_type,
            new_asset.parent_provider_id,
            new_asset.provider_id,
        ],
    )?;

    let asset_id = connection.query_row(
        "SELECT asset_id FROM assets
         WHERE configuration_id = ?1 AND project_id = ?2 AND global_asset_id = ?3",
        params![
            new_asset.configuration_id,
            new_asset.project_id,
            new_asset.global_asset_id
        ],
        |row| row.get(0),
    )?;

    Ok(asset_id)
}

pub fn list_assets_by_type(
    connection: &Connection,
    configuration_id: i64,
    asset_type: &str,
) -> Result<Vec<AssetRecord>, DbError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {ASSET_COLUMNS} FROM assets
         WHERE configuration_id = ?1 AND asset_type = ?2
         ORDER BY project_id, id"
    ))?;

    collect_assets(&mut statement, params![configuration_id, asset_type])
}

pub fn list_assets_pending_init(
    connection: &Connection,
    configuration_id: i64,
    below_version: i64,
) -> Result<Vec<AssetRecord>, DbError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {ASSET_COLUMNS} FROM assets
         WHERE configuration_id = ?1 AND init_version < ?2
         ORDER BY id"
    ))?;

    collect_assets(&mut statement, params![configuration_id, below_version])
}

pub fn find_child_asset(
    connection: &Connection,
    configuration_id: i64,
    project_id: &str,
    asset_type: &str,
    parent_provider_id: &str,
) -> Result<Option<AssetRecord>, DbError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {ASSET_COLUMNS} FROM assets
         WHERE configuration_id = ?1 AND project_id = ?2 AND asset_type = ?3 AND parent_provider_id = ?4
         ORDER BY id
         LIMIT 1"
    ))?;

    let mut assets = collect_assets(
        &mut statement,
        params![configuration_id, project_id, asset_type, parent_provider_id],
    )?;
    Ok(assets.pop())
}

pub fn update_cursor(
    connection: &Connection,
    asset: &AssetRecord,
    kind: CursorKind,
    timestamp: DateTime<Utc>,
) -> Result<(), DbError> {
    let sql = match kind {
        CursorKind::Session => {
            "UPDATE assets SET latest_session_ts = ?1
             WHERE configuration_id = ?2 AND project_id = ?3 AND global_asset_id = ?4"
        }
        CursorKind::Error => {
            "UPDATE assets SET latest_error_ts = ?1
             WHERE configuration_id = ?2 AND project_id = ?3 AND global_asset_id = ?4"
        }
    };

    connection.execute(
        sql,
        params![
            format_cursor(timestamp),
            asset.configuration_id,
            asset.project_id,
            asset.global_asset_id
        ],
    )?;
    Ok(())
}

pub fn set_init_version(
    connection: &Connection,
    asset: &AssetRecord,
    version: i64,
) -> Result<(), DbError> {
    connection.execute(
        "UPDATE assets SET init_version = ?1
         WHERE configuration_id = ?2 AND project_id = ?3 AND global_asset_id = ?4",
        params![
            version,
            asset.configuration_id,
            asset.project_id,
            asset.global_asset_id
        ],
    )?;
    Ok(())
}
