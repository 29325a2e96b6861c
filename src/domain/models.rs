use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};

use crate::domain::filter::FilterRule;

pub const SESSION_STATUS_STOPPED: &str = "stopped";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Provider wire format, `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The provider sends `null` for unset fields; they decode to the zero value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Cluster {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "chargepoints", deserialize_with = "null_as_default")]
    pub charge_points: Vec<ChargePoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChargePoint {
    #[serde(rename = "chargepoint_id", deserialize_with = "null_as_default")]
    pub charge_point_id: String,
    #[serde(rename = "chargepoint_ocpp_id", deserialize_with = "null_as_default")]
    pub ocpp_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name_internal: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub communication_status: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub connectors_total: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub connectors_free: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub connectors_faulted: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub connectors_occupied: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub manufacturer: String,
    #[serde(deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(deserialize_with = "null_as_default")]
    pub lat: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub long: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub street: String,
    pub zip: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(deserialize_with = "null_as_default")]
    pub country: String,
    #[serde(deserialize_with = "null_as_default")]
    pub connectors: Vec<Connector>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Connector {
    #[serde(rename = "uuid", deserialize_with = "null_as_default")]
    pub connector_id: String,
    #[serde(rename = "evseid", deserialize_with = "null_as_default")]
    pub evse_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub max_power: i64,
    #[serde(rename = "chargepoint_type", deserialize_with = "null_as_default")]
    pub charge_point_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub plug_type: String,
    pub charging_session: Option<ChargingSession>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChargingSession {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    pub session_start: Option<DateTime<Utc>>,
    pub session_end: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_as_default")]
    pub duration: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub meter_start: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub meter_end: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub meter_total: i64,
    #[serde(rename = "chargepoint_id", deserialize_with = "null_as_default")]
    pub charge_point_id: String,
    #[serde(rename = "connector_uuid", deserialize_with = "null_as_default")]
    pub connector_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub connector_evse: String,
    #[serde(deserialize_with = "null_as_default")]
    pub costs: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
}

impl ChargingSession {
    /// Positive energy with both timestamps set.
    pub fn has_measurement(&self) -> bool {
        self.meter_total > 0 && self.session_start.is_some() && self.session_end.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.status == SESSION_STATUS_STOPPED && self.has_measurement()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ErrorNotification {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "chargepoint_id", deserialize_with = "null_as_default")]
    pub charge_point_id: String,
    #[serde(rename = "connector_uuid")]
    pub connector_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub error_code: String,
    #[serde(deserialize_with = "null_as_default")]
    pub error_info: String,
    #[serde(deserialize_with = "null_as_default")]
    pub vendor_code: String,
    pub occurred_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ErrorNotification {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    pub fn message(&self) -> String {
        format!("{}: {} ({})", self.error_code, self.error_info, self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TenantConfig {
    pub id: i64,
    pub root_url: String,
    pub api_key: String,
    pub enable: bool,
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub project_ids: Vec<String>,
    pub asset_filter: Vec<Vec<FilterRule>>,
    pub active: bool,
    pub user_id: Option<String>,
}

impl TenantConfig {
    pub fn request_timeout(&self) -> Duration {
        match self.request_timeout_secs {
            0 => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTenantConfig {
    pub root_url: String,
    pub api_key: String,
    pub enable: bool,
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub project_ids: Vec<String>,
    pub asset_filter: Vec<Vec<FilterRule>>,
    pub user_id: Option<String>,
}

/// Persisted mapping between a node's global asset identifier and its platform asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRecord {
    pub configuration_id: i64,
    pub project_id: String,
    pub global_asset_id: String,
    pub asset_id: i32,
    pub asset_type: String,
    pub parent_provider_id: String,
    pub provider_id: String,
    pub latest_session_ts: DateTime<Utc>,
    pub latest_error_ts: DateTime<Utc>,
    pub init_version: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAssetRecord {
    pub configuration_id: i64,
    pub project_id: String,
    pub global_asset_id: String,
    pub asset_id: i32,
    pub asset_type: String,
    pub parent_provider_id: String,
    pub provider_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    Session,
    Error,
}

/// Channel tag of a data point on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Subtype {
    Status,
    Input,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub asset_id: i32,
    pub subtype: Subtype,
    pub timestamp: DateTime<Utc>,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAsset {
    pub project_id: String,
    pub global_asset_identifier: String,
    pub name: String,
    pub description: String,
    pub asset_type: String,
    pub parent_locational_asset_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRule {
    pub asset_id: i32,
    pub subtype: Subtype,
    pub attribute: String,
    pub enable: bool,
    pub priority: i32,
    pub requires_acknowledge: bool,
    pub high: f64,
    pub message: Value,
    pub notify_on: String,
    pub dont_mask: bool,
}

impl AlarmRule {
    /// Raised while a connector reports an open error.
    pub fn connector_error(asset_id: i32) -> Self {
        let text = "{{asset.name}} ({{alarm.val}})";
        Self {
            asset_id,
            subtype: Subtype::Status,
            attribute: "error".to_string(),
            enable: true,
            priority: 2,
            requires_acknowledge: false,
            high: 1.0,
            message: json!({
                "come": { "de": text, "en": text, "fr": text, "it": text }
            }),
            notify_on: "R".to_string(),
            dont_mask: false,
        }
    }
}
