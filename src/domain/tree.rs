//! Locational resource tree mirrored into the asset platform.
//!
//! The tree is built from an already fetched cluster inventory and carries no
//! tenant state; callers pass tenant/project context explicitly while walking it.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::domain::filter::{AttributeMap, FilterError, FilterRule, adheres, flatten_attributes};
use crate::domain::models::{ChargePoint, Cluster, Connector, Subtype};

pub const ASSET_TYPE_ROOT: &str = "gp_joule_root";
pub const ASSET_TYPE_CLUSTER: &str = "gp_joule_cluster";
pub const ASSET_TYPE_CHARGE_POINT: &str = "gp_joule_charge_point";
pub const ASSET_TYPE_CONNECTOR: &str = "gp_joule_connector";
pub const ASSET_TYPE_SESSION_LOG: &str = "gp_joule_session_log";

pub const OCCUPANCY_AVAILABLE: i32 = 0;
pub const OCCUPANCY_OCCUPIED: i32 = 1;
pub const OCCUPANCY_UNKNOWN: i32 = -1;

/// Provider identifiers persisted next to the identity mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentLabels {
    pub parent_provider_id: String,
    pub provider_id: String,
}

/// Capabilities shared by every node kind.
pub trait AssetNode {
    fn name(&self) -> String;
    fn description(&self) -> String;
    fn asset_type(&self) -> &'static str;
    /// Derived only from the asset type and provider-stable identifiers.
    fn global_asset_id(&self) -> String;
    fn parent_labels(&self) -> ParentLabels;
    fn filter_attributes(&self) -> Result<AttributeMap, FilterError>;
    fn data(&self) -> Vec<(Subtype, Map<String, Value>)>;
    fn children(&self) -> &[ResourceNode];

    fn adheres_to_filter(&self, groups: &[Vec<FilterRule>]) -> Result<bool, FilterError> {
        if groups.is_empty() {
            return Ok(true);
        }
        adheres(groups, &self.filter_attributes()?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceNode {
    Root(RootNode),
    Cluster(ClusterNode),
    Station(StationNode),
    Connector(ConnectorNode),
    EventLog(EventLogNode),
}

impl ResourceNode {
    pub fn as_node(&self) -> &dyn AssetNode {
        match self {
            Self::Root(node) => node,
            Self::Cluster(node) => node,
            Self::Station(node) => node,
            Self::Connector(node) => node,
            Self::EventLog(node) => node,
        }
    }

    /// Depth-first, parent before children.
    pub fn descendants(&self) -> Vec<&ResourceNode> {
        let mut nodes = vec![self];
        for child in self.as_node().children() {
            nodes.extend(child.descendants());
        }
        nodes
    }
}

pub fn build_tree(clusters: &[Cluster]) -> ResourceNode {
    ResourceNode::Root(RootNode {
        children: clusters
            .iter()
            .map(|cluster| ResourceNode::Cluster(ClusterNode::from_cluster(cluster)))
            .collect(),
    })
}

pub fn occupancy(status: &str) -> i32 {
    match status {
        "available" => OCCUPANCY_AVAILABLE,
        "occupied" => OCCUPANCY_OCCUPIED,
        _ => OCCUPANCY_UNKNOWN,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootNode {
    #[serde(skip)]
    children: Vec<ResourceNode>,
}

impl AssetNode for RootNode {
    fn name(&self) -> String {
        "GP Joule".to_string()
    }

    fn description(&self) -> String {
        "GP Joule Root".to_string()
    }

    fn asset_type(&self) -> &'static str {
        ASSET_TYPE_ROOT
    }

    fn global_asset_id(&self) -> String {
        ASSET_TYPE_ROOT.to_string()
    }

    fn parent_labels(&self) -> ParentLabels {
        ParentLabels::default()
    }

    fn filter_attributes(&self) -> Result<AttributeMap, FilterError> {
        flatten_attributes(self)
    }

    fn data(&self) -> Vec<(Subtype, Map<String, Value>)> {
        Vec::new()
    }

    fn children(&self) -> &[ResourceNode] {
        &self.children
    }

    // synthetic, always mirrored
    fn adheres_to_filter(&self, _groups: &[Vec<FilterRule>]) -> Result<bool, FilterError> {
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterNode {
    pub name: String,
    #[serde(skip)]
    children: Vec<ResourceNode>,
}

impl ClusterNode {
    fn from_cluster(cluster: &Cluster) -> Self {
        Self {
            name: cluster.name.clone(),
            children: cluster
                .charge_points
                .iter()
                .map(|charge_point| {
                    ResourceNode::Station(StationNode::from_charge_point(&cluster.name, charge_point))
                })
                .collect(),
        }
    }
}

impl AssetNode for ClusterNode {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        String::new()
    }

    fn asset_type(&self) -> &'static str {
        ASSET_TYPE_CLUSTER
    }

    fn global_asset_id(&self) -> String {
        format!("{ASSET_TYPE_CLUSTER}_{}", self.name)
    }

    fn parent_labels(&self) -> ParentLabels {
        ParentLabels {
            parent_provider_id: String::new(),
            provider_id: self.name.clone(),
        }
    }

    fn filter_attributes(&self) -> Result<AttributeMap, FilterError> {
        flatten_attributes(self)
    }

    fn data(&self) -> Vec<(Subtype, Map<String, Value>)> {
        Vec::new()
    }

    fn children(&self) -> &[ResourceNode] {
        &self.children
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationNode {
    #[serde(skip)]
    pub cluster_name: String,
    #[serde(rename = "id")]
    pub charge_point_id: String,
    pub name: String,
    pub name_internal: String,
    pub status: String,
    pub connectors_total: i64,
    pub connectors_occupied: i64,
    pub manufacturer: String,
    pub model: String,
    #[serde(skip)]
    children: Vec<ResourceNode>,
}

impl StationNode {
    fn from_charge_point(cluster_name: &str, charge_point: &ChargePoint) -> Self {
        Self {
            cluster_name: cluster_name.to_string(),
            charge_point_id: charge_point.charge_point_id.clone(),
            name: charge_point.name.clone(),
            name_internal: charge_point.name_internal.clone(),
            status: charge_point.status.clone(),
            connectors_total: charge_point.connectors_total,
            connectors_occupied: charge_point.connectors_occupied,
            manufacturer: charge_point.manufacturer.clone(),
            model: charge_point.model.clone(),
            children: charge_point
                .connectors
                .iter()
                .enumerate()
                .map(|(position, connector)| {
                    ResourceNode::Connector(ConnectorNode::from_connector(
                        &charge_point.charge_point_id,
                        connector,
                        position + 1,
                    ))
                })
                .collect(),
        }
    }
}

impl AssetNode for StationNode {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        self.name_internal.clone()
    }

    fn asset_type(&self) -> &'static str {
        ASSET_TYPE_CHARGE_POINT
    }

    fn global_asset_id(&self) -> String {
        format!("{ASSET_TYPE_CHARGE_POINT}_{}", self.charge_point_id)
    }

    fn parent_labels(&self) -> ParentLabels {
        ParentLabels {
            parent_provider_id: self.cluster_name.clone(),
            provider_id: self.charge_point_id.clone(),
        }
    }

    fn filter_attributes(&self) -> Result<AttributeMap, FilterError> {
        flatten_attributes(self)
    }

    fn data(&self) -> Vec<(Subtype, Map<String, Value>)> {
        vec![
            (
                Subtype::Status,
                object(json!({
                    "status": self.status,
                    "connectors_occupied": self.connectors_occupied,
                })),
            ),
            (
                Subtype::Info,
                object(json!({
                    "connectors_total": self.connectors_total,
                    "manufacturer": self.manufacturer,
                    "model": self.model,
                })),
            ),
        ]
    }

    fn children(&self) -> &[ResourceNode] {
        &self.children
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorNode {
    #[serde(skip)]
    pub charge_point_id: String,
    #[serde(skip)]
    pub connector_id: String,
    #[serde(skip)]
    pub evse_id: String,
    #[serde(skip)]
    pub charge_point_type: String,
    #[serde(skip)]
    pub index: usize,
    pub status: String,
    pub max_power: i64,
    pub plug_type: String,
    pub current_energy: i64,
    pub current_duration: i64,
    pub occupied: i32,
    #[serde(skip)]
    children: Vec<ResourceNode>,
}

impl ConnectorNode {
    fn from_connector(charge_point_id: &str, connector: &Connector, index: usize) -> Self {
        let (current_energy, current_duration, occupied) = match &connector.charging_session {
            Some(session) if session.has_measurement() => (
                session.meter_total.max(0),
                session.duration,
                occupancy(&connector.status),
            ),
            _ => (0, 0, OCCUPANCY_AVAILABLE),
        };

        let mut node = Self {
            charge_point_id: charge_point_id.to_string(),
            connector_id: connector.connector_id.clone(),
            evse_id: connector.evse_id.clone(),
            charge_point_type: connector.charge_point_type.clone(),
            index,
            status: connector.status.clone(),
            max_power: connector.max_power,
            plug_type: connector.plug_type.clone(),
            current_energy,
            current_duration,
            occupied,
            children: Vec::new(),
        };
        node.children = vec![ResourceNode::EventLog(EventLogNode {
            connector_id: node.connector_id.clone(),
            connector_name: node.name(),
        })];
        node
    }
}

impl AssetNode for ConnectorNode {
    fn name(&self) -> String {
        format!("{} {} {}", self.plug_type, self.charge_point_type, self.index)
    }

    fn description(&self) -> String {
        self.evse_id.clone()
    }

    fn asset_type(&self) -> &'static str {
        ASSET_TYPE_CONNECTOR
    }

    fn global_asset_id(&self) -> String {
        format!("{ASSET_TYPE_CONNECTOR}_{}", self.connector_id)
    }

    fn parent_labels(&self) -> ParentLabels {
        ParentLabels {
            parent_provider_id: self.charge_point_id.clone(),
            provider_id: self.connector_id.clone(),
        }
    }

    fn filter_attributes(&self) -> Result<AttributeMap, FilterError> {
        flatten_attributes(self)
    }

    fn data(&self) -> Vec<(Subtype, Map<String, Value>)> {
        vec![
            (
                Subtype::Status,
                object(json!({
                    "status": self.status,
                    "occupied": self.occupied,
                })),
            ),
            (
                Subtype::Info,
                object(json!({ "max_power": self.max_power })),
            ),
            (
                Subtype::Input,
                object(json!({
                    "current_energy": self.current_energy,
                    "current_duration": self.current_duration,
                })),
            ),
        ]
    }

    fn children(&self) -> &[ResourceNode] {
        &self.children
    }
}

/// Synthetic leaf holding the completed sessions of one connector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLogNode {
    #[serde(skip)]
    pub connector_id: String,
    #[serde(skip)]
    pub connector_name: String,
}

impl AssetNode for EventLogNode {
    fn name(&self) -> String {
        format!("{} session log", self.connector_name)
    }

    fn description(&self) -> String {
        format!("Session log for {}", self.connector_name)
    }

    fn asset_type(&self) -> &'static str {
        ASSET_TYPE_SESSION_LOG
    }

    fn global_asset_id(&self) -> String {
        format!("{ASSET_TYPE_SESSION_LOG}_{}", self.connector_id)
    }

    fn parent_labels(&self) -> ParentLabels {
        ParentLabels {
            parent_provider_id: self.connector_id.clone(),
            provider_id: String::new(),
        }
    }

    fn filter_attributes(&self) -> Result<AttributeMap, FilterError> {
        flatten_attributes(self)
    }

    fn data(&self) -> Vec<(Subtype, Map<String, Value>)> {
        Vec::new()
    }

    fn children(&self) -> &[ResourceNode] {
        &[]
    }

    /// Follows its connector, which has already passed the filter.
    fn adheres_to_filter(&self, _groups: &[Vec<FilterRule>]) -> Result<bool, FilterError> {
        Ok(true)
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
