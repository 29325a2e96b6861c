//! Identity bridge between tree nodes and platform assets.
//!
//! The global asset identifier is a property of the node; this module only
//! looks up and persists its mapping for a tenant and project.

use crate::app::services::{AssetRegistry, ServiceError};
use crate::domain::models::{NewAssetRecord, TenantConfig};
use crate::domain::tree::AssetNode;

pub fn resolve<R: AssetRegistry + ?Sized>(
    registry: &R,
    tenant: &TenantConfig,
    project_id: &str,
    node: &dyn AssetNode,
) -> Result<Option<i32>, ServiceError> {
    registry.lookup(tenant.id, project_id, &node.global_asset_id())
}

/// Returns the committed asset id, which is the first one registered for this
/// identifier even when called again with a different id.
pub fn register<R: AssetRegistry + ?Sized>(
    registry: &R,
    tenant: &TenantConfig,
    project_id: &str,
    node: &dyn AssetNode,
    asset_id: i32,
) -> Result<i32, ServiceError> {
    let labels = node.parent_labels();
    registry.insert(&NewAssetRecord {
        configuration_id: tenant.id,
        project_id: project_id.to_string(),
        global_asset_id: node.global_asset_id(),
        asset_id,
        asset_type: node.asset_type().to_string(),
        parent_provider_id: labels.parent_provider_id,
        provider_id: labels.provider_id,
    })
}
