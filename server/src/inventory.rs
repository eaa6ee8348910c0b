//! Inventory loading
//!
//! The inventory is the JSON array produced by `az resource list` style
//! queries. Each record becomes one simulated process.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::error::{BernieError, Result};

pub const VIRTUAL_MACHINE_TYPE: &str = "Microsoft.Compute/virtualMachines";
pub const RESOURCE_GROUP_TYPE: &str = "Microsoft.Resources/Subscriptions/ResourceGroups";

/// One entry of the inventory file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "createdTime")]
    pub time_created: Option<DateTime<Utc>>,
    #[serde(default, rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub vm_id: String,
    #[serde(default)]
    pub resource_group: String,
}

/// Resource type discriminator, matched case-insensitively
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    VirtualMachine,
    ResourceGroup,
    Other(String),
}

impl ResourceKind {
    pub fn from_type(resource_type: &str) -> Self {
        if resource_type.eq_ignore_ascii_case(VIRTUAL_MACHINE_TYPE) {
            ResourceKind::VirtualMachine
        } else if resource_type.eq_ignore_ascii_case(RESOURCE_GROUP_TYPE) {
            ResourceKind::ResourceGroup
        } else {
            ResourceKind::Other(resource_type.to_string())
        }
    }
}

/// Parse an inventory document
pub fn parse_inventory(content: &str) -> Result<Vec<InventoryRecord>> {
    serde_json::from_str(content).map_err(|e| BernieError::MalformedInventory(e.to_string()))
}

/// Read and parse the inventory file at `path`
pub fn load_inventory(path: &Path) -> Result<Vec<InventoryRecord>> {
    let content = fs::read_to_string(path).map_err(|e| {
        BernieError::MalformedInventory(format!("failed to read {}: {e}", path.display()))
    })?;
    let records = parse_inventory(&content)?;
    info!("Read {} inventory records from {}", records.len(), path.display());
    Ok(records)
}
