#![allow(missing_docs)]

use super::{Provisioned, Status, Timestamped};
use crate::names::NodeName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placement topology of an object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// One active instance at a time
    #[default]
    Failover,
    /// Several active instances
    Flex,
}

/// Everything a node publishes about one object instance.
///
/// An instance entry exists while at least one part is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<InstanceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InstanceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<InstanceMonitor>,
}

impl InstanceData {
    /// Whether no part is set
    pub fn is_empty(&self) -> bool {
        self.config.is_none() && self.status.is_none() && self.monitor.is_none()
    }
}

/// Instance configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Nodes the object may run on, in priority order
    #[serde(default)]
    pub nodes: Vec<NodeName>,
    /// Nodes actually in scope after evaluation
    #[serde(default)]
    pub scope: Vec<NodeName>,
    pub priority: u32,
    pub topology: Topology,
    pub orchestrate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex_min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex_max: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex_target: Option<u32>,
    /// Configuration file checksum
    pub checksum: String,
    pub updated_at: DateTime<Utc>,
}

/// Status of one resource of an instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub label: String,
    pub status: Status,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub optional: bool,
    pub provisioned: Provisioned,
}

/// Instance status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub avail: Status,
    pub overall: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen_at: Option<DateTime<Utc>>,
    pub provisioned: Provisioned,
    pub optional: Status,
    /// Keyed by resource id
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceStatus>,
    pub updated_at: DateTime<Utc>,
}

/// Instance monitor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceMonitor {
    pub state: String,
    pub global_expect: String,
    pub local_expect: String,
    #[serde(default)]
    pub is_leader: bool,
    #[serde(default)]
    pub is_ha_leader: bool,
    /// Restart attempts since the last successful start
    #[serde(default)]
    pub restarts: u32,
    pub updated_at: DateTime<Utc>,
}

impl Timestamped for InstanceConfig {
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Timestamped for InstanceStatus {
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Timestamped for InstanceMonitor {
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
