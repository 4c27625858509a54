#![allow(missing_docs)]

use super::{InstanceData, Timestamped};
use crate::error::{CoreError, CoreResult};
use crate::generation::GenerationRow;
use crate::names::ObjectPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One node's replicated sub-tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Node configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<NodeConfig>,
    /// Node status, always present
    #[serde(default)]
    pub status: NodeStatus,
    /// Resource usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<NodeStats>,
    /// Node monitor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<NodeMonitor>,
    /// Object instances hosted by the node
    #[serde(default)]
    pub instance: BTreeMap<ObjectPath, InstanceData>,
    /// Daemon subsystem health
    #[serde(default)]
    pub daemon: BTreeMap<String, SubsystemStatus>,
}

impl NodeData {
    /// Encode as a JSON tree for structural patching
    pub fn to_value(&self) -> CoreResult<Value> {
        serde_json::to_value(self).map_err(|e| CoreError::encode(e.to_string()))
    }

    /// Decode from a (possibly patched) JSON tree
    pub fn from_value(value: Value) -> CoreResult<Self> {
        serde_json::from_value(value).map_err(|e| CoreError::decode(e.to_string()))
    }
}

/// Node configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Deployment environment label
    pub env: String,
    /// Maximum concurrent orchestrated actions
    pub max_parallel: u32,
    /// Minimum available memory before the node refuses new instances
    pub min_avail_mem_pct: u8,
    /// Action taken on split brain
    pub split_action: String,
    /// Seconds to wait for peers before leaving maintenance
    pub maintenance_grace_period_secs: u64,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

/// Storage path between a local initiator and a target
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoragePath {
    /// Local initiator name
    pub initiator: String,
    /// Remote target name
    pub target: String,
}

/// Node status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Agent version
    pub agent: String,
    /// API level
    pub api: u64,
    /// Data protocol compatibility level
    pub compat: u64,
    /// Set when the node is frozen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen_at: Option<DateTime<Utc>>,
    /// Generations the node has absorbed, its own counter included
    #[serde(default)]
    pub gen: GenerationRow,
    /// Node labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Storage paths
    #[serde(default)]
    pub paths: Vec<StoragePath>,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

/// Node resource usage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStats {
    pub load_15m: f64,
    pub mem_avail_pct: u8,
    pub mem_total_mb: u64,
    pub swap_avail_pct: u8,
    pub swap_total_mb: u64,
    /// Placement score, higher is better
    pub score: u64,
    pub updated_at: DateTime<Utc>,
}

/// Node monitor state machine position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeMonitorState {
    #[default]
    Idle,
    Rejoin,
    Maintenance,
    Upgrade,
    Draining,
    DrainFailed,
    Drained,
    Shutting,
    Zombie,
}

/// Node monitor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMonitor {
    pub state: NodeMonitorState,
    pub global_expect: String,
    pub local_expect: String,
    /// When `state` last changed
    pub state_updated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Health of one daemon subsystem
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsystemStatus {
    pub id: String,
    pub state: String,
    pub configured_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub alerts: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

macro_rules! impl_timestamped {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Timestamped for $ty {
                fn updated_at(&self) -> DateTime<Utc> {
                    self.updated_at
                }
            }
        )*
    };
}

impl_timestamped!(NodeConfig, NodeStatus, NodeStats, NodeMonitor, SubsystemStatus);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_maps_are_always_serialized() {
        let value = NodeData::default().to_value().unwrap();
        assert!(value.get("instance").unwrap().is_object());
        assert!(value.get("daemon").unwrap().is_object());
        assert!(value.get("monitor").is_none());
        assert!(value["status"].get("frozen_at").is_none());
    }

    #[test]
    fn value_roundtrip_preserves_data() {
        let mut data = NodeData::default();
        data.status.agent = "3.0".into();
        data.status.labels.insert("az".into(), "eu-1".into());
        data.monitor = Some(NodeMonitor {
            state: NodeMonitorState::DrainFailed,
            ..Default::default()
        });
        let back = NodeData::from_value(data.to_value().unwrap()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn malformed_tree_is_a_decode_error() {
        let err = NodeData::from_value(serde_json::json!({"status": 3})).unwrap_err();
        assert!(matches!(err, CoreError::Decode { .. }));
    }
}
