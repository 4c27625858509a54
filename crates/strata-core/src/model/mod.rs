//! Typed cluster snapshot.
//!
//! The snapshot is what the data actor owns and replicates. Peer node
//! sub-trees travel as JSON and are patched structurally, so every map that
//! patch operations address as a parent (`instance`, `daemon`) is always
//! serialized, even when empty.

mod instance;
mod node;
mod object;

pub use instance::{
    InstanceConfig, InstanceData, InstanceMonitor, InstanceStatus, ResourceStatus, Topology,
};
pub use node::{
    NodeConfig, NodeData, NodeMonitor, NodeMonitorState, NodeStats, NodeStatus, StoragePath,
    SubsystemStatus,
};
pub use object::ObjectStatus;

use crate::names::{NodeName, ObjectPath};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entities carrying a change timestamp.
///
/// The publication pipeline compares timestamps, not content, to decide
/// whether an entity changed between two snapshots.
pub trait Timestamped {
    /// Time of the last change
    fn updated_at(&self) -> DateTime<Utc>;
}

/// Aggregated availability state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Not evaluated yet
    #[default]
    #[serde(rename = "undef")]
    Undef,
    /// Running
    #[serde(rename = "up")]
    Up,
    /// Stopped
    #[serde(rename = "down")]
    Down,
    /// Partially running
    #[serde(rename = "warn")]
    Warn,
    /// Does not apply
    #[serde(rename = "n/a")]
    NotApplicable,
    /// Standby resources running
    #[serde(rename = "stdby up")]
    StandbyUp,
    /// Standby resources stopped
    #[serde(rename = "stdby down")]
    StandbyDown,
}

/// Provisioning state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provisioned {
    /// Provisioned
    True,
    /// Not provisioned
    False,
    /// Some resources provisioned
    Mixed,
    /// Does not apply
    #[default]
    #[serde(rename = "n/a")]
    NotApplicable,
}

/// Cluster-wide section of the snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSection {
    /// Locally aggregated object status, not replicated
    #[serde(default)]
    pub object: BTreeMap<ObjectPath, ObjectStatus>,
}

/// Whole cluster dataset as seen by one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Cluster-wide section
    pub cluster: ClusterSection,
    /// Per-node sub-trees, including the local node
    #[serde(default)]
    pub node: BTreeMap<NodeName, NodeData>,
}

impl ClusterSnapshot {
    /// Names of every object with an instance on any node, deduplicated
    pub fn object_paths(&self) -> Vec<ObjectPath> {
        let mut paths: Vec<ObjectPath> = self
            .node
            .values()
            .flat_map(|data| data.instance.keys().cloned())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}
