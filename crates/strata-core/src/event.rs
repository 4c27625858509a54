//! Typed per-entity change notifications.

use crate::model::{
    InstanceConfig, InstanceMonitor, InstanceStatus, NodeConfig, NodeMonitor, NodeStats,
    NodeStatus, ObjectStatus, SubsystemStatus,
};
use crate::names::{NodeName, ObjectPath};
use serde::{Deserialize, Serialize};

/// What happened to an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", content = "value", rename_all = "lowercase")]
pub enum Change<T> {
    /// Created or changed, carrying the new value
    Updated(T),
    /// No longer present
    Deleted,
}

impl<T> Change<T> {
    /// Whether this is a deletion
    pub fn is_deleted(&self) -> bool {
        matches!(self, Change::Deleted)
    }

    /// New value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Change::Updated(v) => Some(v),
            Change::Deleted => None,
        }
    }
}

/// Event published when a snapshot entity changes
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ClusterEvent {
    NodeConfig {
        node: NodeName,
        change: Change<NodeConfig>,
    },
    NodeStatus {
        node: NodeName,
        change: Change<NodeStatus>,
    },
    NodeStats {
        node: NodeName,
        change: Change<NodeStats>,
    },
    NodeMonitor {
        node: NodeName,
        change: Change<NodeMonitor>,
    },
    Subsystem {
        node: NodeName,
        name: String,
        change: Change<SubsystemStatus>,
    },
    InstanceConfig {
        node: NodeName,
        path: ObjectPath,
        change: Change<InstanceConfig>,
    },
    InstanceStatus {
        node: NodeName,
        path: ObjectPath,
        change: Change<InstanceStatus>,
    },
    InstanceMonitor {
        node: NodeName,
        path: ObjectPath,
        change: Change<InstanceMonitor>,
    },
    /// Local aggregated object status
    ObjectStatus {
        path: ObjectPath,
        change: Change<ObjectStatus>,
    },
}

impl ClusterEvent {
    /// Node the entity belongs to; `None` for cluster-level entities
    pub fn node(&self) -> Option<&NodeName> {
        match self {
            ClusterEvent::NodeConfig { node, .. }
            | ClusterEvent::NodeStatus { node, .. }
            | ClusterEvent::NodeStats { node, .. }
            | ClusterEvent::NodeMonitor { node, .. }
            | ClusterEvent::Subsystem { node, .. }
            | ClusterEvent::InstanceConfig { node, .. }
            | ClusterEvent::InstanceStatus { node, .. }
            | ClusterEvent::InstanceMonitor { node, .. } => Some(node),
            ClusterEvent::ObjectStatus { .. } => None,
        }
    }

    /// Object the entity belongs to, if any
    pub fn object(&self) -> Option<&ObjectPath> {
        match self {
            ClusterEvent::InstanceConfig { path, .. }
            | ClusterEvent::InstanceStatus { path, .. }
            | ClusterEvent::InstanceMonitor { path, .. }
            | ClusterEvent::ObjectStatus { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Whether the entity was deleted
    pub fn is_deleted(&self) -> bool {
        match self {
            ClusterEvent::NodeConfig { change, .. } => change.is_deleted(),
            ClusterEvent::NodeStatus { change, .. } => change.is_deleted(),
            ClusterEvent::NodeStats { change, .. } => change.is_deleted(),
            ClusterEvent::NodeMonitor { change, .. } => change.is_deleted(),
            ClusterEvent::Subsystem { change, .. } => change.is_deleted(),
            ClusterEvent::InstanceConfig { change, .. } => change.is_deleted(),
            ClusterEvent::InstanceStatus { change, .. } => change.is_deleted(),
            ClusterEvent::InstanceMonitor { change, .. } => change.is_deleted(),
            ClusterEvent::ObjectStatus { change, .. } => change.is_deleted(),
        }
    }

    /// Event name for logs, e.g. `InstanceStatusDeleted`
    pub fn name(&self) -> String {
        let entity = match self {
            ClusterEvent::NodeConfig { .. } => "NodeConfig",
            ClusterEvent::NodeStatus { .. } => "NodeStatus",
            ClusterEvent::NodeStats { .. } => "NodeStats",
            ClusterEvent::NodeMonitor { .. } => "NodeMonitor",
            ClusterEvent::Subsystem { .. } => "Subsystem",
            ClusterEvent::InstanceConfig { .. } => "InstanceConfig",
            ClusterEvent::InstanceStatus { .. } => "InstanceStatus",
            ClusterEvent::InstanceMonitor { .. } => "InstanceMonitor",
            ClusterEvent::ObjectStatus { .. } => "ObjectStatus",
        };
        let verb = if self.is_deleted() { "Deleted" } else { "Updated" };
        format!("{entity}{verb}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_combine_entity_and_change() {
        let ev = ClusterEvent::InstanceStatus {
            node: "a".into(),
            path: ObjectPath::parse("svc1").unwrap(),
            change: Change::Deleted,
        };
        assert_eq!(ev.name(), "InstanceStatusDeleted");
        assert_eq!(ev.node(), Some(&NodeName::from("a")));
        assert_eq!(ev.object().map(ObjectPath::as_str), Some("svc1"));
    }

    #[test]
    fn object_status_has_no_node() {
        let ev = ClusterEvent::ObjectStatus {
            path: ObjectPath::parse("svc1").unwrap(),
            change: Change::Updated(ObjectStatus::default()),
        };
        assert!(ev.node().is_none());
        assert_eq!(ev.name(), "ObjectStatusUpdated");
    }
}
