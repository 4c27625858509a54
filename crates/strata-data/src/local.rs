//! Typed local mutations.
//!
//! Each change updates the pending snapshot and records the equivalent patch
//! operation, addressed relative to the local node sub-tree, so that peers
//! holding a copy of that sub-tree can replay it.

use crate::dataset::Dataset;
use crate::error::{DataError, DataResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use strata_core::{
    Change, ClusterEvent, CoreError, InstanceConfig, InstanceData, InstanceMonitor,
    InstanceStatus, NodeConfig, NodeMonitor, NodeStats, ObjectPath, ObjectStatus, StoragePath,
    SubsystemStatus,
};
use strata_json_patch::{path, PatchOp, Path};

/// A mutation of locally owned data
#[derive(Debug, Clone, PartialEq)]
pub enum LocalChange {
    /// Set an instance configuration
    SetInstanceConfig(ObjectPath, InstanceConfig),
    /// Remove an instance configuration
    UnsetInstanceConfig(ObjectPath),
    /// Set an instance status
    SetInstanceStatus(ObjectPath, InstanceStatus),
    /// Remove an instance status
    UnsetInstanceStatus(ObjectPath),
    /// Set an instance monitor
    SetInstanceMonitor(ObjectPath, InstanceMonitor),
    /// Remove an instance monitor
    UnsetInstanceMonitor(ObjectPath),
    /// Set the node configuration
    SetNodeConfig(NodeConfig),
    /// Remove the node configuration
    UnsetNodeConfig,
    /// Set the node stats
    SetNodeStats(NodeStats),
    /// Remove the node stats
    UnsetNodeStats,
    /// Set the node monitor
    SetNodeMonitor(NodeMonitor),
    /// Remove the node monitor
    UnsetNodeMonitor,
    /// Freeze the node
    SetNodeFrozen(DateTime<Utc>),
    /// Thaw the node
    UnsetNodeFrozen,
    /// Replace the node labels
    SetNodeLabels(BTreeMap<String, String>),
    /// Replace the node storage paths
    SetNodePaths(Vec<StoragePath>),
    /// Set a daemon subsystem status
    SetSubsystemStatus(String, SubsystemStatus),
    /// Remove a daemon subsystem status
    UnsetSubsystemStatus(String),
    /// Set an object aggregated status (local only, not replicated)
    SetObjectStatus(ObjectPath, ObjectStatus),
    /// Remove an object aggregated status
    UnsetObjectStatus(ObjectPath),
}

impl LocalChange {
    /// Short name for logs and stats
    pub fn name(&self) -> &'static str {
        match self {
            LocalChange::SetInstanceConfig(..) => "set_instance_config",
            LocalChange::UnsetInstanceConfig(..) => "unset_instance_config",
            LocalChange::SetInstanceStatus(..) => "set_instance_status",
            LocalChange::UnsetInstanceStatus(..) => "unset_instance_status",
            LocalChange::SetInstanceMonitor(..) => "set_instance_monitor",
            LocalChange::UnsetInstanceMonitor(..) => "unset_instance_monitor",
            LocalChange::SetNodeConfig(..) => "set_node_config",
            LocalChange::UnsetNodeConfig => "unset_node_config",
            LocalChange::SetNodeStats(..) => "set_node_stats",
            LocalChange::UnsetNodeStats => "unset_node_stats",
            LocalChange::SetNodeMonitor(..) => "set_node_monitor",
            LocalChange::UnsetNodeMonitor => "unset_node_monitor",
            LocalChange::SetNodeFrozen(..) => "set_node_frozen",
            LocalChange::UnsetNodeFrozen => "unset_node_frozen",
            LocalChange::SetNodeLabels(..) => "set_node_labels",
            LocalChange::SetNodePaths(..) => "set_node_paths",
            LocalChange::SetSubsystemStatus(..) => "set_subsystem_status",
            LocalChange::UnsetSubsystemStatus(..) => "unset_subsystem_status",
            LocalChange::SetObjectStatus(..) => "set_object_status",
            LocalChange::UnsetObjectStatus(..) => "unset_object_status",
        }
    }
}

fn encode<T: Serialize>(value: &T) -> DataResult<Value> {
    serde_json::to_value(value).map_err(|e| DataError::Encode(CoreError::encode(e.to_string())))
}

impl Dataset {
    /// Apply a local change.
    ///
    /// Returns the event to publish right away; replicated changes are
    /// published at commit instead.
    pub(crate) fn apply_local(&mut self, change: LocalChange) -> DataResult<Option<ClusterEvent>> {
        let ops = match change {
            LocalChange::SetInstanceConfig(path, v) => {
                self.change_instance(&path, "config", |i| i.config = Some(v))?
            }
            LocalChange::UnsetInstanceConfig(path) => {
                self.change_instance(&path, "config", |i| i.config = None)?
            }
            LocalChange::SetInstanceStatus(path, v) => {
                self.change_instance(&path, "status", |i| i.status = Some(v))?
            }
            LocalChange::UnsetInstanceStatus(path) => {
                self.change_instance(&path, "status", |i| i.status = None)?
            }
            LocalChange::SetInstanceMonitor(path, v) => {
                self.change_instance(&path, "monitor", |i| i.monitor = Some(v))?
            }
            LocalChange::UnsetInstanceMonitor(path) => {
                self.change_instance(&path, "monitor", |i| i.monitor = None)?
            }
            LocalChange::SetNodeConfig(v) => {
                let value = encode(&v)?;
                self.local_mut().config = Some(v);
                vec![PatchOp::replace(path!("config"), value)]
            }
            LocalChange::UnsetNodeConfig => {
                let removed = self.local_mut().config.take().is_some();
                removal(removed, path!("config"))
            }
            LocalChange::SetNodeStats(v) => {
                let value = encode(&v)?;
                self.local_mut().stats = Some(v);
                vec![PatchOp::replace(path!("stats"), value)]
            }
            LocalChange::UnsetNodeStats => {
                let removed = self.local_mut().stats.take().is_some();
                removal(removed, path!("stats"))
            }
            LocalChange::SetNodeMonitor(v) => {
                let value = encode(&v)?;
                self.local_mut().monitor = Some(v);
                vec![PatchOp::replace(path!("monitor"), value)]
            }
            LocalChange::UnsetNodeMonitor => {
                let removed = self.local_mut().monitor.take().is_some();
                removal(removed, path!("monitor"))
            }
            LocalChange::SetNodeFrozen(at) => {
                let value = encode(&at)?;
                let mut ops = vec![PatchOp::replace(path!("status", "frozen_at"), value)];
                self.local_mut().status.frozen_at = Some(at);
                ops.push(self.touch_status()?);
                ops
            }
            LocalChange::UnsetNodeFrozen => {
                if self.local_mut().status.frozen_at.take().is_some() {
                    vec![PatchOp::remove(path!("status", "frozen_at")), self.touch_status()?]
                } else {
                    Vec::new()
                }
            }
            LocalChange::SetNodeLabels(labels) => {
                let value = encode(&labels)?;
                self.local_mut().status.labels = labels;
                vec![PatchOp::replace(path!("status", "labels"), value), self.touch_status()?]
            }
            LocalChange::SetNodePaths(paths) => {
                let value = encode(&paths)?;
                self.local_mut().status.paths = paths;
                vec![PatchOp::replace(path!("status", "paths"), value), self.touch_status()?]
            }
            LocalChange::SetSubsystemStatus(name, v) => {
                let value = encode(&v)?;
                let op = PatchOp::replace(path!("daemon", name.as_str()), value);
                self.local_mut().daemon.insert(name, v);
                vec![op]
            }
            LocalChange::UnsetSubsystemStatus(name) => {
                let removed = self.local_mut().daemon.remove(&name).is_some();
                removal(removed, path!("daemon", name.as_str()))
            }
            LocalChange::SetObjectStatus(path, v) => {
                self.pending.cluster.object.insert(path.clone(), v.clone());
                return Ok(Some(ClusterEvent::ObjectStatus {
                    path,
                    change: Change::Updated(v),
                }));
            }
            LocalChange::UnsetObjectStatus(path) => {
                let removed = self.pending.cluster.object.remove(&path).is_some();
                return Ok(removed.then_some(ClusterEvent::ObjectStatus {
                    path,
                    change: Change::Deleted,
                }));
            }
        };

        if !ops.is_empty() {
            self.pending_ops.extend(ops);
            self.touched.insert(self.local.clone());
        }
        Ok(None)
    }

    /// Bump the local status timestamp and return the matching operation
    fn touch_status(&mut self) -> DataResult<PatchOp> {
        let now = Utc::now();
        self.local_mut().status.updated_at = now;
        Ok(PatchOp::replace(path!("status", "updated_at"), encode(&now)?))
    }

    /// Update one part of an instance entry.
    ///
    /// Creating the entry replaces it whole; emptying it removes it.
    fn change_instance(
        &mut self,
        path: &ObjectPath,
        part: &'static str,
        update: impl FnOnce(&mut InstanceData),
    ) -> DataResult<Vec<PatchOp>> {
        let base = path!("instance", path.as_str());
        let node = self.local_mut();
        let before = node.instance.get(path).cloned();
        let mut after = before.clone().unwrap_or_default();
        update(&mut after);

        if before.as_ref() == Some(&after) {
            return Ok(Vec::new());
        }
        if after.is_empty() {
            return Ok(match node.instance.remove(path) {
                Some(_) => vec![PatchOp::remove(base)],
                None => Vec::new(),
            });
        }

        let value = encode(&after)?;
        let op = if before.is_some() {
            let leaf = base.child(part);
            match value.get(part) {
                Some(v) => PatchOp::replace(leaf, v.clone()),
                None => PatchOp::remove(leaf),
            }
        } else {
            PatchOp::replace(base, value)
        };
        node.instance.insert(path.clone(), after);
        Ok(vec![op])
    }
}

fn removal(removed: bool, path: Path) -> Vec<PatchOp> {
    if removed {
        vec![PatchOp::remove(path)]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataConfig;
    use strata_core::{NodeData, Status};

    fn dataset() -> Dataset {
        Dataset::new("a".into(), &DataConfig::default())
    }

    fn svc(name: &str) -> ObjectPath {
        ObjectPath::parse(name).unwrap()
    }

    fn status(avail: Status) -> InstanceStatus {
        InstanceStatus {
            avail,
            updated_at: Utc::now(),
            ..Default::default()
        }
    }

    #[test]
    fn new_instance_is_replaced_whole() {
        let mut ds = dataset();
        ds.apply_local(LocalChange::SetInstanceStatus(svc("web"), status(Status::Up)))
            .unwrap();
        assert_eq!(ds.pending_ops.len(), 1);
        assert_eq!(ds.pending_ops[0].path(), &path!("instance", "web"));
        assert!(ds.local_node().unwrap().instance.contains_key("web"));
    }

    #[test]
    fn existing_instance_gets_leaf_replace() {
        let mut ds = dataset();
        ds.apply_local(LocalChange::SetInstanceStatus(svc("web"), status(Status::Up)))
            .unwrap();
        ds.apply_local(LocalChange::SetInstanceMonitor(svc("web"), InstanceMonitor::default()))
            .unwrap();
        assert_eq!(ds.pending_ops[1].path(), &path!("instance", "web", "monitor"));
    }

    #[test]
    fn unsetting_last_part_removes_instance() {
        let mut ds = dataset();
        ds.apply_local(LocalChange::SetInstanceStatus(svc("web"), status(Status::Up)))
            .unwrap();
        ds.apply_local(LocalChange::UnsetInstanceStatus(svc("web"))).unwrap();
        let last = ds.pending_ops.last().unwrap();
        assert!(last.is_remove());
        assert_eq!(last.path(), &path!("instance", "web"));
        assert!(ds.local_node().unwrap().instance.is_empty());
    }

    #[test]
    fn noop_changes_record_nothing() {
        let mut ds = dataset();
        ds.apply_local(LocalChange::UnsetInstanceStatus(svc("web"))).unwrap();
        ds.apply_local(LocalChange::UnsetNodeMonitor).unwrap();
        ds.apply_local(LocalChange::UnsetNodeFrozen).unwrap();
        assert!(ds.pending_ops.is_empty());
    }

    #[test]
    fn frozen_bumps_status_timestamp() {
        let mut ds = dataset();
        let before = ds.local_node().unwrap().status.updated_at;
        let at = Utc::now();
        ds.apply_local(LocalChange::SetNodeFrozen(at)).unwrap();
        let status = &ds.local_node().unwrap().status;
        assert_eq!(status.frozen_at, Some(at));
        assert!(status.updated_at >= before);
        assert_eq!(ds.pending_ops[0].path(), &path!("status", "frozen_at"));
        assert_eq!(ds.pending_ops[1].path(), &path!("status", "updated_at"));
    }

    #[test]
    fn recorded_ops_replay_onto_committed_copy() {
        let mut ds = dataset();
        let start = ds.local_node().unwrap().to_value().unwrap();
        ds.apply_local(LocalChange::SetInstanceStatus(svc("web"), status(Status::Up)))
            .unwrap();
        ds.apply_local(LocalChange::SetInstanceConfig(svc("web"), InstanceConfig::default()))
            .unwrap();
        ds.apply_local(LocalChange::SetSubsystemStatus(
            "listener".into(),
            SubsystemStatus::default(),
        ))
        .unwrap();
        ds.apply_local(LocalChange::SetNodeStats(NodeStats::default())).unwrap();
        ds.apply_local(LocalChange::UnsetInstanceStatus(svc("web"))).unwrap();

        let mut replica = start;
        strata_json_patch::apply(&mut replica, &ds.pending_ops).unwrap();
        assert_eq!(NodeData::from_value(replica).unwrap(), *ds.local_node().unwrap());
    }

    #[test]
    fn object_status_is_published_immediately() {
        let mut ds = dataset();
        let ev = ds
            .apply_local(LocalChange::SetObjectStatus(svc("web"), ObjectStatus::default()))
            .unwrap();
        assert!(matches!(ev, Some(ClusterEvent::ObjectStatus { change: Change::Updated(_), .. })));
        assert!(ds.pending_ops.is_empty());

        let ev = ds.apply_local(LocalChange::UnsetObjectStatus(svc("web"))).unwrap();
        assert!(ev.unwrap().is_deleted());
        assert!(ds.apply_local(LocalChange::UnsetObjectStatus(svc("web"))).unwrap().is_none());
    }
}
