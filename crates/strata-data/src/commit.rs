//! Commit pipeline.
//!
//! A commit, in order:
//!
//! 1. merges staged peer copies into pending and advances the local row;
//! 2. when local operations are pending, bumps the local generation, stamps
//!    the local status with the local row and files the operations under the
//!    new generation (or drops them when no peer needs patches);
//! 3. prunes queue entries every peer already acknowledged;
//! 4. compares previous and pending for every touched node and moves
//!    previous forward;
//! 5. reports a new nodes info when it changed.

use crate::dataset::Dataset;
use crate::publish;
use std::mem;
use strata_core::{ClusterEvent, Generation, NodesInfo};
use strata_json_patch::{path, PatchOp};

/// Outcome of a commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    /// Local generation after the commit
    pub generation: Generation,
    /// Whether local operations were committed under a new generation
    pub advanced: bool,
    /// Events to publish, in node order
    pub events: Vec<ClusterEvent>,
    /// New nodes info to persist, when it changed
    pub nodes_info: Option<NodesInfo>,
}

impl Dataset {
    pub(crate) fn commit(&mut self) -> CommitReport {
        self.merge_inbound();
        let advanced = self.commit_local();
        self.prune_queue();
        let events = self.publish_touched();

        let info = self.pending.nodes_info();
        let nodes_info = if info != self.nodes_info {
            self.nodes_info = info.clone();
            Some(info)
        } else {
            None
        };

        self.stats.events += events.len() as u64;
        self.stats.generation = self.generation();
        self.stats.queue_len = self.queue.len();

        CommitReport {
            generation: self.generation(),
            advanced,
            events,
            nodes_info,
        }
    }

    fn merge_inbound(&mut self) {
        for (peer, staged) in self.inbound.iter_mut().filter(|(_, s)| s.dirty) {
            staged.dirty = false;
            if let Some(data) = &staged.data {
                self.pending.node.insert(peer.clone(), data.clone());
            }
            if !staged.applied.is_unknown() {
                self.matrix.set(peer, &self.local, staged.applied);
            }
            self.touched.insert(peer.clone());
        }
    }

    fn commit_local(&mut self) -> bool {
        if self.pending_ops.is_empty() {
            return false;
        }

        let generation = self.generation().next();
        self.matrix.set(&self.local, &self.local, generation);
        let row = self.matrix.row(&self.local).cloned().unwrap_or_default();

        let mut ops = mem::take(&mut self.pending_ops);
        match serde_json::to_value(&row) {
            Ok(value) => ops.push(PatchOp::replace(path!("status", "gen"), value)),
            Err(e) => tracing::warn!(error = %e, "cannot encode generation row"),
        }
        self.local_mut().status.gen = row;
        self.committed_local = self.local_mut().clone();

        let kind = self.message_kind();
        if kind.retains_patches() {
            self.queue.insert(generation, ops);
        } else {
            tracing::trace!(gen = %generation, ops = ops.len(), "no peer needs patches, dropped");
        }
        self.stats.commits += 1;
        tracing::debug!(gen = %generation, mode = %kind, "committed");
        true
    }

    /// Drop entries at or below the lowest generation every peer reported
    fn prune_queue(&mut self) {
        match self.matrix.low_water_mark(&self.local) {
            Some(mark) => {
                self.queue = self.queue.split_off(&mark.next());
            }
            None => self.queue.clear(),
        }
    }

    fn publish_touched(&mut self) -> Vec<ClusterEvent> {
        let mut events = Vec::new();
        for node in mem::take(&mut self.touched) {
            events.extend(publish::node_events(
                &node,
                self.previous.node.get(&node),
                self.pending.node.get(&node),
            ));
            match self.pending.node.get(&node) {
                Some(data) => {
                    self.previous.node.insert(node, data.clone());
                }
                None => {
                    self.previous.node.remove(&node);
                }
            }
        }
        self.previous.cluster = self.pending.cluster.clone();
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataConfig;
    use crate::local::LocalChange;
    use chrono::Utc;
    use strata_core::{
        FullMessage, HeartbeatMessage, InstanceStatus, NodeData, NodeMonitor, NodeName,
        ObjectPath, PatchMessage, Status,
    };

    fn n(name: &str) -> NodeName {
        NodeName::from(name)
    }

    fn dataset() -> Dataset {
        Dataset::new(n("a"), &DataConfig::default())
    }

    fn monitor() -> LocalChange {
        LocalChange::SetNodeMonitor(NodeMonitor {
            updated_at: Utc::now(),
            ..Default::default()
        })
    }

    fn full_from(peer: &str, gen: u64, row: &[(&str, u64)]) -> FullMessage {
        FullMessage {
            nodename: n(peer),
            compat: strata_core::DATA_COMPAT,
            generation_matrix_row: row
                .iter()
                .map(|(name, g)| (n(name), Generation::new(*g)))
                .chain(std::iter::once((n(peer), Generation::new(gen))))
                .collect(),
            updated_at: Utc::now(),
            snapshot: NodeData::default(),
        }
    }

    #[test]
    fn each_commit_with_changes_advances_by_one() {
        let mut ds = dataset();
        for expected in 2..=5 {
            ds.apply_local(monitor()).unwrap();
            let report = ds.commit();
            assert!(report.advanced);
            assert_eq!(report.generation, Generation::new(expected));
        }
        // nothing pending: no bump
        assert!(!ds.commit().advanced);
        assert_eq!(ds.generation(), Generation::new(5));
    }

    #[test]
    fn local_status_tracks_local_counter() {
        let mut ds = dataset();
        ds.apply_local(monitor()).unwrap();
        ds.commit();
        let status = &ds.local_node().unwrap().status;
        assert_eq!(status.gen.get(&n("a")), ds.generation());
        assert_eq!(ds.committed_local, *ds.local_node().unwrap());
    }

    #[test]
    fn ping_mode_discards_ops() {
        let mut ds = dataset();
        ds.apply_local(monitor()).unwrap();
        ds.commit();
        assert!(ds.queue.is_empty());
    }

    #[test]
    fn queue_is_retained_until_every_peer_acknowledges() {
        let mut ds = dataset();
        // b has a's generation 1 and a has absorbed b
        ds.apply_full(full_from("b", 7, &[("a", 1)])).unwrap();
        ds.commit();
        ds.apply_local(monitor()).unwrap();
        ds.commit();
        ds.apply_local(monitor()).unwrap();
        ds.commit();
        assert_eq!(
            ds.queue.keys().copied().collect::<Vec<_>>(),
            vec![Generation::new(2), Generation::new(3)]
        );

        // b acknowledges generation 2
        ds.ingest(HeartbeatMessage::Patch(PatchMessage {
            nodename: n("b"),
            compat: strata_core::DATA_COMPAT,
            generation_matrix_row: [(n("b"), Generation::new(7)), (n("a"), Generation::new(2))]
                .into_iter()
                .collect(),
            updated_at: Utc::now(),
            deltas: Default::default(),
        }))
        .unwrap();
        ds.commit();
        assert_eq!(ds.queue.keys().copied().collect::<Vec<_>>(), vec![Generation::new(3)]);
    }

    #[test]
    fn full_is_visible_only_after_commit() {
        let mut ds = dataset();
        ds.apply_full(full_from("b", 20, &[])).unwrap();
        assert!(ds.node_data(&n("b")).is_none());

        let report = ds.commit();
        assert_eq!(ds.node_data(&n("b")), Some(NodeData::default()));
        assert_eq!(ds.matrix.get(&n("b"), &n("a")), Generation::new(20));
        assert!(report.events.iter().any(|e| e.node() == Some(&n("b"))));
    }

    #[test]
    fn first_commit_publishes_local_node() {
        let mut ds = dataset();
        let report = ds.commit();
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].name(), "NodeStatusUpdated");
        assert!(report.nodes_info.is_some());
        assert!(ds.commit().nodes_info.is_none());
    }

    #[test]
    fn removed_instance_publishes_deleted_once() {
        let mut ds = dataset();
        let web = ObjectPath::parse("web").unwrap();
        ds.apply_local(LocalChange::SetInstanceStatus(
            web.clone(),
            InstanceStatus {
                avail: Status::Up,
                updated_at: Utc::now(),
                ..Default::default()
            },
        ))
        .unwrap();
        ds.commit();
        ds.apply_local(LocalChange::UnsetInstanceStatus(web)).unwrap();
        let report = ds.commit();
        let deleted: Vec<_> = report.events.iter().filter(|e| e.is_deleted()).collect();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].name(), "InstanceStatusDeleted");
    }

    #[test]
    fn dropped_peer_is_deleted_at_commit() {
        let mut ds = dataset();
        ds.apply_full(full_from("b", 3, &[])).unwrap();
        ds.commit();
        ds.drop_peer(&n("b"));
        let report = ds.commit();
        assert!(report.events.iter().all(|e| e.is_deleted()));
        assert!(report.events.iter().any(|e| e.name() == "NodeStatusDeleted"));
        assert!(!ds.previous.node.contains_key("b"));
    }
}
