//! The dataset owned by the data actor.
//!
//! Everything here is synchronous and single-owner; the actor serializes
//! access. Behaviour is split across modules by concern:
//!
//! - `local`: typed local mutations and their patch operations
//! - `peer`: inbound Full/Patch/Ping handling
//! - `commit`: generation bump, queue retention, publication
//! - `heartbeat`: outgoing message construction

use crate::config::DataConfig;
use crate::stats::CallStats;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use strata_core::{
    select_message_kind, ClusterSnapshot, Deltas, Generation, GenerationMatrix, MessageKind,
    NodeData, NodeName, NodeStatus, NodesInfo, ObjectPath,
};
use strata_json_patch::PatchOp;

/// Staged copy of a peer's sub-tree, merged into pending at commit
#[derive(Debug, Clone, Default)]
pub(crate) struct InboundPeer {
    /// Last generation applied to `data`; zero when a Full is needed
    pub applied: Generation,
    /// Peer sub-tree as of `applied`
    pub data: Option<NodeData>,
    /// Changed since the last commit
    pub dirty: bool,
}

/// Replicated dataset plus the bookkeeping of the anti-entropy protocol
#[derive(Debug)]
pub(crate) struct Dataset {
    pub(crate) local: NodeName,
    pub(crate) compat: u64,
    /// Working copy serving reads
    pub(crate) pending: ClusterSnapshot,
    /// Baseline as of the last commit, used for publication
    pub(crate) previous: ClusterSnapshot,
    /// Local sub-tree as of the current local generation
    pub(crate) committed_local: NodeData,
    pub(crate) matrix: GenerationMatrix,
    /// Local operations since the last commit
    pub(crate) pending_ops: Vec<PatchOp>,
    /// Committed local operations not yet acknowledged by every peer
    pub(crate) queue: Deltas,
    pub(crate) inbound: BTreeMap<NodeName, InboundPeer>,
    /// Nodes whose sub-tree must be compared at the next commit
    pub(crate) touched: BTreeSet<NodeName>,
    /// Last nodes info handed to the cache file
    pub(crate) nodes_info: NodesInfo,
    pub(crate) stats: CallStats,
}

impl Dataset {
    /// Fresh dataset with the local node registered at generation 1
    pub(crate) fn new(local: NodeName, config: &DataConfig) -> Self {
        let mut matrix = GenerationMatrix::new();
        matrix.set(&local, &local, Generation::INITIAL);

        let status = NodeStatus {
            agent: config.agent.clone(),
            compat: config.compat,
            gen: matrix.row(&local).cloned().unwrap_or_default(),
            updated_at: Utc::now(),
            ..Default::default()
        };
        let node = NodeData {
            status,
            ..Default::default()
        };

        let mut pending = ClusterSnapshot::default();
        pending.node.insert(local.clone(), node.clone());

        let mut touched = BTreeSet::new();
        touched.insert(local.clone());

        Self {
            compat: config.compat,
            pending,
            previous: ClusterSnapshot::default(),
            committed_local: node,
            matrix,
            pending_ops: Vec::new(),
            queue: Deltas::new(),
            inbound: BTreeMap::new(),
            touched,
            nodes_info: NodesInfo::new(),
            stats: CallStats::default(),
            local,
        }
    }

    /// Current local generation
    pub(crate) fn generation(&self) -> Generation {
        self.matrix.get(&self.local, &self.local)
    }

    /// Kind of the next outgoing heartbeat
    pub(crate) fn message_kind(&self) -> MessageKind {
        select_message_kind(&self.matrix, &self.local)
    }

    #[cfg(test)]
    pub(crate) fn local_node(&self) -> Option<&NodeData> {
        self.pending.node.get(&self.local)
    }

    pub(crate) fn local_mut(&mut self) -> &mut NodeData {
        self.pending.node.entry(self.local.clone()).or_default()
    }

    pub(crate) fn node_data(&self, node: &NodeName) -> Option<NodeData> {
        self.pending.node.get(node).cloned()
    }

    pub(crate) fn node_status(&self, node: &NodeName) -> Option<NodeStatus> {
        self.pending.node.get(node).map(|data| data.status.clone())
    }

    pub(crate) fn service_names(&self) -> Vec<ObjectPath> {
        self.pending.object_paths()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_generation_one_with_self_registered() {
        let ds = Dataset::new("a".into(), &DataConfig::default());
        assert_eq!(ds.generation(), Generation::INITIAL);
        let local = ds.local_node().unwrap();
        assert_eq!(local.status.gen.get(&"a".into()), Generation::INITIAL);
        assert!(ds.previous.node.is_empty());
        assert_eq!(ds.message_kind(), MessageKind::Ping);
    }
}
