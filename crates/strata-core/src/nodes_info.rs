//! Per-node labels and storage paths, the subset of the snapshot that
//! consumers need even when the daemon API is unavailable.

use crate::model::{ClusterSnapshot, StoragePath};
use crate::names::NodeName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Labels and storage paths of one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Storage paths
    #[serde(default)]
    pub paths: Vec<StoragePath>,
}

/// Node name → labels and paths
pub type NodesInfo = BTreeMap<NodeName, NodeInfo>;

impl ClusterSnapshot {
    /// Extract labels and paths of every known node
    pub fn nodes_info(&self) -> NodesInfo {
        self.node
            .iter()
            .map(|(name, data)| {
                let info = NodeInfo {
                    labels: data.status.labels.clone(),
                    paths: data.status.paths.clone(),
                };
                (name.clone(), info)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeData;

    #[test]
    fn extracts_labels_and_paths() {
        let mut snap = ClusterSnapshot::default();
        let mut data = NodeData::default();
        data.status.labels.insert("rack".into(), "r2".into());
        data.status.paths.push(StoragePath {
            initiator: "iqn.a".into(),
            target: "iqn.t".into(),
        });
        snap.node.insert("a".into(), data);
        snap.node.insert("b".into(), NodeData::default());

        let info = snap.nodes_info();
        assert_eq!(info.len(), 2);
        assert_eq!(info["a"].labels["rack"], "r2");
        assert_eq!(info["a"].paths.len(), 1);
        assert!(info["b"].labels.is_empty());
    }
}
