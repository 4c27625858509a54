//! Heartbeat wire messages.
//!
//! Messages are JSON objects tagged by `kind`:
//!
//! - `full`: the sender's whole node sub-tree
//! - `patch`: generation-keyed delta lists not yet acknowledged by every peer
//! - `ping`: liveness and the sender's generation row only
//!
//! Every kind carries `generationMatrixRow`, the sender's own row of the
//! generation matrix, which is how receivers learn what the sender absorbed.

use crate::error::{CoreError, CoreResult};
use crate::generation::{Generation, GenerationRow};
use crate::mode::MessageKind;
use crate::model::NodeData;
use crate::names::NodeName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strata_json_patch::PatchOp;

/// Generation-keyed delta lists
pub type Deltas = BTreeMap<Generation, Vec<PatchOp>>;

/// Full snapshot of the sender's node sub-tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullMessage {
    /// Sender
    pub nodename: NodeName,
    /// Sender's data protocol compatibility level
    pub compat: u64,
    /// Sender's generation row
    pub generation_matrix_row: GenerationRow,
    /// Emission time
    pub updated_at: DateTime<Utc>,
    /// Sender's node sub-tree
    pub snapshot: NodeData,
}

/// Incremental deltas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchMessage {
    /// Sender
    pub nodename: NodeName,
    /// Sender's data protocol compatibility level
    pub compat: u64,
    /// Sender's generation row
    pub generation_matrix_row: GenerationRow,
    /// Emission time
    pub updated_at: DateTime<Utc>,
    /// Committed operations keyed by the generation that produced them
    #[serde(default)]
    pub deltas: Deltas,
}

/// Liveness only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingMessage {
    /// Sender
    pub nodename: NodeName,
    /// Sender's generation row
    pub generation_matrix_row: GenerationRow,
}

/// One heartbeat payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HeartbeatMessage {
    /// Full snapshot
    Full(FullMessage),
    /// Incremental deltas
    Patch(PatchMessage),
    /// Liveness only
    Ping(PingMessage),
}

impl HeartbeatMessage {
    /// Message kind
    pub fn kind(&self) -> MessageKind {
        match self {
            HeartbeatMessage::Full(_) => MessageKind::Full,
            HeartbeatMessage::Patch(_) => MessageKind::Patch,
            HeartbeatMessage::Ping(_) => MessageKind::Ping,
        }
    }

    /// Sender name
    pub fn nodename(&self) -> &NodeName {
        match self {
            HeartbeatMessage::Full(m) => &m.nodename,
            HeartbeatMessage::Patch(m) => &m.nodename,
            HeartbeatMessage::Ping(m) => &m.nodename,
        }
    }

    /// Sender's generation row
    pub fn generation_row(&self) -> &GenerationRow {
        match self {
            HeartbeatMessage::Full(m) => &m.generation_matrix_row,
            HeartbeatMessage::Patch(m) => &m.generation_matrix_row,
            HeartbeatMessage::Ping(m) => &m.generation_matrix_row,
        }
    }

    /// Sender's own generation, as it reported it
    pub fn sender_generation(&self) -> Generation {
        self.generation_row().get(self.nodename())
    }

    /// Encode to the JSON wire form
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CoreError::encode(e.to_string()))
    }

    /// Decode from the JSON wire form
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_json_patch::path;

    fn row(entries: &[(&str, u64)]) -> GenerationRow {
        entries
            .iter()
            .map(|(n, g)| (NodeName::from(*n), Generation::new(*g)))
            .collect()
    }

    #[test]
    fn ping_wire_shape() {
        let msg = HeartbeatMessage::Ping(PingMessage {
            nodename: "a".into(),
            generation_matrix_row: row(&[("a", 3), ("b", 0)]),
        });
        let json: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "kind": "ping",
                "nodename": "a",
                "generationMatrixRow": {"a": 3, "b": 0}
            })
        );
    }

    #[test]
    fn patch_deltas_keep_generation_keys() {
        let mut deltas = Deltas::new();
        deltas.insert(
            Generation::new(21),
            vec![PatchOp::replace(path!["status", "agent"], serde_json::json!("2"))],
        );
        deltas.insert(Generation::new(22), vec![PatchOp::remove(path!["monitor"])]);
        let msg = HeartbeatMessage::Patch(PatchMessage {
            nodename: "b".into(),
            compat: 12,
            generation_matrix_row: row(&[("b", 22)]),
            updated_at: Utc::now(),
            deltas,
        });

        let bytes = msg.encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["kind"], "patch");
        assert_eq!(json["deltas"]["21"][0], serde_json::json!([["status", "agent"], "2"]));
        assert_eq!(json["deltas"]["22"][0], serde_json::json!([["monitor"]]));

        let back = HeartbeatMessage::decode(&bytes).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.kind(), MessageKind::Patch);
        assert_eq!(back.sender_generation(), Generation::new(22));
    }

    #[test]
    fn full_carries_snapshot() {
        let mut snapshot = NodeData::default();
        snapshot.status.agent = "3".into();
        let msg = HeartbeatMessage::Full(FullMessage {
            nodename: "b".into(),
            compat: 12,
            generation_matrix_row: row(&[("b", 20)]),
            updated_at: Utc::now(),
            snapshot,
        });
        let back = HeartbeatMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            HeartbeatMessage::decode(b"{\"kind\":\"bogus\"}"),
            Err(CoreError::Decode { .. })
        ));
        assert!(matches!(HeartbeatMessage::decode(b"\x00"), Err(CoreError::Decode { .. })));
    }
}
