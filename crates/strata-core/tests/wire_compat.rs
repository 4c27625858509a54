//! Wire Compatibility Tests
//!
//! Decodes hand-written heartbeat documents the way a peer would emit them
//! and replays their deltas onto a node sub-tree.

use strata_core::{CoreError, Generation, HeartbeatMessage, MessageKind, NodeData, NodeName};

const PATCH: &str = r#"{
    "kind": "patch",
    "nodename": "n2",
    "compat": 12,
    "generationMatrixRow": {"n1": 4, "n2": "9"},
    "updatedAt": "2026-01-02T03:04:05Z",
    "deltas": {
        "9": [
            [["status", "labels", "az"], "eu-1"],
            [["monitor"]]
        ]
    }
}"#;

const FULL: &str = r#"{
    "kind": "full",
    "nodename": "n3",
    "compat": 12,
    "generationMatrixRow": {"n3": 2},
    "updatedAt": "2026-01-02T03:04:05Z",
    "snapshot": {
        "status": {
            "agent": "1.0.0",
            "api": 8,
            "compat": 12,
            "gen": {"n3": 2},
            "updated_at": "2026-01-02T03:04:00Z"
        },
        "instance": {}
    }
}"#;

#[test]
fn patch_document_decodes_with_string_generations() {
    let message = HeartbeatMessage::decode(PATCH.as_bytes()).unwrap();
    assert_eq!(message.kind(), MessageKind::Patch);
    assert_eq!(message.nodename(), &NodeName::from("n2"));
    assert_eq!(message.sender_generation(), Generation::new(9));
    assert_eq!(message.generation_row().get(&NodeName::from("n1")), Generation::new(4));
}

#[test]
fn patch_deltas_replay_onto_node_data() {
    let HeartbeatMessage::Patch(patch) = HeartbeatMessage::decode(PATCH.as_bytes()).unwrap() else {
        panic!("expected a patch");
    };
    let mut tree = NodeData::default().to_value().unwrap();
    for ops in patch.deltas.values() {
        strata_json_patch::apply(&mut tree, ops).unwrap();
    }
    let data = NodeData::from_value(tree).unwrap();
    assert_eq!(data.status.labels.get("az").map(String::as_str), Some("eu-1"));
    assert!(data.monitor.is_none());
}

#[test]
fn full_document_decodes_with_defaults() {
    let HeartbeatMessage::Full(full) = HeartbeatMessage::decode(FULL.as_bytes()).unwrap() else {
        panic!("expected a full");
    };
    assert_eq!(full.snapshot.status.agent, "1.0.0");
    assert_eq!(full.snapshot.status.gen.get(&NodeName::from("n3")), Generation::new(2));
    assert!(full.snapshot.daemon.is_empty());
    assert!(full.snapshot.config.is_none());
}

#[test]
fn unknown_kind_and_bad_generation_are_rejected() {
    let bogus = PATCH.replace("\"patch\"", "\"gossip\"");
    assert!(matches!(
        HeartbeatMessage::decode(bogus.as_bytes()),
        Err(CoreError::Decode { .. })
    ));

    let negative = PATCH.replace("\"n1\": 4", "\"n1\": -4");
    assert!(matches!(
        HeartbeatMessage::decode(negative.as_bytes()),
        Err(CoreError::Decode { .. })
    ));
}
