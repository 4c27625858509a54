//! # Strata Core - Cluster Data Model and Anti-Entropy Primitives
//!
//! Foundation types shared by the data actor and its consumers:
//!
//! - **Names**: node names and object paths
//! - **Generations**: per-node counters and the owner × observer matrix
//! - **Mode selection**: choosing Full, Patch or Ping for the next heartbeat
//! - **Model**: the typed cluster snapshot and per-entity payloads
//! - **Messages**: heartbeat wire format
//! - **Events**: typed per-entity change notifications
//!
//! ## Design Principles
//!
//! - **Typed directionality**: the generation matrix is addressed by
//!   `(owner, observer)`, never by a bare nested map
//! - **Last writer wins by generation**: no semantic merge of peer data
//! - **Self-healing**: every failure path degrades to a full resync

#![forbid(unsafe_code)]

pub mod error;
pub mod event;
pub mod generation;
pub mod message;
pub mod mode;
pub mod model;
pub mod names;
pub mod nodes_info;

pub use error::{CoreError, CoreResult};
pub use event::{Change, ClusterEvent};
pub use generation::{Generation, GenerationMatrix, GenerationRow};
pub use message::{Deltas, FullMessage, HeartbeatMessage, PatchMessage, PingMessage};
pub use mode::{select_message_kind, MessageKind};
pub use model::{
    ClusterSection, ClusterSnapshot, InstanceConfig, InstanceData, InstanceMonitor,
    InstanceStatus, NodeConfig, NodeData, NodeMonitor, NodeMonitorState, NodeStats, NodeStatus,
    ObjectStatus, Provisioned, ResourceStatus, Status, StoragePath, SubsystemStatus, Timestamped,
    Topology,
};
pub use names::{NodeName, ObjectKind, ObjectPath};
pub use nodes_info::{NodeInfo, NodesInfo};

/// Data protocol compatibility level advertised in heartbeats
pub const DATA_COMPAT: u64 = 12;
