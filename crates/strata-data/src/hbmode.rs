//! Heartbeat mode cache.
//!
//! A second worker, independent from the data actor, remembering the kind of
//! the last outgoing heartbeat and the kind last received from every peer.
//! Consumers use it to gate behaviour on replication progress, for example
//! waiting until every peer talks Patch.

use crate::error::{DataError, DataResult};
use std::collections::BTreeMap;
use std::time::Duration;
use strata_core::{MessageKind, NodeName};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Snapshot of the cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatModes {
    /// Kind of the last outgoing heartbeat
    pub local: MessageKind,
    /// Kind last received from each peer
    pub peers: BTreeMap<NodeName, MessageKind>,
}

impl HeartbeatModes {
    /// Whether every listed peer last sent `kind`; unknown peers never match
    pub fn all_peers_in(&self, peers: &[NodeName], kind: MessageKind) -> bool {
        peers.iter().all(|p| self.peers.get(p) == Some(&kind))
    }
}

enum HbModeCmd {
    SetLocal(MessageKind),
    SetPeer(NodeName, MessageKind),
    DropPeer(NodeName),
    Get {
        resp: oneshot::Sender<HeartbeatModes>,
    },
}

/// Handle to the heartbeat mode cache worker
#[derive(Debug, Clone)]
pub struct HbModeHandle {
    tx: mpsc::Sender<HbModeCmd>,
    timeout: Duration,
}

impl std::fmt::Debug for HbModeCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HbModeCmd::SetLocal(kind) => write!(f, "SetLocal({kind})"),
            HbModeCmd::SetPeer(peer, kind) => write!(f, "SetPeer({peer}, {kind})"),
            HbModeCmd::DropPeer(peer) => write!(f, "DropPeer({peer})"),
            HbModeCmd::Get { .. } => f.write_str("Get"),
        }
    }
}

impl HbModeHandle {
    /// Start the worker. It stops when every handle is dropped.
    pub fn spawn(queue_size: usize, timeout: Duration) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(queue_size.max(1));
        let task = tokio::spawn(async move {
            let mut modes = HeartbeatModes::default();
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    HbModeCmd::SetLocal(kind) => {
                        if modes.local != kind {
                            tracing::debug!(mode = %kind, "outgoing heartbeat mode changed");
                        }
                        modes.local = kind;
                    }
                    HbModeCmd::SetPeer(peer, kind) => {
                        modes.peers.insert(peer, kind);
                    }
                    HbModeCmd::DropPeer(peer) => {
                        modes.peers.remove(&peer);
                    }
                    HbModeCmd::Get { resp } => {
                        let _ = resp.send(modes.clone());
                    }
                }
            }
            tracing::debug!("heartbeat mode cache stopped");
        });
        (Self { tx, timeout }, task)
    }

    /// Record the kind of the last outgoing heartbeat.
    ///
    /// Updates never wait: when the queue is full the update is lost.
    pub fn set_local(&self, kind: MessageKind) {
        self.push(HbModeCmd::SetLocal(kind));
    }

    /// Record the kind last received from `peer`
    pub fn set_peer(&self, peer: NodeName, kind: MessageKind) {
        self.push(HbModeCmd::SetPeer(peer, kind));
    }

    /// Forget `peer`
    pub fn drop_peer(&self, peer: NodeName) {
        self.push(HbModeCmd::DropPeer(peer));
    }

    /// Current cache content
    pub async fn get(&self) -> DataResult<HeartbeatModes> {
        let (resp, rx) = oneshot::channel();
        let request = async {
            self.tx
                .send(HbModeCmd::Get { resp })
                .await
                .map_err(|_| DataError::Closed)?;
            rx.await.map_err(|_| DataError::Dropped { operation: "hbmode_get" })
        };
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| DataError::Timeout {
                operation: "hbmode_get",
                timeout: self.timeout,
            })?
    }

    /// Whether every listed peer last sent `kind`
    pub async fn peers_in(&self, peers: &[NodeName], kind: MessageKind) -> DataResult<bool> {
        Ok(self.get().await?.all_peers_in(peers, kind))
    }

    fn push(&self, cmd: HbModeCmd) {
        match self.tx.try_send(cmd) {
            Ok(()) => {}
            Err(TrySendError::Full(cmd)) => {
                tracing::warn!(cmd = ?cmd, "heartbeat mode cache busy, update lost");
            }
            Err(TrySendError::Closed(cmd)) => {
                tracing::debug!(cmd = ?cmd, "heartbeat mode cache stopped, update lost");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(name: &str) -> NodeName {
        NodeName::from(name)
    }

    #[tokio::test]
    async fn tracks_local_and_peer_modes() {
        let (hb, _task) = HbModeHandle::spawn(8, Duration::from_secs(1));
        hb.set_local(MessageKind::Full);
        hb.set_peer(n("b"), MessageKind::Patch);
        hb.set_peer(n("c"), MessageKind::Full);

        let modes = hb.get().await.unwrap();
        assert_eq!(modes.local, MessageKind::Full);
        assert!(hb.peers_in(&[n("b")], MessageKind::Patch).await.unwrap());
        assert!(!hb.peers_in(&[n("b"), n("c")], MessageKind::Patch).await.unwrap());

        hb.set_peer(n("c"), MessageKind::Patch);
        assert!(hb.peers_in(&[n("b"), n("c")], MessageKind::Patch).await.unwrap());

        hb.drop_peer(n("c"));
        assert!(!hb.peers_in(&[n("c")], MessageKind::Patch).await.unwrap());
    }

    #[tokio::test]
    async fn full_queue_drops_updates_without_waiting() {
        // the worker never runs before the updates are pushed
        let (hb, _task) = HbModeHandle::spawn(1, Duration::from_secs(1));
        hb.set_peer(n("b"), MessageKind::Full);
        hb.set_peer(n("b"), MessageKind::Patch);
        hb.set_peer(n("c"), MessageKind::Patch);

        let modes = hb.get().await.unwrap();
        assert_eq!(modes.peers.get(&n("b")), Some(&MessageKind::Full));
        assert!(!modes.peers.contains_key(&n("c")));
    }

    #[tokio::test]
    async fn worker_stops_with_last_handle() {
        let (hb, task) = HbModeHandle::spawn(8, Duration::from_secs(1));
        drop(hb);
        task.await.unwrap();
    }
}
