//! Heartbeat transport seam.
//!
//! The runtime only needs opaque payloads delivered per peer, in order, best
//! effort. [`MemoryNetwork`] is the in-process implementation used by the
//! simulation command and the multi-node tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use strata_core::NodeName;
use tokio::sync::{mpsc, Mutex, RwLock};

/// Transport failures. None of them is fatal to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No route to the peer
    #[error("peer {0} is unreachable")]
    Unreachable(NodeName),

    /// The local endpoint was closed
    #[error("transport closed")]
    Closed,
}

/// One received payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Sender as known by the transport
    pub from: NodeName,
    /// Encoded heartbeat
    pub payload: Vec<u8>,
}

/// Payload delivery between cluster nodes
#[async_trait]
pub trait Transport: Send + Sync {
    /// Queue a payload for one peer
    async fn send(&self, peer: &NodeName, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Next payload, `Ok(None)` when nothing arrived within `timeout`
    async fn receive(&self, timeout: Duration) -> Result<Option<Inbound>, TransportError>;

    /// Transport type identifier
    fn transport_type(&self) -> &'static str;
}

#[derive(Debug, Default)]
struct NetworkState {
    endpoints: BTreeMap<NodeName, mpsc::UnboundedSender<Inbound>>,
    /// Directed links currently dropping traffic
    cut: BTreeSet<(NodeName, NodeName)>,
}

/// In-process network connecting [`MemoryTransport`] endpoints
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<RwLock<NetworkState>>,
}

impl MemoryNetwork {
    /// Empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `node`. Attaching a name again replaces the previous endpoint,
    /// which then stops receiving; this is how a restart looks on the wire.
    pub async fn endpoint(&self, node: NodeName) -> MemoryTransport {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.state.write().await.endpoints.insert(node.clone(), sender);
        MemoryTransport {
            node,
            network: self.clone(),
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Detach `node`; traffic to it is dropped
    pub async fn detach(&self, node: &NodeName) {
        self.state.write().await.endpoints.remove(node);
    }

    /// Drop or restore traffic in both directions between two nodes
    pub async fn set_link(&self, a: &NodeName, b: &NodeName, up: bool) {
        let mut state = self.state.write().await;
        for link in [(a.clone(), b.clone()), (b.clone(), a.clone())] {
            if up {
                state.cut.remove(&link);
            } else {
                state.cut.insert(link);
            }
        }
    }

    /// Attached node names
    pub async fn nodes(&self) -> Vec<NodeName> {
        self.state.read().await.endpoints.keys().cloned().collect()
    }

    async fn deliver(
        &self,
        from: &NodeName,
        to: &NodeName,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let state = self.state.read().await;
        if state.cut.contains(&(from.clone(), to.clone())) {
            tracing::trace!(from = %from, to = %to, "link down, payload dropped");
            return Ok(());
        }
        let sender = state
            .endpoints
            .get(to)
            .ok_or_else(|| TransportError::Unreachable(to.clone()))?;
        sender
            .send(Inbound {
                from: from.clone(),
                payload,
            })
            .map_err(|_| TransportError::Unreachable(to.clone()))
    }
}

/// One node's endpoint on a [`MemoryNetwork`]
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    node: NodeName,
    network: MemoryNetwork,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Inbound>>>,
}

impl MemoryTransport {
    /// Node this endpoint belongs to
    pub fn node(&self) -> &NodeName {
        &self.node
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, peer: &NodeName, payload: Vec<u8>) -> Result<(), TransportError> {
        self.network.deliver(&self.node, peer, payload).await
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<Inbound>, TransportError> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(inbound)) => Ok(Some(inbound)),
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Ok(None),
        }
    }

    fn transport_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn n(name: &str) -> NodeName {
        NodeName::from(name)
    }

    const WAIT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn delivers_in_order_with_sender() {
        let network = MemoryNetwork::new();
        let a = network.endpoint(n("a")).await;
        let b = network.endpoint(n("b")).await;

        a.send(&n("b"), b"one".to_vec()).await.unwrap();
        a.send(&n("b"), b"two".to_vec()).await.unwrap();

        let first = b.receive(WAIT).await.unwrap().unwrap();
        assert_eq!(first.from, n("a"));
        assert_eq!(first.payload, b"one");
        assert_eq!(b.receive(WAIT).await.unwrap().unwrap().payload, b"two");
        assert_eq!(b.receive(Duration::from_millis(10)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_peer_is_unreachable() {
        let network = MemoryNetwork::new();
        let a = network.endpoint(n("a")).await;
        assert_matches!(
            a.send(&n("z"), vec![]).await,
            Err(TransportError::Unreachable(peer)) if peer == n("z")
        );
    }

    #[tokio::test]
    async fn cut_link_drops_traffic_until_restored() {
        let network = MemoryNetwork::new();
        let a = network.endpoint(n("a")).await;
        let b = network.endpoint(n("b")).await;

        network.set_link(&n("a"), &n("b"), false).await;
        a.send(&n("b"), b"lost".to_vec()).await.unwrap();
        assert_eq!(b.receive(Duration::from_millis(10)).await.unwrap(), None);

        network.set_link(&n("a"), &n("b"), true).await;
        a.send(&n("b"), b"kept".to_vec()).await.unwrap();
        assert_eq!(b.receive(WAIT).await.unwrap().unwrap().payload, b"kept");
    }

    #[tokio::test]
    async fn reattached_endpoint_replaces_the_old_one() {
        let network = MemoryNetwork::new();
        let a = network.endpoint(n("a")).await;
        let old_b = network.endpoint(n("b")).await;
        let new_b = network.endpoint(n("b")).await;

        a.send(&n("b"), b"hello".to_vec()).await.unwrap();
        assert_eq!(new_b.receive(WAIT).await.unwrap().unwrap().payload, b"hello");
        assert_matches!(old_b.receive(WAIT).await, Err(TransportError::Closed));
        assert_eq!(network.nodes().await, vec![n("a"), n("b")]);
    }
}
