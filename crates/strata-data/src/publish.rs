//! Diff publication and the event bus.
//!
//! At commit, every touched node is compared between the previous and the
//! pending snapshot at known sub-paths. Comparison is by `updated_at` only:
//! an entity whose timestamp did not move is considered unchanged.

use std::collections::BTreeSet;
use strata_core::{Change, ClusterEvent, NodeData, NodeName, Timestamped};
use tokio::sync::broadcast;

/// Compare one entity between two snapshots
fn compare<T: Timestamped + Clone>(previous: Option<&T>, pending: Option<&T>) -> Option<Change<T>> {
    match (previous, pending) {
        (Some(p), Some(n)) if p.updated_at() == n.updated_at() => None,
        (_, Some(n)) => Some(Change::Updated(n.clone())),
        (Some(_), None) => Some(Change::Deleted),
        (None, None) => None,
    }
}

/// Events describing how `node` changed between two snapshots
pub(crate) fn node_events(
    node: &NodeName,
    previous: Option<&NodeData>,
    pending: Option<&NodeData>,
) -> Vec<ClusterEvent> {
    let mut events = Vec::new();

    if let Some(change) = compare(
        previous.and_then(|d| d.config.as_ref()),
        pending.and_then(|d| d.config.as_ref()),
    ) {
        events.push(ClusterEvent::NodeConfig { node: node.clone(), change });
    }
    if let Some(change) = compare(previous.map(|d| &d.status), pending.map(|d| &d.status)) {
        events.push(ClusterEvent::NodeStatus { node: node.clone(), change });
    }
    if let Some(change) = compare(
        previous.and_then(|d| d.monitor.as_ref()),
        pending.and_then(|d| d.monitor.as_ref()),
    ) {
        events.push(ClusterEvent::NodeMonitor { node: node.clone(), change });
    }
    if let Some(change) = compare(
        previous.and_then(|d| d.stats.as_ref()),
        pending.and_then(|d| d.stats.as_ref()),
    ) {
        events.push(ClusterEvent::NodeStats { node: node.clone(), change });
    }

    let subsystems: BTreeSet<&String> = previous
        .into_iter()
        .chain(pending)
        .flat_map(|d| d.daemon.keys())
        .collect();
    for name in subsystems {
        let before = previous.and_then(|d| d.daemon.get(name));
        let after = pending.and_then(|d| d.daemon.get(name));
        if let Some(change) = compare(before, after) {
            events.push(ClusterEvent::Subsystem {
                node: node.clone(),
                name: name.clone(),
                change,
            });
        }
    }

    let paths: BTreeSet<_> = previous
        .into_iter()
        .chain(pending)
        .flat_map(|d| d.instance.keys())
        .collect();
    for path in paths {
        let before = previous.and_then(|d| d.instance.get(path));
        let after = pending.and_then(|d| d.instance.get(path));

        let config = compare(
            before.and_then(|i| i.config.as_ref()),
            after.and_then(|i| i.config.as_ref()),
        );
        if let Some(change) = config {
            events.push(ClusterEvent::InstanceConfig {
                node: node.clone(),
                path: path.clone(),
                change,
            });
        }
        let status = compare(
            before.and_then(|i| i.status.as_ref()),
            after.and_then(|i| i.status.as_ref()),
        );
        if let Some(change) = status {
            events.push(ClusterEvent::InstanceStatus {
                node: node.clone(),
                path: path.clone(),
                change,
            });
        }
        let monitor = compare(
            before.and_then(|i| i.monitor.as_ref()),
            after.and_then(|i| i.monitor.as_ref()),
        );
        if let Some(change) = monitor {
            events.push(ClusterEvent::InstanceMonitor {
                node: node.clone(),
                path: path.clone(),
                change,
            });
        }
    }

    events
}

/// Fan-out of cluster events to any number of subscribers.
///
/// Slow subscribers lose the oldest events rather than stalling the data
/// actor.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClusterEvent>,
}

impl EventBus {
    /// Create a bus keeping up to `capacity` undelivered events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish one event; no-op without subscribers
    pub fn publish(&self, event: ClusterEvent) {
        tracing::trace!(event = %event.name(), "publish");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving end of the event bus
#[derive(Debug)]
pub struct EventSubscription {
    rx: broadcast::Receiver<ClusterEvent>,
}

impl EventSubscription {
    /// Next event; `None` once the bus is gone.
    ///
    /// Lagging skips the lost events with a warning.
    pub async fn recv(&mut self) -> Option<ClusterEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event subscriber lagged, oldest events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is ready
    pub fn try_recv(&mut self) -> Option<ClusterEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event subscriber lagged, oldest events dropped");
                }
                Err(_) => return None,
            }
        }
    }
}
