//! Outgoing heartbeat construction.

use crate::dataset::Dataset;
use chrono::Utc;
use strata_core::{FullMessage, HeartbeatMessage, MessageKind, PatchMessage, PingMessage};

impl Dataset {
    /// Build the next outgoing heartbeat.
    ///
    /// A Full carries the local sub-tree as of the current local generation,
    /// so that later patches continue exactly where it ends.
    pub(crate) fn next_message(&self) -> HeartbeatMessage {
        let row = self.matrix.row(&self.local).cloned().unwrap_or_default();
        match self.message_kind() {
            MessageKind::Full => HeartbeatMessage::Full(FullMessage {
                nodename: self.local.clone(),
                compat: self.compat,
                generation_matrix_row: row,
                updated_at: Utc::now(),
                snapshot: self.committed_local.clone(),
            }),
            MessageKind::Patch => HeartbeatMessage::Patch(PatchMessage {
                nodename: self.local.clone(),
                compat: self.compat,
                generation_matrix_row: row,
                updated_at: Utc::now(),
                deltas: self.queue.clone(),
            }),
            MessageKind::Ping => HeartbeatMessage::Ping(PingMessage {
                nodename: self.local.clone(),
                generation_matrix_row: row,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::DataConfig;
    use crate::dataset::Dataset;
    use crate::local::LocalChange;
    use chrono::Utc;
    use strata_core::{
        Generation, HeartbeatMessage, MessageKind, NodeMonitor, NodeName, PingMessage,
    };

    fn n(name: &str) -> NodeName {
        NodeName::from(name)
    }

    fn pair() -> (Dataset, Dataset) {
        (
            Dataset::new(n("a"), &DataConfig::default()),
            Dataset::new(n("b"), &DataConfig::default()),
        )
    }

    /// Deliver `from`'s next heartbeat to `to` and commit both
    fn exchange(from: &mut Dataset, to: &mut Dataset) -> MessageKind {
        let msg = from.next_message();
        let kind = msg.kind();
        let bytes = msg.encode().unwrap();
        to.ingest(HeartbeatMessage::decode(&bytes).unwrap()).unwrap();
        to.commit();
        from.commit();
        kind
    }

    #[test]
    fn lone_node_pings() {
        let (a, _) = pair();
        assert_eq!(a.next_message().kind(), MessageKind::Ping);
    }

    #[test]
    fn peer_without_baseline_gets_full() {
        let (mut a, _) = pair();
        a.apply_ping(PingMessage {
            nodename: n("b"),
            generation_matrix_row: [(n("b"), Generation::new(1))].into_iter().collect(),
        })
        .unwrap();
        assert_eq!(a.next_message().kind(), MessageKind::Full);
    }

    #[test]
    fn two_nodes_settle_into_patch_and_converge() {
        let (mut a, mut b) = pair();

        // a pings, b learns of a; b sends full since a has no view of b yet
        assert_eq!(exchange(&mut a, &mut b), MessageKind::Ping);
        assert_eq!(exchange(&mut b, &mut a), MessageKind::Full);
        assert_eq!(exchange(&mut a, &mut b), MessageKind::Full);
        assert_eq!(exchange(&mut b, &mut a), MessageKind::Patch);
        assert_eq!(exchange(&mut a, &mut b), MessageKind::Patch);

        a.apply_local(LocalChange::SetNodeMonitor(NodeMonitor {
            updated_at: Utc::now(),
            ..Default::default()
        }))
        .unwrap();
        a.commit();
        assert_eq!(exchange(&mut a, &mut b), MessageKind::Patch);

        assert_eq!(b.node_data(&n("a")), a.node_data(&n("a")));
        assert_eq!(b.matrix.get(&n("a"), &n("b")), a.generation());
    }
}
