//! Inbound peer message handling.
//!
//! Full and Patch messages update a staged copy of the peer's sub-tree; the
//! staged copy reaches the pending snapshot at the next commit. Resetting a
//! peer to "needs Full" takes effect immediately: the local row travels in
//! every heartbeat and the peer answers a zero view with a Full.

use crate::dataset::{Dataset, InboundPeer};
use crate::error::PeerApplyError;
use strata_core::{
    Deltas, FullMessage, Generation, HeartbeatMessage, NodeData, NodeName, PatchMessage,
    PingMessage,
};

impl Dataset {
    /// Route an inbound message to the matching handler
    pub(crate) fn ingest(
        &mut self,
        message: HeartbeatMessage,
    ) -> Result<Generation, PeerApplyError> {
        match message {
            HeartbeatMessage::Full(m) => self.apply_full(m),
            HeartbeatMessage::Patch(m) => self.apply_patch(m),
            HeartbeatMessage::Ping(m) => self.apply_ping(m),
        }
    }

    /// Replace the peer's staged sub-tree. Always succeeds for a peer.
    pub(crate) fn apply_full(
        &mut self,
        message: FullMessage,
    ) -> Result<Generation, PeerApplyError> {
        let peer = self.check_sender(&message.nodename)?;
        let generation = message.generation_matrix_row.get(&peer);
        if message.compat != self.compat {
            tracing::debug!(
                peer = %peer,
                compat = message.compat,
                local = self.compat,
                "compat level differs"
            );
        }
        self.matrix.replace_row(&peer, message.generation_matrix_row);
        self.inbound.insert(
            peer.clone(),
            InboundPeer {
                applied: generation,
                data: Some(message.snapshot),
                dirty: true,
            },
        );
        tracing::debug!(peer = %peer, gen = %generation, "staged full");
        Ok(generation)
    }

    /// Apply generation-keyed deltas to the peer's staged sub-tree.
    ///
    /// The message applies as a whole or not at all. Generations at or below
    /// the last applied one are skipped, and a late duplicate with nothing
    /// newer is ignored entirely, matrix row included.
    pub(crate) fn apply_patch(
        &mut self,
        message: PatchMessage,
    ) -> Result<Generation, PeerApplyError> {
        let peer = self.check_sender(&message.nodename)?;
        let reported = message.generation_matrix_row.get(&peer);
        let applied = self.inbound.get(&peer).map(|s| s.applied).unwrap_or_default();
        if !applied.is_unknown()
            && reported < applied
            && message.deltas.range(applied.next()..).next().is_none()
        {
            tracing::trace!(
                peer = %peer,
                applied = %applied,
                reported = %reported,
                "stale patch skipped"
            );
            return Ok(applied);
        }
        self.matrix.replace_row(&peer, message.generation_matrix_row);

        let result = self.patch_staged(&peer, reported, &message.deltas);
        if result.is_err() {
            self.request_full(&peer);
        }
        result
    }

    fn patch_staged(
        &mut self,
        peer: &NodeName,
        reported: Generation,
        deltas: &Deltas,
    ) -> Result<Generation, PeerApplyError> {
        let staged = self.inbound.get(peer).cloned().unwrap_or_default();
        let data = match staged.data {
            Some(data) if !staged.applied.is_unknown() => data,
            _ => return Err(PeerApplyError::NoBaseline { peer: peer.clone() }),
        };
        // newer deltas under an older reported generation
        if reported < staged.applied {
            return Err(PeerApplyError::Regressed {
                peer: peer.clone(),
                applied: staged.applied,
                reported,
            });
        }

        let mut last = staged.applied;
        let pending: Vec<_> = deltas.range(last.next()..).collect();
        if pending.is_empty() {
            return if reported > last {
                Err(PeerApplyError::GenerationGap {
                    peer: peer.clone(),
                    expected: last.next(),
                    got: reported,
                })
            } else {
                Ok(last)
            };
        }

        let mut tree = data.to_value().map_err(|source| PeerApplyError::Decode {
            peer: peer.clone(),
            source,
        })?;
        for (generation, ops) in pending {
            if *generation != last.next() {
                return Err(PeerApplyError::GenerationGap {
                    peer: peer.clone(),
                    expected: last.next(),
                    got: *generation,
                });
            }
            strata_json_patch::apply(&mut tree, ops).map_err(|source| PeerApplyError::Apply {
                peer: peer.clone(),
                source,
            })?;
            last = *generation;
        }
        if reported > last {
            return Err(PeerApplyError::GenerationGap {
                peer: peer.clone(),
                expected: last.next(),
                got: reported,
            });
        }

        let data = NodeData::from_value(tree).map_err(|source| PeerApplyError::Decode {
            peer: peer.clone(),
            source,
        })?;
        self.inbound.insert(
            peer.clone(),
            InboundPeer {
                applied: last,
                data: Some(data),
                dirty: true,
            },
        );
        tracing::trace!(peer = %peer, gen = %last, "staged patch");
        Ok(last)
    }

    /// Record the peer's generation row; request a Full when the peer's
    /// generation moved without data.
    pub(crate) fn apply_ping(
        &mut self,
        message: PingMessage,
    ) -> Result<Generation, PeerApplyError> {
        let peer = self.check_sender(&message.nodename)?;
        let reported = message.generation_matrix_row.get(&peer);
        self.matrix.replace_row(&peer, message.generation_matrix_row);

        let applied = self.inbound.get(&peer).map(|s| s.applied).unwrap_or_default();
        if !applied.is_unknown() && reported != applied {
            tracing::debug!(
                peer = %peer,
                applied = %applied,
                reported = %reported,
                "ping reports unseen generation"
            );
            self.request_full(&peer);
            return Ok(Generation::UNKNOWN);
        }
        Ok(applied)
    }

    /// Reset the peer to "needs Full"
    pub(crate) fn request_full(&mut self, peer: &NodeName) {
        if peer == &self.local {
            return;
        }
        if let Some(staged) = self.inbound.get_mut(peer) {
            staged.applied = Generation::UNKNOWN;
        }
        self.matrix.set(peer, &self.local, Generation::UNKNOWN);
        self.stats.full_requests += 1;
        tracing::info!(peer = %peer, "full resync requested");
    }

    /// Forget a peer that left the cluster.
    ///
    /// Its sub-tree disappears from pending now; the matching Deleted events
    /// are published at the next commit.
    pub(crate) fn drop_peer(&mut self, peer: &NodeName) -> bool {
        if peer == &self.local {
            return false;
        }
        let had_data = self.pending.node.remove(peer).is_some();
        let had_staged = self.inbound.remove(peer).is_some();
        let had_row = self.matrix.row(peer).is_some();
        self.matrix.remove_node(peer);
        let known = had_data || had_staged || had_row;
        if known {
            self.touched.insert(peer.clone());
            tracing::info!(peer = %peer, "peer dropped");
        }
        known
    }

    fn check_sender(&self, sender: &NodeName) -> Result<NodeName, PeerApplyError> {
        if sender == &self.local {
            return Err(PeerApplyError::FromSelf {
                peer: sender.clone(),
            });
        }
        Ok(sender.clone())
    }
}
