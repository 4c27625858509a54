//! Outgoing heartbeat message kind selection.

use crate::generation::GenerationMatrix;
use crate::names::NodeName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of heartbeat message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Whole local node sub-tree
    Full,
    /// Generation-keyed deltas
    Patch,
    /// Generation row only
    #[default]
    Ping,
}

impl MessageKind {
    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Full => "full",
            MessageKind::Patch => "patch",
            MessageKind::Ping => "ping",
        }
    }

    /// Whether local mutations must be retained for replay
    pub fn retains_patches(&self) -> bool {
        matches!(self, MessageKind::Full | MessageKind::Patch)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Choose the kind of the next outgoing heartbeat.
///
/// Tracked peers are the observers holding a row in the matrix. A peer whose
/// view of the local generation is unknown, or ahead of the local counter
/// (it remembers a previous life of the local node), needs a Full. Otherwise
/// Patch once the local node has absorbed anything from a peer, else Ping.
pub fn select_message_kind(matrix: &GenerationMatrix, local: &NodeName) -> MessageKind {
    let local_gen = matrix.get(local, local);

    let needs_full = matrix.observers().filter(|p| *p != local).any(|peer| {
        let view = matrix.get(local, peer);
        view.is_unknown() || view > local_gen
    });
    if needs_full {
        return MessageKind::Full;
    }

    let absorbed = matrix
        .row(local)
        .map(|row| row.iter().any(|(owner, gen)| owner != local && !gen.is_unknown()))
        .unwrap_or(false);
    if absorbed {
        MessageKind::Patch
    } else {
        MessageKind::Ping
    }
}
