//! Error types for the data actor and the peer apply pipeline.

use std::path::PathBuf;
use std::time::Duration;
use strata_core::{CoreError, Generation, NodeName};
use strata_json_patch::PatchError;

/// Why an inbound peer message was not absorbed.
///
/// Every variant except [`PeerApplyError::FromSelf`] leaves the peer in
/// needs-Full state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PeerApplyError {
    /// Patch received before any Full from this peer
    #[error("no baseline for peer {peer}, full resync requested")]
    NoBaseline {
        /// Sender
        peer: NodeName,
    },

    /// Deltas do not continue from the last applied generation
    #[error("generation gap from peer {peer}: expected {expected}, got {got}")]
    GenerationGap {
        /// Sender
        peer: NodeName,
        /// Next generation the receiver could apply
        expected: Generation,
        /// Generation actually offered
        got: Generation,
    },

    /// Sender offers newer deltas while reporting a generation below what
    /// was already applied
    #[error("peer {peer} regressed from generation {applied} to {reported}")]
    Regressed {
        /// Sender
        peer: NodeName,
        /// Last applied generation
        applied: Generation,
        /// Sender's reported generation
        reported: Generation,
    },

    /// A delta did not apply structurally
    #[error("cannot apply deltas from peer {peer}: {source}")]
    Apply {
        /// Sender
        peer: NodeName,
        /// Engine failure
        #[source]
        source: PatchError,
    },

    /// The patched tree is not valid node data
    #[error("cannot decode data from peer {peer}: {source}")]
    Decode {
        /// Sender
        peer: NodeName,
        /// Codec failure
        #[source]
        source: CoreError,
    },

    /// Message carries the local node name
    #[error("ignoring message claiming to come from the local node {peer}")]
    FromSelf {
        /// Claimed sender
        peer: NodeName,
    },
}

impl PeerApplyError {
    /// Peer the failure concerns
    pub fn peer(&self) -> &NodeName {
        match self {
            PeerApplyError::NoBaseline { peer }
            | PeerApplyError::GenerationGap { peer, .. }
            | PeerApplyError::Regressed { peer, .. }
            | PeerApplyError::Apply { peer, .. }
            | PeerApplyError::Decode { peer, .. }
            | PeerApplyError::FromSelf { peer } => peer,
        }
    }

    /// Whether this is a generation gap
    pub fn is_gap(&self) -> bool {
        matches!(self, PeerApplyError::GenerationGap { .. })
    }
}

/// Nodes-info cache file failures
#[derive(Debug, thiserror::Error)]
pub enum NodesInfoError {
    /// Filesystem failure
    #[error("nodes info file {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File content is not valid nodes info
    #[error("nodes info file {path}: {source}")]
    Format {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}

/// Data actor errors
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// The actor stopped
    #[error("data actor is not running")]
    Closed,

    /// No reply within the command timeout
    #[error("data actor did not answer {operation} within {timeout:?}")]
    Timeout {
        /// Command name
        operation: &'static str,
        /// Timeout applied
        timeout: Duration,
    },

    /// The actor dropped the reply channel, usually while shutting down
    #[error("data actor dropped the {operation} reply")]
    Dropped {
        /// Command name
        operation: &'static str,
    },

    /// A local change could not be encoded as a patch operation
    #[error("cannot encode local change: {0}")]
    Encode(#[source] CoreError),

    /// Inbound peer message rejected
    #[error(transparent)]
    Peer(#[from] PeerApplyError),

    /// Nodes-info cache file failure
    #[error(transparent)]
    NodesInfo(#[from] NodesInfoError),
}

/// Result type for data operations
pub type DataResult<T> = Result<T, DataError>;
