//! Read-only instrumentation counters.

use serde::Serialize;
use std::collections::BTreeMap;
use strata_core::Generation;

/// Counters maintained by the data actor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallStats {
    /// Commands processed, by command name
    pub calls: BTreeMap<String, u64>,
    /// Commits that produced a new generation
    pub commits: u64,
    /// Events published
    pub events: u64,
    /// Peer messages rejected
    pub peer_errors: u64,
    /// Full resyncs requested from peers
    pub full_requests: u64,
    /// Local generation at the time of the snapshot
    pub generation: Generation,
    /// Generations retained in the patch queue
    pub queue_len: usize,
}

impl CallStats {
    pub(crate) fn record_call(&mut self, name: &str) {
        *self.calls.entry(name.to_string()).or_default() += 1;
    }

    /// Count for one command name
    pub fn count(&self, name: &str) -> u64 {
        self.calls.get(name).copied().unwrap_or(0)
    }
}
