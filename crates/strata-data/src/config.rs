//! Data actor configuration.

use std::path::PathBuf;
use std::time::Duration;
use strata_core::DATA_COMPAT;

/// Data actor configuration
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// How long a caller waits for a reply
    pub command_timeout: Duration,
    /// How long queued commands are drained after shutdown
    pub shutdown_grace: Duration,
    /// Command queue capacity
    pub queue_size: usize,
    /// Event bus capacity per subscriber
    pub event_buffer: usize,
    /// Compatibility level advertised in heartbeats and node status
    pub compat: u64,
    /// Agent version published in node status
    pub agent: String,
    /// Nodes-info cache file, not written when unset
    pub nodes_info_path: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_millis(500),
            queue_size: 256,
            event_buffer: 1024,
            compat: DATA_COMPAT,
            agent: env!("CARGO_PKG_VERSION").to_string(),
            nodes_info_path: None,
        }
    }
}
