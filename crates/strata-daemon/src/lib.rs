//! # Strata Daemon
//!
//! Thin shell around the replicated dataset: configuration, logging, the
//! commit and heartbeat loops, the transport seam and an in-memory cluster
//! simulation.

#![forbid(unsafe_code)]

pub mod config;
pub mod logging;
pub mod runtime;
pub mod simulate;
pub mod transport;

pub use config::{ConfigError, DaemonConfig};
pub use runtime::Daemon;
pub use simulate::{Cluster, SimulationReport};
pub use transport::{Inbound, MemoryNetwork, MemoryTransport, Transport, TransportError};
