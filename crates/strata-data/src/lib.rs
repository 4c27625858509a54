//! # Strata Data - Replicated Cluster Dataset
//!
//! The single-writer owner of the cluster snapshot. One actor task holds the
//! dataset; everything else goes through a [`DataHandle`].
//!
//! ## Pipelines
//!
//! - **Local changes** become JSON patch operations pending the next commit
//! - **Commit** bumps the local generation, retains operations for peers that
//!   replicate by patch, and publishes per-entity events from a diff of the
//!   previous and pending snapshots
//! - **Peer apply** stages Full snapshots and gap-checked Patch deltas per
//!   peer; staged data becomes visible at the next commit
//! - **Heartbeat** picks Full, Patch or Ping from the generation matrix
//!
//! ## Usage
//!
//! ```rust,ignore
//! let bus = EventBus::new(config.event_buffer);
//! let (hbmode, _) = HbModeHandle::spawn(config.queue_size, config.command_timeout);
//! let (data, _) = DataActor::spawn(local, config, hbmode, bus);
//!
//! data.set_node_monitor(monitor).await?;
//! data.commit_pending().await?;
//! let message = data.next_message().await?;
//! ```

#![forbid(unsafe_code)]

mod actor;
mod commit;
mod config;
mod dataset;
mod error;
mod hbmode;
mod heartbeat;
mod local;
mod nodes_info;
mod peer;
mod publish;
mod stats;

pub use actor::{DataActor, DataHandle};
pub use commit::CommitReport;
pub use config::DataConfig;
pub use error::{DataError, DataResult, NodesInfoError, PeerApplyError};
pub use hbmode::{HbModeHandle, HeartbeatModes};
pub use local::LocalChange;
pub use nodes_info::NodesInfoFile;
pub use publish::{EventBus, EventSubscription};
pub use stats::CallStats;
