//! Daemon configuration.
//!
//! Loaded from a TOML file, then overridden by `STRATA_*` environment
//! variables, then by command line flags. Every field has a default so an
//! empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use strata_core::{NodeName, DATA_COMPAT};
use strata_data::{DataConfig, NodesInfoFile};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// An environment override could not be parsed
    #[error("invalid value {value:?} in {key}")]
    Env {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
    },

    /// The configuration is inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Local node name
    pub nodename: NodeName,
    /// Every node of the cluster, the local one included
    pub cluster_nodes: Vec<NodeName>,
    /// Data protocol compatibility level
    pub compat: u64,
    /// Directory for runtime files such as the nodes-info cache
    pub var_dir: PathBuf,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Data actor settings
    pub data: DataSection,
    /// Heartbeat and commit cadence
    pub heartbeat: HeartbeatSection,
}

/// `[data]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    /// Reply timeout for every data actor call
    pub command_timeout_ms: u64,
    /// How long queued commands are drained at shutdown
    pub shutdown_grace_ms: u64,
    /// Command queue capacity
    pub queue_size: usize,
    /// Undelivered events kept per subscriber
    pub event_buffer: usize,
}

/// `[heartbeat]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSection {
    /// Delay between outgoing heartbeats
    pub interval_ms: u64,
    /// Delay between commits
    pub commit_interval_ms: u64,
    /// Silence after which a peer is dropped
    pub peer_timeout_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            nodename: NodeName::from("node1"),
            cluster_nodes: Vec::new(),
            compat: DATA_COMPAT,
            var_dir: PathBuf::from("/var/lib/strata"),
            log_level: "info".to_string(),
            data: DataSection::default(),
            heartbeat: HeartbeatSection::default(),
        }
    }
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            command_timeout_ms: 5_000,
            shutdown_grace_ms: 500,
            queue_size: 256,
            event_buffer: 1024,
        }
    }
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            commit_interval_ms: 500,
            peer_timeout_ms: 15_000,
        }
    }
}

impl DaemonConfig {
    /// Parse a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` when it exists, defaults otherwise; then apply the
    /// environment and validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::load_from_file(path)?,
            Some(path) => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `STRATA_*` overrides from the process environment
    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        self.merge_with_vars(|key| std::env::var(key).ok())
    }

    /// Apply `STRATA_*` overrides looked up through `var`
    pub fn merge_with_vars(
        &mut self,
        var: impl Fn(&'static str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = var("STRATA_NODENAME") {
            self.nodename = NodeName::new(value);
        }
        if let Some(value) = var("STRATA_CLUSTER_NODES") {
            self.cluster_nodes = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(NodeName::from)
                .collect();
        }
        if let Some(value) = var("STRATA_VAR_DIR") {
            self.var_dir = PathBuf::from(value);
        }
        if let Some(value) = var("STRATA_LOG_LEVEL") {
            self.log_level = value;
        }
        parse_var(&var, "STRATA_COMMAND_TIMEOUT_MS", &mut self.data.command_timeout_ms)?;
        parse_var(&var, "STRATA_HEARTBEAT_INTERVAL_MS", &mut self.heartbeat.interval_ms)?;
        parse_var(&var, "STRATA_COMMIT_INTERVAL_MS", &mut self.heartbeat.commit_interval_ms)?;
        parse_var(&var, "STRATA_PEER_TIMEOUT_MS", &mut self.heartbeat.peer_timeout_ms)?;
        Ok(())
    }

    /// Check values the daemon cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.nodename.as_str();
        if name.is_empty() || name.contains('/') || name.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!("bad node name {name:?}")));
        }
        if let Some(bad) = self.cluster_nodes.iter().find(|n| n.as_str().is_empty()) {
            return Err(ConfigError::Invalid(format!("bad cluster node name {bad:?}")));
        }
        if self.heartbeat.interval_ms == 0 || self.heartbeat.commit_interval_ms == 0 {
            return Err(ConfigError::Invalid("intervals must be positive".to_string()));
        }
        if self.heartbeat.peer_timeout_ms <= self.heartbeat.interval_ms {
            return Err(ConfigError::Invalid(format!(
                "peer timeout {}ms must exceed the heartbeat interval {}ms",
                self.heartbeat.peer_timeout_ms, self.heartbeat.interval_ms
            )));
        }
        if self.data.command_timeout_ms == 0 || self.data.queue_size == 0 {
            return Err(ConfigError::Invalid(
                "command timeout and queue size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Peers to send heartbeats to
    pub fn peers(&self) -> impl Iterator<Item = &NodeName> {
        self.cluster_nodes.iter().filter(move |n| **n != self.nodename)
    }

    /// Nodes-info cache file under the var directory
    pub fn nodes_info_file(&self) -> NodesInfoFile {
        NodesInfoFile::in_dir(&self.var_dir)
    }

    /// Data actor settings
    pub fn data_config(&self) -> DataConfig {
        DataConfig {
            command_timeout: Duration::from_millis(self.data.command_timeout_ms),
            shutdown_grace: Duration::from_millis(self.data.shutdown_grace_ms),
            queue_size: self.data.queue_size,
            event_buffer: self.data.event_buffer,
            compat: self.compat,
            nodes_info_path: Some(self.nodes_info_file().path().to_path_buf()),
            ..DataConfig::default()
        }
    }

    /// Delay between heartbeats
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat.interval_ms)
    }

    /// Delay between commits
    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat.commit_interval_ms)
    }

    /// Silence after which a peer is dropped
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat.peer_timeout_ms)
    }
}

fn parse_var(
    var: &impl Fn(&'static str) -> Option<String>,
    key: &'static str,
    target: &mut u64,
) -> Result<(), ConfigError> {
    if let Some(value) = var(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { key, value })?;
    }
    Ok(())
}
