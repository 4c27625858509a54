//! In-process cluster simulation.
//!
//! Starts several daemons on a [`MemoryNetwork`], lets them gossip and
//! reports whether every node ended with the same view of every node.

use crate::config::DaemonConfig;
use crate::runtime::Daemon;
use crate::transport::MemoryNetwork;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{Generation, MessageKind, NodeName};
use strata_data::DataResult;

/// One node's state at the end of a simulation
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    /// Local generation
    pub generation: Generation,
    /// Kind of the last outgoing heartbeat
    pub mode: MessageKind,
    /// Nodes present in the local snapshot
    pub known_nodes: Vec<NodeName>,
    /// Events published
    pub events: u64,
    /// Full resyncs requested
    pub full_requests: u64,
}

/// Simulation outcome
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Whether every node holds the same copy of every node
    pub converged: bool,
    /// Per-node details
    pub nodes: BTreeMap<NodeName, NodeReport>,
}

/// A set of daemons sharing one memory network
pub struct Cluster {
    network: MemoryNetwork,
    template: DaemonConfig,
    daemons: BTreeMap<NodeName, Daemon>,
}

impl Cluster {
    /// Start one daemon per name. Each node gets `template` with its own
    /// name and a var directory under `template.var_dir`.
    pub async fn start(template: DaemonConfig, names: &[NodeName]) -> Self {
        let mut cluster = Self {
            network: MemoryNetwork::new(),
            template: DaemonConfig {
                cluster_nodes: names.to_vec(),
                ..template
            },
            daemons: BTreeMap::new(),
        };
        for name in names {
            cluster.start_node(name).await;
        }
        cluster
    }

    fn node_config(&self, name: &NodeName) -> DaemonConfig {
        DaemonConfig {
            nodename: name.clone(),
            var_dir: self.template.var_dir.join(name.as_str()),
            ..self.template.clone()
        }
    }

    async fn start_node(&mut self, name: &NodeName) {
        let config = self.node_config(name);
        let transport = Arc::new(self.network.endpoint(name.clone()).await);
        self.daemons
            .insert(name.clone(), Daemon::start(&config, transport));
    }

    /// Running daemon for `name`
    pub fn node(&self, name: &NodeName) -> Option<&Daemon> {
        self.daemons.get(name)
    }

    /// Underlying network, for link manipulation
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    /// Stop `name` and start it again with an empty dataset
    pub async fn restart(&mut self, name: &NodeName) {
        if let Some(daemon) = self.daemons.remove(name) {
            self.network.detach(name).await;
            daemon.shutdown().await;
        }
        self.start_node(name).await;
    }

    /// Whether every node holds, for every node, exactly the data that node
    /// holds for itself
    pub async fn converged(&self) -> DataResult<bool> {
        for (owner, daemon) in &self.daemons {
            let own = daemon.data().node_data(owner).await?;
            for (observer, other) in &self.daemons {
                if observer == owner {
                    continue;
                }
                if other.data().node_data(owner).await? != own {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Poll until converged or `timeout` elapsed
    pub async fn wait_converged(&self, timeout: Duration, poll: Duration) -> DataResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.converged().await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Collect the per-node report
    pub async fn report(&self) -> DataResult<SimulationReport> {
        let mut nodes = BTreeMap::new();
        for (name, daemon) in &self.daemons {
            let stats = daemon.data().call_stats().await?;
            let status = daemon.data().status().await?;
            let mode = daemon.hbmode().get().await?.local;
            nodes.insert(
                name.clone(),
                NodeReport {
                    generation: stats.generation,
                    mode,
                    known_nodes: status.node.keys().cloned().collect(),
                    events: stats.events,
                    full_requests: stats.full_requests,
                },
            );
        }
        Ok(SimulationReport {
            converged: self.converged().await?,
            nodes,
        })
    }

    /// Stop every daemon
    pub async fn shutdown(self) {
        for (_, daemon) in self.daemons {
            daemon.shutdown().await;
        }
    }
}

/// Run `count` nodes for `duration`, labelling each node once, and report
pub async fn run(
    template: DaemonConfig,
    count: usize,
    duration: Duration,
) -> DataResult<SimulationReport> {
    let names: Vec<NodeName> = (1..=count).map(|i| NodeName::new(format!("node{i}"))).collect();
    let cluster = Cluster::start(template, &names).await;
    for name in &names {
        if let Some(daemon) = cluster.node(name) {
            let labels = [("sim".to_string(), name.to_string())].into_iter().collect();
            daemon.data().set_node_labels(labels).await?;
        }
    }
    tokio::time::sleep(duration).await;
    let report = cluster.report().await;
    cluster.shutdown().await;
    report
}
