//! # Data Actor
//!
//! A single tokio task owns the [`Dataset`](crate::dataset::Dataset). Every
//! other component talks to it through a [`DataHandle`], which sends a tagged
//! command carrying a oneshot reply channel over a bounded queue and waits
//! for the reply with a timeout.
//!
//! ## Guarantees
//!
//! - Commands are processed one at a time, in arrival order
//! - Reads return deep copies; the dataset is never shared by reference
//! - A caller that gives up does not cancel the command: the actor finishes
//!   its side effects and the reply is dropped
//! - On shutdown, queued commands are discarded for a bounded grace period so
//!   that waiting callers are released promptly
//! - Heartbeat mode cache updates never wait on the cache worker

use crate::commit::CommitReport;
use crate::config::DataConfig;
use crate::dataset::Dataset;
use crate::error::{DataError, DataResult, PeerApplyError};
use crate::hbmode::HbModeHandle;
use crate::local::LocalChange;
use crate::nodes_info::NodesInfoFile;
use crate::publish::{EventBus, EventSubscription};
use crate::stats::CallStats;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use strata_core::{
    ClusterSnapshot, FullMessage, Generation, GenerationMatrix, HeartbeatMessage,
    InstanceConfig, InstanceMonitor, InstanceStatus, MessageKind, NodeConfig, NodeData,
    NodeMonitor, NodeName, NodeStats, NodeStatus, NodesInfo, ObjectPath, ObjectStatus,
    PatchMessage, PingMessage, StoragePath, SubsystemStatus,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type PeerReply = oneshot::Sender<Result<Generation, PeerApplyError>>;

/// Commands understood by the data actor
enum DataCmd {
    GetStatus {
        resp: oneshot::Sender<ClusterSnapshot>,
    },
    GetNodeData {
        node: NodeName,
        resp: oneshot::Sender<Option<NodeData>>,
    },
    GetNodeStatus {
        node: NodeName,
        resp: oneshot::Sender<Option<NodeStatus>>,
    },
    GetNodesInfo {
        resp: oneshot::Sender<NodesInfo>,
    },
    GetServiceNames {
        resp: oneshot::Sender<Vec<ObjectPath>>,
    },
    GetCallStats {
        resp: oneshot::Sender<CallStats>,
    },
    GetGenerationMatrix {
        resp: oneshot::Sender<GenerationMatrix>,
    },
    GetHeartbeatMode {
        resp: oneshot::Sender<MessageKind>,
    },
    Mutate {
        change: LocalChange,
        resp: oneshot::Sender<DataResult<()>>,
    },
    Ingest {
        message: Box<HeartbeatMessage>,
        resp: PeerReply,
    },
    RequestFull {
        peer: NodeName,
        resp: oneshot::Sender<()>,
    },
    DropPeer {
        peer: NodeName,
        resp: oneshot::Sender<bool>,
    },
    CommitPending {
        resp: oneshot::Sender<CommitReport>,
    },
    NextMessage {
        resp: oneshot::Sender<HeartbeatMessage>,
    },
}

impl DataCmd {
    fn name(&self) -> &'static str {
        match self {
            DataCmd::GetStatus { .. } => "get_status",
            DataCmd::GetNodeData { .. } => "get_node_data",
            DataCmd::GetNodeStatus { .. } => "get_node_status",
            DataCmd::GetNodesInfo { .. } => "get_nodes_info",
            DataCmd::GetServiceNames { .. } => "get_service_names",
            DataCmd::GetCallStats { .. } => "get_call_stats",
            DataCmd::GetGenerationMatrix { .. } => "get_generation_matrix",
            DataCmd::GetHeartbeatMode { .. } => "get_heartbeat_mode",
            DataCmd::Mutate { change, .. } => change.name(),
            DataCmd::Ingest { message, .. } => match message.kind() {
                MessageKind::Full => "apply_full",
                MessageKind::Patch => "apply_patch",
                MessageKind::Ping => "apply_ping",
            },
            DataCmd::RequestFull { .. } => "request_full",
            DataCmd::DropPeer { .. } => "drop_peer",
            DataCmd::CommitPending { .. } => "commit_pending",
            DataCmd::NextMessage { .. } => "next_message",
        }
    }
}

/// The data actor task
pub struct DataActor {
    dataset: Dataset,
    rx: mpsc::Receiver<DataCmd>,
    shutdown_rx: mpsc::Receiver<()>,
    bus: EventBus,
    hbmode: HbModeHandle,
    nodes_info_file: Option<NodesInfoFile>,
    shutdown_grace: Duration,
}

impl DataActor {
    /// Start the actor for `local` and return the handle to reach it.
    ///
    /// The local node is registered at generation 1 before the first command
    /// is served.
    pub fn spawn(
        local: NodeName,
        config: DataConfig,
        hbmode: HbModeHandle,
        bus: EventBus,
    ) -> (DataHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let actor = Self {
            dataset: Dataset::new(local.clone(), &config),
            rx,
            shutdown_rx,
            bus: bus.clone(),
            hbmode,
            nodes_info_file: config.nodes_info_path.clone().map(NodesInfoFile::new),
            shutdown_grace: config.shutdown_grace,
        };
        let handle = DataHandle {
            tx,
            shutdown_tx,
            timeout: config.command_timeout,
            bus,
            local,
        };
        (handle, tokio::spawn(actor.run()))
    }

    async fn run(mut self) {
        tracing::info!(node = %self.dataset.local, "data actor starting");
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }
        }
        self.drain().await;
        tracing::info!(node = %self.dataset.local, "data actor stopped");
    }

    /// Discard queued commands until the queue is empty or the grace period
    /// ends. Dropping a command drops its reply channel, releasing the caller.
    async fn drain(&mut self) {
        self.rx.close();
        let deadline = tokio::time::sleep(self.shutdown_grace);
        tokio::pin!(deadline);
        let mut discarded = 0usize;
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => {
                        tracing::trace!(cmd = cmd.name(), "discarded at shutdown");
                        discarded += 1;
                    }
                    None => break,
                },
            }
        }
        if discarded > 0 {
            tracing::debug!(discarded, "queued commands discarded at shutdown");
        }
    }

    fn handle(&mut self, cmd: DataCmd) {
        self.dataset.stats.record_call(cmd.name());
        match cmd {
            DataCmd::GetStatus { resp } => {
                let _ = resp.send(self.dataset.pending.clone());
            }
            DataCmd::GetNodeData { node, resp } => {
                let _ = resp.send(self.dataset.node_data(&node));
            }
            DataCmd::GetNodeStatus { node, resp } => {
                let _ = resp.send(self.dataset.node_status(&node));
            }
            DataCmd::GetNodesInfo { resp } => {
                let _ = resp.send(self.dataset.pending.nodes_info());
            }
            DataCmd::GetServiceNames { resp } => {
                let _ = resp.send(self.dataset.service_names());
            }
            DataCmd::GetCallStats { resp } => {
                let mut stats = self.dataset.stats.clone();
                stats.generation = self.dataset.generation();
                stats.queue_len = self.dataset.queue.len();
                let _ = resp.send(stats);
            }
            DataCmd::GetGenerationMatrix { resp } => {
                let _ = resp.send(self.dataset.matrix.clone());
            }
            DataCmd::GetHeartbeatMode { resp } => {
                let _ = resp.send(self.dataset.message_kind());
            }
            DataCmd::Mutate { change, resp } => {
                let name = change.name();
                let result = self.dataset.apply_local(change).map(|event| {
                    if let Some(event) = event {
                        self.dataset.stats.events += 1;
                        self.bus.publish(event);
                    }
                });
                if let Err(e) = &result {
                    tracing::warn!(change = name, error = %e, "local change rejected");
                }
                let _ = resp.send(result);
            }
            DataCmd::Ingest { message, resp } => {
                let peer = message.nodename().clone();
                let kind = message.kind();
                let result = self.dataset.ingest(*message);
                self.after_peer_message(peer, kind, &result);
                let _ = resp.send(result);
            }
            DataCmd::RequestFull { peer, resp } => {
                self.dataset.request_full(&peer);
                let _ = resp.send(());
            }
            DataCmd::DropPeer { peer, resp } => {
                let known = self.dataset.drop_peer(&peer);
                if known {
                    self.hbmode.drop_peer(peer);
                }
                let _ = resp.send(known);
            }
            DataCmd::CommitPending { resp } => {
                let report = self.commit();
                let _ = resp.send(report);
            }
            DataCmd::NextMessage { resp } => {
                let message = self.dataset.next_message();
                self.hbmode.set_local(message.kind());
                let _ = resp.send(message);
            }
        }
    }

    fn after_peer_message(
        &mut self,
        peer: NodeName,
        kind: MessageKind,
        result: &Result<Generation, PeerApplyError>,
    ) {
        match result {
            Ok(_) => self.hbmode.set_peer(peer, kind),
            Err(PeerApplyError::FromSelf { .. }) => {
                tracing::warn!(peer = %peer, kind = %kind, "message from local node name ignored");
            }
            Err(e) => {
                self.dataset.stats.peer_errors += 1;
                tracing::warn!(peer = %peer, kind = %kind, error = %e, "peer message rejected");
                self.hbmode.set_peer(peer, kind);
            }
        }
    }

    fn commit(&mut self) -> CommitReport {
        let report = self.dataset.commit();
        for event in &report.events {
            self.bus.publish(event.clone());
        }
        if let (Some(info), Some(file)) = (&report.nodes_info, &self.nodes_info_file) {
            if let Err(e) = file.write(info) {
                tracing::warn!(error = %e, "nodes info not persisted, will retry");
                self.dataset.nodes_info.clear();
            }
        }
        report
    }
}

/// Cloneable handle to the data actor
#[derive(Debug, Clone)]
pub struct DataHandle {
    tx: mpsc::Sender<DataCmd>,
    shutdown_tx: mpsc::Sender<()>,
    timeout: Duration,
    bus: EventBus,
    local: NodeName,
}

impl std::fmt::Debug for DataCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl DataHandle {
    /// Name of the local node
    pub fn local(&self) -> &NodeName {
        &self.local
    }

    /// Subscribe to cluster events
    pub fn subscribe(&self) -> EventSubscription {
        self.bus.subscribe()
    }

    /// Ask the actor to stop; queued commands are discarded
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    async fn request<T>(
        &self,
        operation: &'static str,
        make: impl FnOnce(oneshot::Sender<T>) -> DataCmd,
    ) -> DataResult<T> {
        let (resp, rx) = oneshot::channel();
        let cmd = make(resp);
        let request = async {
            self.tx.send(cmd).await.map_err(|_| DataError::Closed)?;
            rx.await.map_err(|_| DataError::Dropped { operation })
        };
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| DataError::Timeout {
                operation,
                timeout: self.timeout,
            })?
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Deep copy of the pending snapshot
    pub async fn status(&self) -> DataResult<ClusterSnapshot> {
        self.request("get_status", |resp| DataCmd::GetStatus { resp }).await
    }

    /// Deep copy of one node's data
    pub async fn node_data(&self, node: &NodeName) -> DataResult<Option<NodeData>> {
        let node = node.clone();
        self.request("get_node_data", |resp| DataCmd::GetNodeData { node, resp })
            .await
    }

    /// One node's status
    pub async fn node_status(&self, node: &NodeName) -> DataResult<Option<NodeStatus>> {
        let node = node.clone();
        self.request("get_node_status", |resp| DataCmd::GetNodeStatus { node, resp })
            .await
    }

    /// Labels and paths of every node
    pub async fn nodes_info(&self) -> DataResult<NodesInfo> {
        self.request("get_nodes_info", |resp| DataCmd::GetNodesInfo { resp })
            .await
    }

    /// Paths of every object with an instance somewhere
    pub async fn service_names(&self) -> DataResult<Vec<ObjectPath>> {
        self.request("get_service_names", |resp| DataCmd::GetServiceNames { resp })
            .await
    }

    /// Instrumentation counters
    pub async fn call_stats(&self) -> DataResult<CallStats> {
        self.request("get_call_stats", |resp| DataCmd::GetCallStats { resp })
            .await
    }

    /// Copy of the generation matrix
    pub async fn generation_matrix(&self) -> DataResult<GenerationMatrix> {
        self.request("get_generation_matrix", |resp| DataCmd::GetGenerationMatrix { resp })
            .await
    }

    /// Kind the next outgoing heartbeat would have
    pub async fn heartbeat_mode(&self) -> DataResult<MessageKind> {
        self.request("get_heartbeat_mode", |resp| DataCmd::GetHeartbeatMode { resp })
            .await
    }

    // ========================================================================
    // Local mutations
    // ========================================================================

    /// Apply a local change
    pub async fn mutate(&self, change: LocalChange) -> DataResult<()> {
        let operation = change.name();
        self.request(operation, |resp| DataCmd::Mutate { change, resp })
            .await?
    }

    /// Set an instance configuration
    pub async fn set_instance_config(
        &self,
        path: ObjectPath,
        value: InstanceConfig,
    ) -> DataResult<()> {
        self.mutate(LocalChange::SetInstanceConfig(path, value)).await
    }

    /// Remove an instance configuration
    pub async fn unset_instance_config(&self, path: ObjectPath) -> DataResult<()> {
        self.mutate(LocalChange::UnsetInstanceConfig(path)).await
    }

    /// Set an instance status
    pub async fn set_instance_status(
        &self,
        path: ObjectPath,
        value: InstanceStatus,
    ) -> DataResult<()> {
        self.mutate(LocalChange::SetInstanceStatus(path, value)).await
    }

    /// Remove an instance status
    pub async fn unset_instance_status(&self, path: ObjectPath) -> DataResult<()> {
        self.mutate(LocalChange::UnsetInstanceStatus(path)).await
    }

    /// Set an instance monitor
    pub async fn set_instance_monitor(
        &self,
        path: ObjectPath,
        value: InstanceMonitor,
    ) -> DataResult<()> {
        self.mutate(LocalChange::SetInstanceMonitor(path, value)).await
    }

    /// Remove an instance monitor
    pub async fn unset_instance_monitor(&self, path: ObjectPath) -> DataResult<()> {
        self.mutate(LocalChange::UnsetInstanceMonitor(path)).await
    }

    /// Set the node configuration
    pub async fn set_node_config(&self, value: NodeConfig) -> DataResult<()> {
        self.mutate(LocalChange::SetNodeConfig(value)).await
    }

    /// Remove the node configuration
    pub async fn unset_node_config(&self) -> DataResult<()> {
        self.mutate(LocalChange::UnsetNodeConfig).await
    }

    /// Set the node stats
    pub async fn set_node_stats(&self, value: NodeStats) -> DataResult<()> {
        self.mutate(LocalChange::SetNodeStats(value)).await
    }

    /// Remove the node stats
    pub async fn unset_node_stats(&self) -> DataResult<()> {
        self.mutate(LocalChange::UnsetNodeStats).await
    }

    /// Set the node monitor
    pub async fn set_node_monitor(&self, value: NodeMonitor) -> DataResult<()> {
        self.mutate(LocalChange::SetNodeMonitor(value)).await
    }

    /// Remove the node monitor
    pub async fn unset_node_monitor(&self) -> DataResult<()> {
        self.mutate(LocalChange::UnsetNodeMonitor).await
    }

    /// Freeze the node
    pub async fn set_node_frozen(&self, at: DateTime<Utc>) -> DataResult<()> {
        self.mutate(LocalChange::SetNodeFrozen(at)).await
    }

    /// Thaw the node
    pub async fn unset_node_frozen(&self) -> DataResult<()> {
        self.mutate(LocalChange::UnsetNodeFrozen).await
    }

    /// Replace the node labels
    pub async fn set_node_labels(&self, labels: BTreeMap<String, String>) -> DataResult<()> {
        self.mutate(LocalChange::SetNodeLabels(labels)).await
    }

    /// Replace the node storage paths
    pub async fn set_node_paths(&self, paths: Vec<StoragePath>) -> DataResult<()> {
        self.mutate(LocalChange::SetNodePaths(paths)).await
    }

    /// Set a daemon subsystem status
    pub async fn set_subsystem_status(
        &self,
        name: impl Into<String>,
        value: SubsystemStatus,
    ) -> DataResult<()> {
        self.mutate(LocalChange::SetSubsystemStatus(name.into(), value)).await
    }

    /// Remove a daemon subsystem status
    pub async fn unset_subsystem_status(&self, name: impl Into<String>) -> DataResult<()> {
        self.mutate(LocalChange::UnsetSubsystemStatus(name.into())).await
    }

    /// Set an object aggregated status
    pub async fn set_object_status(&self, path: ObjectPath, value: ObjectStatus) -> DataResult<()> {
        self.mutate(LocalChange::SetObjectStatus(path, value)).await
    }

    /// Remove an object aggregated status
    pub async fn unset_object_status(&self, path: ObjectPath) -> DataResult<()> {
        self.mutate(LocalChange::UnsetObjectStatus(path)).await
    }

    // ========================================================================
    // Replication
    // ========================================================================

    /// Apply a decoded heartbeat from a peer.
    ///
    /// Returns the peer generation now staged. A rejected Patch leaves the
    /// peer in needs-Full.
    pub async fn apply(&self, message: HeartbeatMessage) -> DataResult<Generation> {
        let operation = match message.kind() {
            MessageKind::Full => "apply_full",
            MessageKind::Patch => "apply_patch",
            MessageKind::Ping => "apply_ping",
        };
        let message = Box::new(message);
        Ok(self
            .request(operation, |resp| DataCmd::Ingest { message, resp })
            .await??)
    }

    /// Stage a peer's full snapshot
    pub async fn apply_full(&self, message: FullMessage) -> DataResult<Generation> {
        self.apply(HeartbeatMessage::Full(message)).await
    }

    /// Apply a peer's generation-keyed deltas
    pub async fn apply_patch(&self, message: PatchMessage) -> DataResult<Generation> {
        self.apply(HeartbeatMessage::Patch(message)).await
    }

    /// Record a peer's generation row
    pub async fn apply_ping(&self, message: PingMessage) -> DataResult<Generation> {
        self.apply(HeartbeatMessage::Ping(message)).await
    }

    /// Reset a peer to needs-Full, e.g. after an undecodable payload
    pub async fn request_full(&self, peer: &NodeName) -> DataResult<()> {
        let peer = peer.clone();
        self.request("request_full", |resp| DataCmd::RequestFull { peer, resp })
            .await
    }

    /// Forget a peer that left the cluster; returns whether it was known
    pub async fn drop_peer(&self, peer: &NodeName) -> DataResult<bool> {
        let peer = peer.clone();
        self.request("drop_peer", |resp| DataCmd::DropPeer { peer, resp })
            .await
    }

    /// Commit pending changes and publish events
    pub async fn commit_pending(&self) -> DataResult<CommitReport> {
        self.request("commit_pending", |resp| DataCmd::CommitPending { resp })
            .await
    }

    /// Build the next outgoing heartbeat
    pub async fn next_message(&self) -> DataResult<HeartbeatMessage> {
        self.request("next_message", |resp| DataCmd::NextMessage { resp })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn unserved(queue: usize) -> (DataHandle, mpsc::Receiver<DataCmd>) {
        let (tx, rx) = mpsc::channel(queue);
        let (shutdown_tx, _) = mpsc::channel(1);
        let handle = DataHandle {
            tx,
            shutdown_tx,
            timeout: Duration::from_secs(5),
            bus: EventBus::new(8),
            local: NodeName::from("a"),
        };
        (handle, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_command_times_out() {
        let (data, _rx) = unserved(4);
        assert_matches!(
            data.status().await,
            Err(DataError::Timeout { operation: "get_status", timeout })
                if timeout == Duration::from_secs(5)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_times_out() {
        let (data, mut rx) = unserved(1);
        assert_matches!(data.commit_pending().await, Err(DataError::Timeout { .. }));
        assert_matches!(
            data.next_message().await,
            Err(DataError::Timeout { operation: "next_message", .. })
        );
        assert_matches!(rx.try_recv(), Ok(DataCmd::CommitPending { .. }));
    }

    #[tokio::test]
    async fn dropped_reply_is_reported() {
        let (data, mut rx) = unserved(4);
        let server = tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                drop(cmd);
            }
        });
        assert_matches!(
            data.call_stats().await,
            Err(DataError::Dropped { operation: "get_call_stats" })
        );
        drop(data);
        server.await.unwrap();
    }
}
