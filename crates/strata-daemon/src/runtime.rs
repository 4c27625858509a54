//! Daemon runtime.
//!
//! Wires the data actor to a transport with three loops:
//!
//! - **commit**: commits pending changes on a fixed cadence
//! - **heartbeat**: builds the next message and sends it to every peer
//! - **receive**: decodes inbound payloads, applies them and drops peers that
//!   stayed silent past the peer timeout

use crate::config::DaemonConfig;
use crate::transport::{Inbound, Transport, TransportError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{HeartbeatMessage, NodeName};
use strata_data::{DataActor, DataError, DataHandle, EventBus, HbModeHandle};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A running node
pub struct Daemon {
    nodename: NodeName,
    data: DataHandle,
    hbmode: HbModeHandle,
    bus: EventBus,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    hbmode_task: JoinHandle<()>,
}

impl Daemon {
    /// Start the data actor, the mode cache and the runtime loops
    pub fn start(config: &DaemonConfig, transport: Arc<dyn Transport>) -> Self {
        let data_config = config.data_config();
        let bus = EventBus::new(data_config.event_buffer);
        let (hbmode, hbmode_task) =
            HbModeHandle::spawn(data_config.queue_size, data_config.command_timeout);
        let (data, data_task) = DataActor::spawn(
            config.nodename.clone(),
            data_config,
            hbmode.clone(),
            bus.clone(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let peers: Vec<NodeName> = config.peers().cloned().collect();
        tracing::info!(
            node = %config.nodename,
            peers = peers.len(),
            transport = transport.transport_type(),
            "daemon starting"
        );

        let tasks = vec![
            data_task,
            tokio::spawn(commit_loop(
                data.clone(),
                config.commit_interval(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(heartbeat_loop(
                data.clone(),
                transport.clone(),
                peers,
                config.heartbeat_interval(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(receive_loop(
                data.clone(),
                transport,
                config.peer_timeout(),
                shutdown_rx,
            )),
        ];

        Self {
            nodename: config.nodename.clone(),
            data,
            hbmode,
            bus,
            shutdown_tx,
            tasks,
            hbmode_task,
        }
    }

    /// Local node name
    pub fn nodename(&self) -> &NodeName {
        &self.nodename
    }

    /// Handle to the data actor
    pub fn data(&self) -> &DataHandle {
        &self.data
    }

    /// Handle to the heartbeat mode cache
    pub fn hbmode(&self) -> &HbModeHandle {
        &self.hbmode
    }

    /// Event bus fed by the data actor
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Stop the loops, then the data actor, and wait for every task
    pub async fn shutdown(self) {
        let Self {
            nodename,
            data,
            hbmode,
            shutdown_tx,
            tasks,
            hbmode_task,
            ..
        } = self;
        let _ = shutdown_tx.send(true);
        data.shutdown().await;
        drop(data);
        drop(hbmode);
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(node = %nodename, error = %e, "daemon task failed");
            }
        }
        // outlives the daemon while callers still hold mode cache handles
        hbmode_task.abort();
        tracing::info!(node = %nodename, "daemon stopped");
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn commit_loop(data: DataHandle, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => match data.commit_pending().await {
                Ok(report) if report.advanced => {
                    tracing::trace!(
                        gen = %report.generation,
                        events = report.events.len(),
                        "commit"
                    );
                }
                Ok(_) => {}
                Err(DataError::Closed) => break,
                Err(e) => tracing::warn!(error = %e, "commit failed"),
            },
        }
    }
}

async fn heartbeat_loop(
    data: DataHandle,
    transport: Arc<dyn Transport>,
    peers: Vec<NodeName>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                let message = match data.next_message().await {
                    Ok(message) => message,
                    Err(DataError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot build heartbeat");
                        continue;
                    }
                };
                let payload = match message.encode() {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot encode heartbeat");
                        continue;
                    }
                };
                for peer in &peers {
                    if let Err(e) = transport.send(peer, payload.clone()).await {
                        tracing::debug!(peer = %peer, error = %e, "heartbeat not sent");
                    }
                }
                tracing::trace!(kind = %message.kind(), bytes = payload.len(), "heartbeat sent");
            }
        }
    }
}

async fn receive_loop(
    data: DataHandle,
    transport: Arc<dyn Transport>,
    peer_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut last_seen: BTreeMap<NodeName, Instant> = BTreeMap::new();
    let mut sweep = ticker(peer_timeout / 2);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sweep.tick() => {
                let now = Instant::now();
                let silent: Vec<NodeName> = last_seen
                    .iter()
                    .filter(|(_, seen)| now.duration_since(**seen) > peer_timeout)
                    .map(|(peer, _)| peer.clone())
                    .collect();
                for peer in silent {
                    last_seen.remove(&peer);
                    tracing::info!(peer = %peer, "peer timed out");
                    if let Err(e) = data.drop_peer(&peer).await {
                        tracing::warn!(peer = %peer, error = %e, "cannot drop peer");
                    }
                }
            }
            received = transport.receive(peer_timeout) => match received {
                Ok(Some(inbound)) => {
                    last_seen.insert(inbound.from.clone(), Instant::now());
                    if let Err(DataError::Closed) = handle_inbound(&data, inbound).await {
                        break;
                    }
                }
                Ok(None) => {}
                Err(TransportError::Closed) => {
                    tracing::info!("transport closed, receive loop stopping");
                    break;
                }
                Err(e) => tracing::debug!(error = %e, "receive failed"),
            },
        }
    }
}

async fn handle_inbound(data: &DataHandle, inbound: Inbound) -> Result<(), DataError> {
    let Inbound { from, payload } = inbound;
    let message = match HeartbeatMessage::decode(&payload) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(peer = %from, error = %e, "undecodable heartbeat, requesting full");
            return data.request_full(&from).await;
        }
    };
    if message.nodename() != &from {
        tracing::warn!(
            peer = %from,
            claimed = %message.nodename(),
            "heartbeat sender mismatch, ignored"
        );
        return Ok(());
    }
    match data.apply(message).await {
        Ok(_) | Err(DataError::Peer(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
