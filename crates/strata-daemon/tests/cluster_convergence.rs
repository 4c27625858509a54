//! Multi-node convergence over the in-memory transport.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{HeartbeatMessage, MessageKind, NodeName, PingMessage};
use strata_daemon::{Cluster, Daemon, DaemonConfig, MemoryNetwork, Transport};

const CONVERGE: Duration = Duration::from_secs(10);
const POLL: Duration = Duration::from_millis(20);

fn n(name: &str) -> NodeName {
    NodeName::from(name)
}

fn template(dir: &tempfile::TempDir) -> DaemonConfig {
    let mut config = DaemonConfig {
        var_dir: dir.path().to_path_buf(),
        ..DaemonConfig::default()
    };
    config.heartbeat.interval_ms = 20;
    config.heartbeat.commit_interval_ms = 10;
    config.heartbeat.peer_timeout_ms = 60_000;
    config.data.shutdown_grace_ms = 10;
    config
}

fn labels(value: &str) -> BTreeMap<String, String> {
    [("role".to_string(), value.to_string())].into_iter().collect()
}

async fn label_of(daemon: &Daemon, node: &NodeName) -> Option<String> {
    daemon
        .data()
        .node_status(node)
        .await
        .ok()
        .flatten()
        .and_then(|status| status.labels.get("role").cloned())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_nodes_converge_and_settle_into_patch() {
    let dir = tempfile::tempdir().unwrap();
    let names = [n("a"), n("b"), n("c")];
    let cluster = Cluster::start(template(&dir), &names).await;

    for name in &names {
        let daemon = cluster.node(name).unwrap();
        daemon.data().set_node_labels(labels(name.as_str())).await.unwrap();
    }
    assert!(cluster.wait_converged(CONVERGE, POLL).await.unwrap());

    let a = cluster.node(&n("a")).unwrap();
    assert_eq!(label_of(a, &n("c")).await.as_deref(), Some("c"));

    // steady state: every peer replicates by patch
    let peers = [n("b"), n("c")];
    let deadline = tokio::time::Instant::now() + CONVERGE;
    while !a.hbmode().peers_in(&peers, MessageKind::Patch).await.unwrap() {
        assert!(tokio::time::Instant::now() < deadline, "peers never reached patch mode");
        tokio::time::sleep(POLL).await;
    }

    // a later change travels as a patch
    a.data().set_node_labels(labels("leader")).await.unwrap();
    assert!(cluster.wait_converged(CONVERGE, POLL).await.unwrap());
    let b = cluster.node(&n("b")).unwrap();
    assert_eq!(label_of(b, &n("a")).await.as_deref(), Some("leader"));

    // nodes info cache follows the labels
    let info = DaemonConfig {
        var_dir: dir.path().join("b"),
        ..DaemonConfig::default()
    }
    .nodes_info_file();
    let deadline = tokio::time::Instant::now() + CONVERGE;
    loop {
        let seen = info
            .load()
            .ok()
            .and_then(|info| info.get(&n("a")).and_then(|node| node.labels.get("role").cloned()));
        if seen.as_deref() == Some("leader") {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "nodes info file never updated");
        tokio::time::sleep(POLL).await;
    }

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn restarted_node_is_resynchronized() {
    let dir = tempfile::tempdir().unwrap();
    let names = [n("a"), n("b"), n("c")];
    let mut cluster = Cluster::start(template(&dir), &names).await;

    for name in &names {
        let daemon = cluster.node(name).unwrap();
        for round in 0..3 {
            daemon
                .data()
                .set_node_labels(labels(&format!("{name}-{round}")))
                .await
                .unwrap();
            daemon.data().commit_pending().await.unwrap();
        }
    }
    assert!(cluster.wait_converged(CONVERGE, POLL).await.unwrap());

    // c comes back empty, with a lower generation than its peers remember
    cluster.restart(&n("c")).await;
    let c = cluster.node(&n("c")).unwrap();
    c.data().set_node_labels(labels("reborn")).await.unwrap();

    assert!(cluster.wait_converged(CONVERGE, POLL).await.unwrap());
    for observer in [n("a"), n("b")] {
        let daemon = cluster.node(&observer).unwrap();
        assert_eq!(label_of(daemon, &n("c")).await.as_deref(), Some("reborn"));
    }
    let c = cluster.node(&n("c")).unwrap();
    assert_eq!(label_of(c, &n("a")).await.as_deref(), Some("a-2"));

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn partitioned_node_catches_up_after_heal() {
    let dir = tempfile::tempdir().unwrap();
    let names = [n("a"), n("b")];
    let cluster = Cluster::start(template(&dir), &names).await;
    assert!(cluster.wait_converged(CONVERGE, POLL).await.unwrap());

    cluster.network().set_link(&n("a"), &n("b"), false).await;
    let a = cluster.node(&n("a")).unwrap();
    for round in 0..5 {
        a.data().set_node_labels(labels(&format!("r{round}"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
    let b = cluster.node(&n("b")).unwrap();
    assert_ne!(label_of(b, &n("a")).await.as_deref(), Some("r4"));

    cluster.network().set_link(&n("a"), &n("b"), true).await;
    assert!(cluster.wait_converged(CONVERGE, POLL).await.unwrap());
    assert_eq!(label_of(b, &n("a")).await.as_deref(), Some("r4"));

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn garbage_payload_triggers_full_request() {
    let dir = tempfile::tempdir().unwrap();
    let network = MemoryNetwork::new();
    let mut config = template(&dir);
    config.nodename = n("a");
    config.cluster_nodes = vec![n("a"), n("x")];

    let transport = Arc::new(network.endpoint(n("a")).await);
    let daemon = Daemon::start(&config, transport);
    let x = network.endpoint(n("x")).await;

    x.send(&n("a"), b"not a heartbeat".to_vec()).await.unwrap();
    let deadline = tokio::time::Instant::now() + CONVERGE;
    while daemon.data().call_stats().await.unwrap().full_requests == 0 {
        assert!(tokio::time::Instant::now() < deadline, "no full requested");
        tokio::time::sleep(POLL).await;
    }

    // a ping from x makes a answer with a full
    let ping = HeartbeatMessage::Ping(PingMessage {
        nodename: n("x"),
        generation_matrix_row: [(n("x"), strata_core::Generation::new(1))].into_iter().collect(),
    });
    x.send(&n("a"), ping.encode().unwrap()).await.unwrap();
    let deadline = tokio::time::Instant::now() + CONVERGE;
    loop {
        let inbound = x.receive(Duration::from_millis(200)).await.unwrap();
        if let Some(inbound) = inbound {
            let message = HeartbeatMessage::decode(&inbound.payload).unwrap();
            if message.kind() == MessageKind::Full {
                assert_eq!(message.nodename(), &n("a"));
                break;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "no full received");
    }

    daemon.shutdown().await;
}
