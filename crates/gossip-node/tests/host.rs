//! Lifecycle tests for the gossip-node orchestrator.
//!
//! Nodes listen on loopback with mDNS off; chat input comes from in-memory
//! duplex pipes so each test controls when input ends.
//!
//! Run with:
//!   cargo test -p gossip-node --test host

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use gossip_node::{GossipNode, HostState, NodeStatus};
use gossip_p2p::{
    default_routing, Config, HostError, Keypair, OptionKind, Overrides, PeerId, ShutdownReason,
};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(20);

// ── Helpers ───────────────────────────────────────────────────────────────────

fn loopback_config() -> Config {
    let mut config = Config::default();
    config.host.listens = vec!["/ip4/127.0.0.1/tcp/0".into()];
    config.host.mdns = false;
    config.host.disable_relay = true;
    config
}

/// A node fed from an in-memory pipe. Dropping the returned writer ends its input.
fn piped(config: Config) -> (GossipNode, DuplexStream) {
    let (writer, reader) = tokio::io::duplex(4096);
    let node = GossipNode::new(config)
        .with_input(BufReader::new(reader))
        .without_interrupt_handler();
    (node, writer)
}

fn spawn(node: GossipNode) -> (NodeStatus, JoinHandle<Result<ShutdownReason, HostError>>) {
    let status = node.status();
    (status, tokio::spawn(node.run()))
}

async fn wait_running(status: &mut NodeStatus) {
    let state = tokio::time::timeout(STARTUP_TIMEOUT, status.wait_for(HostState::Running))
        .await
        .expect("node did not start in time");
    assert_eq!(state, HostState::Running);
}

async fn join(task: JoinHandle<Result<ShutdownReason, HostError>>) -> Result<ShutdownReason, HostError> {
    tokio::time::timeout(STARTUP_TIMEOUT, task)
        .await
        .expect("node did not stop in time")
        .expect("node task panicked")
}

fn unreachable_peer() -> String {
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    format!("/ip4/127.0.0.1/tcp/{port}/p2p/{}", PeerId::random())
}

// ── Startup ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn example_config_reaches_running() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../host.config.json");
    let overrides = Overrides {
        listens: Some("/ip4/127.0.0.1/tcp/0,/ip4/127.0.0.1/tcp/0/ws".into()),
        rpc_listen: Some("127.0.0.1:0".into()),
        ..Overrides::default()
    };
    let mut config = Config::load(&path, &overrides).unwrap();
    config.host.mdns = false;

    let (node, writer) = piped(config);
    let (mut status, task) = spawn(node);
    wait_running(&mut status).await;

    let info = status.host_info().expect("host info published");
    assert_eq!(info.listen_addrs.len(), 2);
    assert!(info.rpc_addr.is_some());
    assert_eq!(info.p2p_addrs().len(), 2);

    drop(writer);
    assert_eq!(join(task).await.unwrap(), ShutdownReason::InputClosed);
    assert_eq!(status.state(), HostState::Closed);
}

#[tokio::test]
async fn unsupported_transport_fails_before_listening() {
    let mut config = loopback_config();
    config.host.transports = vec!["tcp".into(), "carrier-pigeon".into()];
    let (node, _writer) = piped(config);
    let status = node.status();

    match node.run().await {
        Err(HostError::UnsupportedOption { kind, name }) => {
            assert_eq!(kind, OptionKind::Transport);
            assert_eq!(name, "carrier-pigeon");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(status.state(), HostState::Configuring);
    assert!(status.host_info().is_none());
}

#[tokio::test]
async fn empty_transports_are_a_configuration_error() {
    let mut config = loopback_config();
    config.host.transports.clear();
    let (node, _writer) = piped(config);
    let status = node.status();

    assert!(matches!(node.run().await, Err(HostError::Configuration(_))));
    assert_eq!(status.state(), HostState::Configuring);
}

#[tokio::test]
async fn routing_factory_is_invoked_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (node, writer) = piped(loopback_config());
    let node = node.with_routing({
        let calls = Arc::clone(&calls);
        move |keypair: &Keypair| {
            calls.fetch_add(1, Ordering::SeqCst);
            default_routing(keypair)
        }
    });
    let (mut status, task) = spawn(node);
    wait_running(&mut status).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    drop(writer);
    join(task).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ── Bootstrap policy ──────────────────────────────────────────────────────────

#[tokio::test]
async fn unreachable_bootstrap_peers_are_tolerated_by_default() {
    let mut config = loopback_config();
    config.host.peers = vec![unreachable_peer(), unreachable_peer()];
    let (node, writer) = piped(config);
    let (mut status, task) = spawn(node);
    wait_running(&mut status).await;

    drop(writer);
    assert_eq!(join(task).await.unwrap(), ShutdownReason::InputClosed);
}

#[tokio::test]
async fn exceeding_the_failure_threshold_aborts_startup() {
    let mut config = loopback_config();
    config.host.peers = vec![unreachable_peer()];
    config.host.max_bootstrap_failures = Some(0);
    let (node, _writer) = piped(config);
    let (status, task) = spawn(node);

    match join(task).await {
        Err(HostError::Bootstrap {
            failed,
            attempted,
            tolerated,
        }) => assert_eq!((failed, attempted, tolerated), (1, 1, 0)),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(status.state(), HostState::Closed);
}

// ── Shutdown ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn interrupt_closes_the_host_without_waiting_for_input() {
    let (node, _writer) = piped(loopback_config());
    let shutdown = node.shutdown();
    let (mut status, task) = spawn(node);
    wait_running(&mut status).await;

    // Input stays open; only the interrupt should stop the node.
    assert!(shutdown.trigger(ShutdownReason::Interrupt));
    assert_eq!(join(task).await.unwrap(), ShutdownReason::Interrupt);
    assert_eq!(status.state(), HostState::Closed);
}

#[tokio::test]
async fn empty_input_shuts_down_with_input_closed() {
    let (node, writer) = piped(loopback_config());
    drop(writer);
    let (status, task) = spawn(node);

    assert_eq!(join(task).await.unwrap(), ShutdownReason::InputClosed);
    assert_eq!(status.state(), HostState::Closed);
}

// ── Chat ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_lines_reach_the_other_node() {
    let (received_tx, mut received) = mpsc::unbounded_channel();
    let (alice, alice_input) = piped(loopback_config());
    let alice = alice.with_message_handler(move |msg| {
        let _ = received_tx.send(msg);
    });
    let (mut alice_status, alice_task) = spawn(alice);
    wait_running(&mut alice_status).await;
    let alice_info = alice_status.host_info().unwrap();

    let mut config = loopback_config();
    config.host.peers = alice_info.p2p_addrs().iter().map(ToString::to_string).collect();
    let (bob, mut bob_input) = piped(config);
    let (mut bob_status, bob_task) = spawn(bob);
    wait_running(&mut bob_status).await;
    let bob_id = bob_status.host_info().unwrap().peer_id;

    // Publishing fails until the gossip mesh has formed; keep writing.
    let msg = tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            bob_input.write_all(b"hello alice\n").await.unwrap();
            if let Ok(Some(msg)) =
                tokio::time::timeout(Duration::from_millis(500), received.recv()).await
            {
                return msg;
            }
        }
    })
    .await
    .expect("chat line never arrived");

    assert_eq!(msg.data, b"hello alice");
    assert_eq!(msg.from, Some(bob_id));

    drop(bob_input);
    drop(alice_input);
    assert_eq!(join(bob_task).await.unwrap(), ShutdownReason::InputClosed);
    assert_eq!(join(alice_task).await.unwrap(), ShutdownReason::InputClosed);
}
