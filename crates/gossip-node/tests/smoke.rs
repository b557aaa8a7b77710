//! End-to-end smoke test for the gossip-host binary.
//!
//! Starts a real host process from a config file, queries it over JSON-RPC,
//! then closes its stdin and expects a clean exit.
//!
//! Run with:
//!   cargo test -p gossip-node --test smoke

use std::io::Write;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

// ── Process lifecycle ─────────────────────────────────────────────────────────

struct HostGuard {
    child: Child,
    dir: PathBuf,
}

impl Drop for HostGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Find a free TCP port on loopback.
fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gossip_host_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_config(dir: &Path, host: serde_json::Value) -> PathBuf {
    let path = dir.join("host.config.json");
    let config = serde_json::json!({ "host": host });
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path
}

fn wait_exit(child: &mut Child, timeout: Duration) -> Option<std::process::ExitStatus> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().unwrap() {
            return Some(status);
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    None
}

// ── RPC helpers ───────────────────────────────────────────────────────────────

async fn rpc_call(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1
    });
    let resp = client
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap_or_else(|e| panic!("RPC call {method} failed: {e}"));
    let json: serde_json::Value = resp.json().await.expect("parse RPC JSON");
    if let Some(err) = json.get("error") {
        panic!("RPC error from {method}: {err}");
    }
    json["result"].clone()
}

/// Poll until the RPC server responds or the timeout elapses.
async fn wait_for_rpc(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": "gossip_getPeers",
        "params": [],
        "id": 1
    });
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.post(url).json(&body).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

// ── Smoke tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn smoke_host_info_and_clean_exit() {
    let dir = temp_dir("smoke");
    let p2p_port = free_port();
    let rpc_port = free_port();
    let config = write_config(
        &dir,
        serde_json::json!({
            "transports": ["tcp"],
            "listens": [format!("/ip4/127.0.0.1/tcp/{p2p_port}")],
            "mdns": false,
            "disableRelay": true
        }),
    );

    let child = Command::new(env!("CARGO_BIN_EXE_gossip-host"))
        .args([
            "--config",
            config.to_str().unwrap(),
            "--rpc-listen",
            &format!("127.0.0.1:{rpc_port}"),
            "--log",
            dir.join("host.log").to_str().unwrap(),
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn gossip-host");
    let mut guard = HostGuard { child, dir };

    let http = reqwest::Client::new();
    let rpc_url = format!("http://127.0.0.1:{rpc_port}");
    assert!(
        wait_for_rpc(&http, &rpc_url, Duration::from_secs(20)).await,
        "gossip-host did not become ready within 20 seconds"
    );

    let info = rpc_call(&http, &rpc_url, "gossip_getHostInfo", serde_json::json!([])).await;
    let peer_id = info["peerId"].as_str().expect("peerId");
    assert_eq!(
        info["listenAddrs"],
        serde_json::json!([format!("/ip4/127.0.0.1/tcp/{p2p_port}")])
    );
    assert_eq!(
        info["peerMultiaddrs"],
        serde_json::json!([format!("/ip4/127.0.0.1/tcp/{p2p_port}/p2p/{peer_id}")])
    );

    let peers = rpc_call(&http, &rpc_url, "gossip_getPeers", serde_json::json!([])).await;
    assert_eq!(peers, serde_json::json!([]));

    // A blank line is ignored; closing stdin stops the host.
    let mut stdin = guard.child.stdin.take().expect("piped stdin");
    stdin.write_all(b"\n").unwrap();
    drop(stdin);

    let status = wait_exit(&mut guard.child, Duration::from_secs(20)).expect("gossip-host did not exit");
    assert!(status.success(), "gossip-host exited with {status}");

    let log = std::fs::read_to_string(guard.dir.join("host.log")).unwrap();
    assert!(log.contains("listening on"));
}

#[tokio::test]
async fn smoke_unknown_transport_exits_nonzero() {
    let dir = temp_dir("bad_transport");
    let config = write_config(
        &dir,
        serde_json::json!({
            "transports": ["smoke-signals"],
            "listens": ["/ip4/127.0.0.1/tcp/0"],
            "mdns": false
        }),
    );

    let child = Command::new(env!("CARGO_BIN_EXE_gossip-host"))
        .args(["--config", config.to_str().unwrap()])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn gossip-host");
    let mut guard = HostGuard { child, dir };

    let status = wait_exit(&mut guard.child, Duration::from_secs(20)).expect("gossip-host did not exit");
    assert!(!status.success());
}
