use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::peer::PeerInfo;

/// Allowed range for the mDNS rediscovery interval, in seconds.
pub const MDNS_INTERVAL_BOUNDS: (u64, u64) = (1, 3600);

/// Configuration for a gossip host, as loaded from `host.config.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub host: HostConfig,
    pub rpc: RpcConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
    /// Transport identifiers in preference order (e.g. `["tcp", "quic"]`).
    pub transports: Vec<String>,
    /// Stream multiplexer identifiers in preference order.
    pub muxers: Vec<String>,
    /// Security protocol identifiers in preference order.
    pub security: Vec<String>,
    /// Listen multiaddrs. Empty means one wildcard address per transport.
    pub listens: Vec<String>,
    /// Static bootstrap peers as `/…/p2p/<peer-id>` multiaddrs.
    pub peers: Vec<String>,
    pub disable_relay: bool,
    /// Announce and discover peers on the local network.
    pub mdns: bool,
    pub mdns_interval_secs: u64,
    /// Unreachable bootstrap peers tolerated before startup fails.
    /// Unset tolerates any number of failures.
    pub max_bootstrap_failures: Option<usize>,
    /// Seconds allowed for one connection attempt, handshakes included.
    pub connect_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            transports: vec!["tcp".into()],
            muxers: vec!["yamux".into()],
            security: vec!["noise".into()],
            listens: vec!["/ip4/0.0.0.0/tcp/0".into()],
            peers: Vec::new(),
            disable_relay: false,
            mdns: true,
            mdns_interval_secs: 10,
            max_bootstrap_failures: None,
            connect_timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RpcConfig {
    /// JSON-RPC listen address (e.g. `127.0.0.1:8080`). Unset disables RPC.
    pub listen: Option<String>,
}

/// Command-line overrides applied on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Comma-separated listen multiaddrs.
    pub listens: Option<String>,
    /// Comma-separated peer multiaddrs.
    pub peers: Option<String>,
    pub rpc_listen: Option<String>,
}

impl Config {
    /// Read a JSON config file, apply overrides and validate the result.
    pub fn load(path: &Path, overrides: &Overrides) -> Result<Self, HostError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            HostError::Configuration(format!("reading {}: {e}", path.display()))
        })?;
        let mut config = Self::from_json(&json)?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, HostError> {
        serde_json::from_str(json)
            .map_err(|e| HostError::Configuration(format!("parsing config JSON: {e}")))
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(listens) = overrides.listens.as_deref().filter(|s| !s.trim().is_empty()) {
            self.host.listens = split_list(listens);
        }
        if let Some(peers) = overrides.peers.as_deref().filter(|s| !s.trim().is_empty()) {
            self.host.peers = split_list(peers);
        }
        if let Some(rpc) = overrides.rpc_listen.as_deref().filter(|s| !s.trim().is_empty()) {
            self.rpc.listen = Some(rpc.trim().to_string());
        }
    }

    /// Structural checks that need no network resources.
    ///
    /// Option identifiers are checked later by the option parsers so that an
    /// unknown name surfaces as [`HostError::UnsupportedOption`].
    pub fn validate(&self) -> Result<(), HostError> {
        let host = &self.host;
        if host.transports.is_empty() {
            return Err(HostError::Configuration("no transports configured".into()));
        }
        let (min, max) = MDNS_INTERVAL_BOUNDS;
        if !(min..=max).contains(&host.mdns_interval_secs) {
            return Err(HostError::Configuration(format!(
                "mdnsIntervalSecs must be within {min}..={max}, got {}",
                host.mdns_interval_secs
            )));
        }
        if host.connect_timeout_secs == 0 {
            return Err(HostError::Configuration(
                "connectTimeoutSecs must be at least 1".into(),
            ));
        }
        host.listen_addrs()?;
        host.bootstrap_peers()?;
        self.rpc.listen_addr()?;
        Ok(())
    }
}

impl HostConfig {
    pub fn listen_addrs(&self) -> Result<Vec<Multiaddr>, HostError> {
        self.listens
            .iter()
            .map(|s| {
                s.trim().parse::<Multiaddr>().map_err(|e| {
                    HostError::Configuration(format!("invalid listen address {s:?}: {e}"))
                })
            })
            .collect()
    }

    pub fn bootstrap_peers(&self) -> Result<Vec<PeerInfo>, HostError> {
        self.peers.iter().map(|s| s.parse()).collect()
    }

    /// Rediscovery interval when mDNS is enabled.
    pub fn mdns_interval(&self) -> Option<Duration> {
        self.mdns.then(|| Duration::from_secs(self.mdns_interval_secs))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl RpcConfig {
    pub fn listen_addr(&self) -> Result<Option<SocketAddr>, HostError> {
        self.listen
            .as_deref()
            .map(|s| {
                s.trim().parse::<SocketAddr>().map_err(|e| {
                    HostError::Configuration(format!("invalid RPC listen address {s:?}: {e}"))
                })
            })
            .transpose()
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}
