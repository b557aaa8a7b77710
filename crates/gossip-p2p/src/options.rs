//! Translation of configuration identifiers into host-construction
//! capabilities.
//!
//! Every parser preserves the configured order (it is the preference order)
//! and drops repeated identifiers. An unknown identifier fails the whole
//! parse before any socket is opened.

use std::time::Duration;

use libp2p::Multiaddr;
use tracing::debug;

use crate::config::HostConfig;
use crate::error::{HostError, OptionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOption {
    Tcp,
    WebSocket,
    Quic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxerOption {
    Yamux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityOption {
    Noise,
    Tls,
}

impl TransportOption {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "tcp" => Some(Self::Tcp),
            "ws" | "websocket" => Some(Self::WebSocket),
            "quic" | "quic-v1" => Some(Self::Quic),
            _ => None,
        }
    }

    /// Wildcard listen address used when no listens are configured.
    pub fn default_listen_addr(self) -> Multiaddr {
        let addr = match self {
            Self::Tcp => "/ip4/0.0.0.0/tcp/0",
            Self::WebSocket => "/ip4/0.0.0.0/tcp/0/ws",
            Self::Quic => "/ip4/0.0.0.0/udp/0/quic-v1",
        };
        addr.parse().expect("static multiaddr is valid")
    }

    /// Whether connections on this transport go through the configured
    /// security and muxer upgrades. QUIC brings its own.
    pub fn needs_upgrade(self) -> bool {
        !matches!(self, Self::Quic)
    }
}

impl MuxerOption {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "yamux" | "/yamux/1.0.0" => Some(Self::Yamux),
            _ => None,
        }
    }
}

impl SecurityOption {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "noise" | "/noise" => Some(Self::Noise),
            "tls" | "/tls/1.0.0" => Some(Self::Tls),
            _ => None,
        }
    }
}

pub fn parse_transport_options(names: &[String]) -> Result<Vec<TransportOption>, HostError> {
    parse_ordered(names, OptionKind::Transport, TransportOption::from_name)
}

pub fn parse_muxer_options(names: &[String]) -> Result<Vec<MuxerOption>, HostError> {
    parse_ordered(names, OptionKind::Muxer, MuxerOption::from_name)
}

pub fn parse_security_options(names: &[String]) -> Result<Vec<SecurityOption>, HostError> {
    parse_ordered(names, OptionKind::Security, SecurityOption::from_name)
}

fn parse_ordered<T: PartialEq + Copy + std::fmt::Debug>(
    names: &[String],
    kind: OptionKind,
    lookup: impl Fn(&str) -> Option<T>,
) -> Result<Vec<T>, HostError> {
    let mut parsed = Vec::with_capacity(names.len());
    for name in names {
        let normalized = name.trim().to_ascii_lowercase();
        let option = lookup(&normalized).ok_or_else(|| HostError::UnsupportedOption {
            kind,
            name: name.clone(),
        })?;
        if parsed.contains(&option) {
            debug!(%kind, name = %name, "ignoring repeated option");
            continue;
        }
        parsed.push(option);
    }
    Ok(parsed)
}

/// Everything the host builder needs, derived from a validated [`HostConfig`].
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub transports: Vec<TransportOption>,
    pub muxers: Vec<MuxerOption>,
    pub security: Vec<SecurityOption>,
    pub listens: Vec<Multiaddr>,
    pub disable_relay: bool,
    /// mDNS query interval; `None` leaves local discovery out of the host.
    pub mdns_interval: Option<Duration>,
    /// Upper bound on dialing plus the security and muxer handshakes.
    pub connect_timeout: Duration,
}

impl Capabilities {
    pub fn from_config(config: &HostConfig) -> Result<Self, HostError> {
        let transports = parse_transport_options(&config.transports)?;
        let muxers = parse_muxer_options(&config.muxers)?;
        let security = parse_security_options(&config.security)?;

        if transports.is_empty() {
            return Err(HostError::Configuration("no transports configured".into()));
        }
        if transports.iter().any(|t| t.needs_upgrade()) && (muxers.is_empty() || security.is_empty()) {
            return Err(HostError::Configuration(
                "tcp and websocket transports need at least one muxer and one security protocol"
                    .into(),
            ));
        }

        let mut listens = config.listen_addrs()?;
        if listens.is_empty() {
            listens = transports.iter().map(|t| t.default_listen_addr()).collect();
        }

        Ok(Self {
            transports,
            muxers,
            security,
            listens,
            disable_relay: config.disable_relay,
            mdns_interval: config.mdns_interval(),
            connect_timeout: config.connect_timeout(),
        })
    }

    /// Stream muxer negotiated on upgraded connections.
    pub fn preferred_muxer(&self) -> MuxerOption {
        self.muxers.first().copied().unwrap_or(MuxerOption::Yamux)
    }
}
