use std::fmt;
use std::str::FromStr;

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};

use crate::error::HostError;

/// A remote peer: its identity plus the addresses it can be dialed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub peer_id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

impl PeerInfo {
    pub fn new(peer_id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { peer_id, addrs }
    }

    /// Split a `/…/p2p/<peer-id>` multiaddr into identity and transport address.
    pub fn from_p2p_addr(addr: &Multiaddr) -> Result<Self, HostError> {
        let mut transport = addr.clone();
        match transport.pop() {
            Some(Protocol::P2p(peer_id)) => {
                let addrs = if transport.is_empty() { Vec::new() } else { vec![transport] };
                Ok(Self { peer_id, addrs })
            }
            _ => Err(HostError::Configuration(format!(
                "peer address {addr} does not end with /p2p/<peer-id>"
            ))),
        }
    }

    /// Full dialable addresses including the `/p2p/` suffix.
    pub fn p2p_addrs(&self) -> Vec<Multiaddr> {
        self.addrs
            .iter()
            .map(|a| a.clone().with(Protocol::P2p(self.peer_id)))
            .collect()
    }
}

impl FromStr for PeerInfo {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: Multiaddr = s
            .trim()
            .parse()
            .map_err(|e| HostError::Configuration(format!("invalid peer address {s:?}: {e}")))?;
        Self::from_p2p_addr(&addr)
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addrs.first() {
            Some(addr) => write!(f, "{addr}/p2p/{}", self.peer_id),
            None => write!(f, "/p2p/{}", self.peer_id),
        }
    }
}
