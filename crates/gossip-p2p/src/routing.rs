use std::time::Duration;

use libp2p::identity::Keypair;
use libp2p::kad::{self, store::MemoryStore};
use libp2p::StreamProtocol;
use tokio::sync::{mpsc, oneshot};

use crate::error::HostError;
use crate::host::Command;

/// Kademlia protocol shared with the wider libp2p DHT.
pub const KAD_PROTOCOL: StreamProtocol = StreamProtocol::new("/ipfs/kad/1.0.0");

pub type Kademlia = kad::Behaviour<MemoryStore>;

/// Creates the routing behaviour for a host that is being built.
///
/// Invoked exactly once, inside [`HostBuilder::build`](crate::HostBuilder::build),
/// with the identity of the host under construction.
pub type RoutingFactory = Box<dyn FnOnce(&Keypair) -> Result<Kademlia, HostError> + Send>;

/// Kademlia with an in-memory record store and a one-minute query timeout.
pub fn default_routing(keypair: &Keypair) -> Result<Kademlia, HostError> {
    let peer_id = keypair.public().to_peer_id();
    let mut config = kad::Config::new(KAD_PROTOCOL);
    config.set_query_timeout(Duration::from_secs(60));
    let store = MemoryStore::new(peer_id);
    Ok(kad::Behaviour::with_config(peer_id, store, config))
}

/// Handle to the routing table installed in a host.
///
/// Only obtainable from [`HostBuilder::build`](crate::HostBuilder::build), so
/// it can never be bootstrapped before its host exists.
#[derive(Clone)]
pub struct RoutingTable {
    commands: mpsc::Sender<Command>,
}

impl RoutingTable {
    pub(crate) fn new(commands: mpsc::Sender<Command>) -> Self {
        Self { commands }
    }

    /// Populate the routing table by querying the peers it already knows.
    ///
    /// An empty table is not an error: peers found later through bootstrap
    /// connections or discovery are added as they identify themselves.
    pub async fn bootstrap(&self) -> Result<(), HostError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::BootstrapRouting(reply))
            .await
            .map_err(|_| HostError::HostClosed)?;
        rx.await.map_err(|_| HostError::HostClosed)?
    }
}
