use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use libp2p::identity::Keypair;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::{gossipsub, identify, mdns, ping, relay};
use libp2p_swarm::NetworkBehaviour;

use crate::error::HostError;
use crate::routing::Kademlia;

/// Identify protocol version advertised to peers.
pub const PROTOCOL_VERSION: &str = "/gossip-host/1.0.0";

/// Combined libp2p network behaviour for a gossip host.
///
/// The `#[derive(NetworkBehaviour)]` macro auto-generates a
/// `HostBehaviourEvent` enum with one variant per field.
#[derive(NetworkBehaviour)]
pub struct HostBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kademlia: Kademlia,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    pub relay: Toggle<relay::client::Behaviour>,
}

impl HostBehaviour {
    pub(crate) fn new(
        keypair: &Keypair,
        kademlia: Kademlia,
        relay: Option<relay::client::Behaviour>,
        mdns_interval: Option<Duration>,
    ) -> Result<Self, HostError> {
        let peer_id = keypair.public().to_peer_id();

        // Two participants sending the same text must not be deduplicated,
        // so the id covers author and sequence number as well as payload.
        let message_id_fn = |msg: &gossipsub::Message| {
            let mut s = DefaultHasher::new();
            msg.source.hash(&mut s);
            msg.sequence_number.hash(&mut s);
            msg.data.hash(&mut s);
            gossipsub::MessageId::from(s.finish().to_string())
        };

        let gossipsub_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(Duration::from_secs(1))
            .validation_mode(gossipsub::ValidationMode::Strict)
            .message_id_fn(message_id_fn)
            .build()
            .map_err(|e| HostError::construction("gossipsub config", e))?;

        let gossipsub = gossipsub::Behaviour::new(
            gossipsub::MessageAuthenticity::Signed(keypair.clone()),
            gossipsub_config,
        )
        .map_err(|e| HostError::construction("gossipsub", e))?;

        let identify = identify::Behaviour::new(identify::Config::new(
            PROTOCOL_VERSION.to_string(),
            keypair.public(),
        ));

        let mdns = match mdns_interval {
            Some(query_interval) => {
                let config = mdns::Config {
                    query_interval,
                    ..Default::default()
                };
                Some(
                    mdns::tokio::Behaviour::new(config, peer_id)
                        .map_err(|e| HostError::construction("mdns", e))?,
                )
            }
            None => None,
        };

        Ok(Self {
            gossipsub,
            kademlia,
            identify,
            ping: ping::Behaviour::default(),
            mdns: Toggle::from(mdns),
            relay: Toggle::from(relay),
        })
    }
}
