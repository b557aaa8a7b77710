//! gossip-p2p
//!
//! libp2p host assembly for gossip-host nodes.
//!
//! Option parsers turn configuration identifiers into a capability set, from
//! which `HostBuilder` builds the swarm: TCP/WebSocket/QUIC transports,
//! Kademlia routing, GossipSub, mDNS discovery and an optional relay client.
//! The resulting `Host` is a handle to a driver task owning the swarm.

pub mod behaviour;
pub mod bootstrap;
pub mod config;
pub mod discovery;
pub mod error;
pub mod host;
pub mod options;
pub mod peer;
pub mod pubsub;
pub mod routing;
pub mod security;
pub mod shutdown;
pub mod transport;

pub use bootstrap::{bootstrap_peers, BootstrapPolicy, BootstrapReport};
pub use config::{Config, HostConfig, Overrides, RpcConfig};
pub use discovery::{ConnectNotifee, Dialer, DiscoveryService, Notifee};
pub use error::{HostError, OptionKind};
pub use host::{Host, HostBuilder};
pub use options::{
    parse_muxer_options, parse_security_options, parse_transport_options, Capabilities,
    MuxerOption, SecurityOption, TransportOption,
};
pub use peer::PeerInfo;
pub use pubsub::{handle_messages, Message, PubSub, Subscription, PUBSUB_TOPIC};
pub use routing::{default_routing, RoutingFactory, RoutingTable};
pub use shutdown::{Shutdown, ShutdownReason};

// Re-exported so downstream crates name the same libp2p types.
pub use libp2p::{identity::Keypair, Multiaddr, PeerId};
