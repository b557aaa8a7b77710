//! gossip-rpc
//!
//! JSON-RPC 2.0 control surface for a running gossip host.
//!
//! Namespace: "gossip"
//! Methods:
//!   gossip_getHostInfo  peer id, listen addresses and dialable multiaddrs
//!   gossip_getPeers     currently connected peer ids
//!   gossip_publish      publish a UTF-8 message on the chat topic
//!   gossip_connect      connect to a `/p2p/` multiaddr

pub mod api;
pub mod server;
pub mod types;

pub use server::RpcServer;
pub use server::RpcServerState;
pub use types::RpcHostInfo;

pub use jsonrpsee::server::ServerHandle;
