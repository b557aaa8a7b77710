//! gossip-node
//!
//! Runs a gossip host end to end: builds the host from a [`Config`], joins
//! the chat topic, connects to bootstrap and local peers, then relays lines
//! from an input stream until interrupted or the input ends.
//!
//! [`Config`]: gossip_p2p::Config

pub mod chat;
pub mod orchestrator;

pub use chat::{chat_input_loop, format_message};
pub use orchestrator::{GossipNode, HostInfo, HostState, NodeStatus};
