use serde::{Deserialize, Serialize};

/// Identity returned by `gossip_getHostInfo`.
///
/// `peer_multiaddrs` are the listen addresses with `/p2p/<PeerId>` appended;
/// other hosts pass one of them as `--peers` to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcHostInfo {
    pub peer_id: String,
    pub listen_addrs: Vec<String>,
    pub peer_multiaddrs: Vec<String>,
}
