use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::RpcHostInfo;

/// Gossip host JSON-RPC 2.0 API definition.
///
/// All method names are prefixed with "gossip_" via `namespace = "gossip"`.
#[rpc(server, client, namespace = "gossip")]
pub trait GossipApi {
    /// Return this host's identity and the addresses peers can dial it on.
    #[method(name = "getHostInfo")]
    async fn get_host_info(&self) -> RpcResult<RpcHostInfo>;

    /// Return the peer ids of every open connection.
    #[method(name = "getPeers")]
    async fn get_peers(&self) -> RpcResult<Vec<String>>;

    /// Publish `text` on the host's topic.
    #[method(name = "publish")]
    async fn publish(&self, text: String) -> RpcResult<()>;

    /// Connect to a peer given as `/…/p2p/<peer-id>`. Returns the peer id.
    #[method(name = "connect")]
    async fn connect(&self, multiaddr: String) -> RpcResult<String>;
}
