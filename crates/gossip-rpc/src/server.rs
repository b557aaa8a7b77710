use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use tracing::{debug, info};

use gossip_p2p::{Host, HostError, Multiaddr, PeerInfo, PubSub};

use crate::api::GossipApiServer;
use crate::types::RpcHostInfo;

const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

fn rpc_err(code: i32, msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(code, msg.into(), None::<()>)
}

fn host_err(e: HostError) -> ErrorObject<'static> {
    rpc_err(INTERNAL_ERROR, e.to_string())
}

/// Shared state passed to the RPC server.
pub struct RpcServerState {
    pub host: Host,
    pub pubsub: PubSub,
    /// Topic `gossip_publish` writes to.
    pub topic: String,
}

/// The RPC server implementation.
pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr`. Returns the bound address (port 0
    /// resolves to a real port) and a handle to stop the server.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<(SocketAddr, ServerHandle)> {
        let server = Server::builder().build(addr).await?;
        let bound = server.local_addr()?;
        let module = self.into_rpc();
        let handle = server.start(module);
        info!(addr = %bound, "RPC server started");
        Ok((bound, handle))
    }
}

#[async_trait]
impl GossipApiServer for RpcServer {
    async fn get_host_info(&self) -> RpcResult<RpcHostInfo> {
        let host = &self.state.host;
        let addrs = host.listen_addresses().await.map_err(host_err)?;
        let info = PeerInfo::new(host.local_peer_id(), addrs);
        Ok(RpcHostInfo {
            peer_id: info.peer_id.to_string(),
            listen_addrs: info.addrs.iter().map(ToString::to_string).collect(),
            peer_multiaddrs: info.p2p_addrs().iter().map(ToString::to_string).collect(),
        })
    }

    async fn get_peers(&self) -> RpcResult<Vec<String>> {
        let peers = self.state.host.connected_peers().await.map_err(host_err)?;
        Ok(peers.iter().map(ToString::to_string).collect())
    }

    async fn publish(&self, text: String) -> RpcResult<()> {
        if text.is_empty() {
            return Err(rpc_err(INVALID_PARAMS, "empty message").into());
        }
        self.state
            .pubsub
            .publish(&self.state.topic, text.into_bytes())
            .await
            .map_err(host_err)?;
        debug!(topic = %self.state.topic, "RPC: message published");
        Ok(())
    }

    async fn connect(&self, multiaddr: String) -> RpcResult<String> {
        let addr: Multiaddr = multiaddr
            .parse()
            .map_err(|e| rpc_err(INVALID_PARAMS, format!("invalid multiaddr: {e}")))?;
        let peer = PeerInfo::from_p2p_addr(&addr)
            .map_err(|e| rpc_err(INVALID_PARAMS, e.to_string()))?;
        self.state.host.connect(&peer).await.map_err(host_err)?;
        Ok(peer.peer_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::GossipApiClient;
    use gossip_p2p::{Capabilities, HostBuilder, HostConfig, PUBSUB_TOPIC};
    use jsonrpsee::core::client::Error as ClientError;
    use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};

    async fn serve() -> (Host, ServerHandle, HttpClient) {
        let config = HostConfig {
            listens: vec!["/ip4/127.0.0.1/tcp/0".into()],
            mdns: false,
            disable_relay: true,
            ..HostConfig::default()
        };
        let caps = Capabilities::from_config(&config).unwrap();
        let (host, _routing) = HostBuilder::new(caps).build().await.unwrap();
        let pubsub = PubSub::join(&host).await.unwrap();
        let state = Arc::new(RpcServerState {
            host: host.clone(),
            pubsub,
            topic: PUBSUB_TOPIC.into(),
        });
        let (addr, handle) = RpcServer::new(state)
            .start("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let client = HttpClientBuilder::default()
            .build(format!("http://{addr}"))
            .unwrap();
        (host, handle, client)
    }

    fn error_code(err: ClientError) -> i32 {
        match err {
            ClientError::Call(obj) => obj.code(),
            other => panic!("unexpected client error: {other}"),
        }
    }

    #[tokio::test]
    async fn host_info_lists_dialable_addresses() {
        let (host, handle, client) = serve().await;
        let info = client.get_host_info().await.unwrap();

        assert_eq!(info.peer_id, host.local_peer_id().to_string());
        assert!(!info.listen_addrs.is_empty());
        assert_eq!(info.listen_addrs.len(), info.peer_multiaddrs.len());
        for (listen, dialable) in info.listen_addrs.iter().zip(&info.peer_multiaddrs) {
            assert_eq!(*dialable, format!("{listen}/p2p/{}", info.peer_id));
        }
        assert!(client.get_peers().await.unwrap().is_empty());

        handle.stop().unwrap();
        host.close().await.unwrap();
    }

    #[tokio::test]
    async fn bad_params_are_rejected() {
        let (host, handle, client) = serve().await;

        let err = client.connect("not a multiaddr".into()).await.unwrap_err();
        assert_eq!(error_code(err), INVALID_PARAMS);

        let err = client
            .connect("/ip4/127.0.0.1/tcp/4001".into())
            .await
            .unwrap_err();
        assert_eq!(error_code(err), INVALID_PARAMS);

        let err = client.publish(String::new()).await.unwrap_err();
        assert_eq!(error_code(err), INVALID_PARAMS);

        handle.stop().unwrap();
        host.close().await.unwrap();
    }

    #[tokio::test]
    async fn host_errors_map_to_internal_error() {
        let (host, handle, client) = serve().await;
        host.close().await.unwrap();

        let err = client.get_peers().await.unwrap_err();
        assert_eq!(error_code(err), INTERNAL_ERROR);

        handle.stop().unwrap();
    }
}
