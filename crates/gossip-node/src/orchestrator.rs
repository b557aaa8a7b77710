//! Host lifecycle.
//!
//! [`GossipNode::run`] performs the strictly ordered startup sequence, then
//! blocks until the first of an interrupt or the end of chat input, and
//! tears everything down in reverse. Progress is published on a `watch`
//! channel so callers (and tests) can observe it through [`NodeStatus`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use gossip_p2p::routing::Kademlia;
use gossip_p2p::{
    bootstrap_peers, handle_messages, BootstrapPolicy, Capabilities, Config, ConnectNotifee,
    DiscoveryService, Host, HostBuilder, HostError, Keypair, Message, Multiaddr, PeerId, PeerInfo,
    PubSub, RoutingFactory, RoutingTable, Shutdown, ShutdownReason, PUBSUB_TOPIC,
};
use gossip_rpc::{RpcServer, RpcServerState, ServerHandle};

use crate::chat::{chat_input_loop, format_message};

/// Lifecycle of a node. States only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HostState {
    Unconfigured,
    Configuring,
    Listening,
    Routed,
    PubsubActive,
    Discoverable,
    Bootstrapped,
    Running,
    ShuttingDown,
    Closed,
}

/// Identity of the running host, published once it is listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub peer_id: PeerId,
    pub listen_addrs: Vec<Multiaddr>,
    /// Bound JSON-RPC address, once the server is up.
    pub rpc_addr: Option<SocketAddr>,
}

impl HostInfo {
    /// Listen addresses with `/p2p/<peer-id>` appended.
    pub fn p2p_addrs(&self) -> Vec<Multiaddr> {
        PeerInfo::new(self.peer_id, self.listen_addrs.clone()).p2p_addrs()
    }
}

/// Read-only view of a node's progress.
#[derive(Debug, Clone)]
pub struct NodeStatus {
    state: watch::Receiver<HostState>,
    info: watch::Receiver<Option<HostInfo>>,
}

impl NodeStatus {
    pub fn state(&self) -> HostState {
        *self.state.borrow()
    }

    pub fn host_info(&self) -> Option<HostInfo> {
        self.info.borrow().clone()
    }

    /// Wait until the node reaches `target` or stops. Returns the state seen.
    pub async fn wait_for(&mut self, target: HostState) -> HostState {
        if let Ok(state) = self
            .state
            .wait_for(|s| *s >= target || *s == HostState::Closed)
            .await
        {
            return *state;
        }
        // The node was dropped; whatever it last published is final.
        *self.state.borrow()
    }
}

type Input = Box<dyn AsyncBufRead + Unpin + Send>;
type MessageHandler = Box<dyn FnMut(Message) + Send>;

/// A gossip host together with everything it runs.
pub struct GossipNode {
    config: Config,
    input: Option<Input>,
    handler: Option<MessageHandler>,
    routing: Option<RoutingFactory>,
    handle_interrupt: bool,
    shutdown: Shutdown,
    state: watch::Sender<HostState>,
    info: watch::Sender<Option<HostInfo>>,
}

impl GossipNode {
    pub fn new(config: Config) -> Self {
        let (state, _) = watch::channel(HostState::Unconfigured);
        let (info, _) = watch::channel(None);
        Self {
            config,
            input: None,
            handler: None,
            routing: None,
            handle_interrupt: true,
            shutdown: Shutdown::new(),
            state,
            info,
        }
    }

    /// Read chat lines from `input` instead of stdin.
    pub fn with_input(mut self, input: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    /// Handle received messages with `handler` instead of printing them.
    pub fn with_message_handler(mut self, handler: impl FnMut(Message) + Send + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn with_routing<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&Keypair) -> Result<Kademlia, HostError> + Send + 'static,
    {
        self.routing = Some(Box::new(factory));
        self
    }

    /// Do not install the Ctrl+C watcher.
    pub fn without_interrupt_handler(mut self) -> Self {
        self.handle_interrupt = false;
        self
    }

    /// The token that stops this node. Triggering it before `run` makes
    /// `run` stop as soon as startup completes.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            state: self.state.subscribe(),
            info: self.info.subscribe(),
        }
    }

    /// Start the node and run it until shutdown.
    ///
    /// Configuration problems fail before any network resource exists.
    /// Later startup failures close the host before being returned.
    pub async fn run(self) -> Result<ShutdownReason, HostError> {
        let GossipNode {
            config,
            input,
            handler,
            routing,
            handle_interrupt,
            shutdown,
            state,
            info,
        } = self;

        state.send_replace(HostState::Configuring);
        config.validate()?;
        let caps = Capabilities::from_config(&config.host)?;
        let plan = Plan {
            peers: config.host.bootstrap_peers()?,
            policy: match config.host.max_bootstrap_failures {
                Some(max) => BootstrapPolicy::max_failures(max),
                None => BootstrapPolicy::tolerate_all(),
            },
            mdns: caps.mdns_interval.is_some(),
            rpc_addr: config.rpc.listen_addr()?,
            input,
            handler,
            handle_interrupt,
        };

        let mut builder = HostBuilder::new(caps);
        if let Some(routing) = routing {
            builder = builder.with_routing(routing);
        }
        let (host, routing) = builder.build().await?;
        state.send_replace(HostState::Listening);
        state.send_replace(HostState::Routed);

        let startup = Startup {
            host: &host,
            shutdown: &shutdown,
            state: &state,
            info: &info,
        };
        let services = match startup.start_services(routing, plan).await {
            Ok(services) => services,
            Err(e) => {
                shutdown.trigger(ShutdownReason::Requested);
                state.send_replace(HostState::ShuttingDown);
                if let Err(close_err) = host.close().await {
                    warn!(error = %close_err, "closing host after failed startup");
                }
                state.send_replace(HostState::Closed);
                return Err(e);
            }
        };
        state.send_replace(HostState::Running);
        info!(peer_id = %host.local_peer_id(), "host running");

        let reason = shutdown.cancelled().await;
        match reason {
            ShutdownReason::Interrupt => info!("received stop signal, shutting down"),
            ShutdownReason::InputClosed => info!("input closed, shutting down"),
            ShutdownReason::Requested => info!("shutting down"),
        }
        state.send_replace(HostState::ShuttingDown);
        services.stop().await;
        let closed = host.close().await;
        state.send_replace(HostState::Closed);
        closed?;
        Ok(reason)
    }
}

/// Everything decided from the config before the host is built.
struct Plan {
    peers: Vec<PeerInfo>,
    policy: BootstrapPolicy,
    mdns: bool,
    rpc_addr: Option<SocketAddr>,
    input: Option<Input>,
    handler: Option<MessageHandler>,
    handle_interrupt: bool,
}

struct Startup<'a> {
    host: &'a Host,
    shutdown: &'a Shutdown,
    state: &'a watch::Sender<HostState>,
    info: &'a watch::Sender<Option<HostInfo>>,
}

/// Long-lived tasks started around the host.
struct Services {
    messages: JoinHandle<()>,
    chat: JoinHandle<()>,
    discovery: Option<DiscoveryService>,
    rpc: Option<ServerHandle>,
}

impl Startup<'_> {
    /// Startup steps that need the host, in order.
    async fn start_services(&self, routing: RoutingTable, plan: Plan) -> Result<Services, HostError> {
        let host = self.host;

        let pubsub = PubSub::join(host).await?;
        let subscription = pubsub.subscribe(PUBSUB_TOPIC).await?;
        let handler: MessageHandler = match plan.handler {
            Some(handler) => handler,
            None => Box::new(|message: Message| {
                println!("{}", format_message(&message, chrono::Local::now()));
            }),
        };
        let messages = tokio::spawn(handle_messages(subscription, self.shutdown.clone(), handler));
        self.state.send_replace(HostState::PubsubActive);

        let listen_addrs = host.listen_addresses().await?;
        for addr in &listen_addrs {
            info!(%addr, "listening on");
        }
        self.info.send_replace(Some(HostInfo {
            peer_id: host.local_peer_id(),
            listen_addrs,
            rpc_addr: None,
        }));

        let report = bootstrap_peers(host, &plan.peers, plan.policy).await?;
        if report.attempted > 0 {
            info!(
                connected = report.connected.len(),
                failed = report.failed.len(),
                "bootstrap peers contacted"
            );
        }

        let discovery = if plan.mdns {
            let service = DiscoveryService::start(host, self.shutdown.clone()).await?;
            service.register_notifee(ConnectNotifee::new(host.clone())).await;
            Some(service)
        } else {
            info!("local discovery disabled");
            None
        };
        self.state.send_replace(HostState::Discoverable);

        routing.bootstrap().await?;
        self.state.send_replace(HostState::Bootstrapped);

        let rpc = match plan.rpc_addr {
            Some(addr) => Some(self.start_rpc(addr, pubsub.clone()).await?),
            None => None,
        };

        let input: Input = match plan.input {
            Some(input) => input,
            None => Box::new(BufReader::new(tokio::io::stdin())),
        };
        let chat = tokio::spawn(chat_input_loop(
            input,
            pubsub,
            PUBSUB_TOPIC.to_string(),
            self.shutdown.clone(),
        ));

        if plan.handle_interrupt {
            tokio::spawn(watch_interrupt(self.shutdown.clone()));
        }

        Ok(Services {
            messages,
            chat,
            discovery,
            rpc,
        })
    }

    async fn start_rpc(&self, addr: SocketAddr, pubsub: PubSub) -> Result<ServerHandle, HostError> {
        let rpc_state = Arc::new(RpcServerState {
            host: self.host.clone(),
            pubsub,
            topic: PUBSUB_TOPIC.into(),
        });
        let (bound, handle) = RpcServer::new(rpc_state)
            .start(addr)
            .await
            .map_err(|e| HostError::Construction(format!("starting RPC server on {addr}: {e:#}")))?;
        self.info.send_modify(|info| {
            if let Some(info) = info {
                info.rpc_addr = Some(bound);
            }
        });
        Ok(handle)
    }
}

impl Services {
    async fn stop(self) {
        if let Some(rpc) = self.rpc {
            if rpc.stop().is_ok() {
                rpc.stopped().await;
            }
            debug!("RPC server stopped");
        }
        if let Some(discovery) = self.discovery {
            discovery.stopped().await;
        }
        let _ = self.messages.await;
        let _ = self.chat.await;
    }
}

async fn watch_interrupt(shutdown: Shutdown) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                shutdown.trigger(ShutdownReason::Interrupt);
            }
            Err(e) => warn!(error = %e, "cannot listen for interrupt signal"),
        },
    }
}
