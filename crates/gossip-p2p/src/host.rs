//! The local network participant.
//!
//! A [`Host`] is a cheap, cloneable handle. The libp2p `Swarm` itself is
//! owned by a driver task that serializes every operation through a command
//! channel and answers on `oneshot` replies.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use libp2p::gossipsub::{self, IdentTopic, TopicHash};
use libp2p::identity::Keypair;
use libp2p::swarm::dial_opts::{DialOpts, PeerCondition};
use libp2p::swarm::{DialError, SwarmEvent};
use libp2p::{identify, kad, mdns, Multiaddr, PeerId, Swarm};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::behaviour::{HostBehaviour, HostBehaviourEvent};
use crate::discovery::Dialer;
use crate::error::HostError;
use crate::options::Capabilities;
use crate::peer::PeerInfo;
use crate::pubsub::Message;
use crate::routing::{default_routing, Kademlia, RoutingFactory, RoutingTable};
use crate::transport::build_transport;

/// How long construction waits for every listener to report an address.
pub const LISTEN_TIMEOUT: Duration = Duration::from_secs(5);

const COMMAND_CAPACITY: usize = 256;
const SUBSCRIPTION_CAPACITY: usize = 256;
const DISCOVERY_CAPACITY: usize = 64;
const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

type Reply<T> = oneshot::Sender<Result<T, HostError>>;

pub(crate) enum Command {
    Dial {
        peer: PeerInfo,
        reply: Option<Reply<()>>,
    },
    ListenAddrs(oneshot::Sender<Vec<Multiaddr>>),
    ConnectedPeers(oneshot::Sender<Vec<PeerId>>),
    JoinPubsub(Reply<()>),
    Subscribe {
        topic: String,
        reply: Reply<mpsc::Receiver<Message>>,
    },
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: Reply<()>,
    },
    TakeDiscovery(Reply<mpsc::Receiver<PeerInfo>>),
    BootstrapRouting(Reply<()>),
    Close,
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Constructs a [`Host`] from a capability set.
pub struct HostBuilder {
    capabilities: Capabilities,
    keypair: Option<Keypair>,
    routing: Option<RoutingFactory>,
}

impl HostBuilder {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            keypair: None,
            routing: None,
        }
    }

    /// Use a fixed identity instead of a fresh Ed25519 keypair.
    pub fn with_keypair(mut self, keypair: Keypair) -> Self {
        self.keypair = Some(keypair);
        self
    }

    /// Replace the default Kademlia construction.
    pub fn with_routing<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&Keypair) -> Result<Kademlia, HostError> + Send + 'static,
    {
        self.routing = Some(Box::new(factory));
        self
    }

    /// Build the swarm, start listening and spawn its driver.
    ///
    /// Returns once every configured listener has resolved at least one
    /// address. The routing factory is invoked exactly once, here.
    pub async fn build(self) -> Result<(Host, RoutingTable), HostError> {
        let keypair = self.keypair.unwrap_or_else(Keypair::generate_ed25519);
        let local_peer_id = keypair.public().to_peer_id();
        let caps = self.capabilities;

        let (transport, relay_client) = build_transport(&keypair, &caps)?;
        let routing: RoutingFactory = match self.routing {
            Some(factory) => factory,
            None => Box::new(default_routing),
        };
        let mut kademlia = routing(&keypair)?;
        kademlia.set_mode(Some(kad::Mode::Server));

        let behaviour = HostBehaviour::new(&keypair, kademlia, relay_client, caps.mdns_interval)?;
        let mut swarm = Swarm::new(
            transport,
            behaviour,
            local_peer_id,
            libp2p::swarm::Config::with_tokio_executor()
                .with_idle_connection_timeout(IDLE_CONNECTION_TIMEOUT),
        );

        let mut pending = HashSet::new();
        for addr in &caps.listens {
            let id = swarm
                .listen_on(addr.clone())
                .map_err(|e| HostError::construction(&format!("listen on {addr}"), e))?;
            pending.insert(id);
        }
        await_listeners(&mut swarm, pending).await?;

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (discovered_tx, discovered_rx) = if caps.mdns_interval.is_some() {
            let (tx, rx) = mpsc::channel(DISCOVERY_CAPACITY);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let driver = HostDriver {
            swarm,
            commands: commands_rx,
            pending_dials: HashMap::new(),
            subscriptions: HashMap::new(),
            pubsub_joined: false,
            discovered_tx,
            discovered_rx,
        };
        let task = tokio::spawn(driver.run());
        info!(peer_id = %local_peer_id, "host constructed");

        let host = Host {
            local_peer_id,
            commands: commands_tx.clone(),
            driver: Arc::new(Mutex::new(Some(task))),
        };
        Ok((host, RoutingTable::new(commands_tx)))
    }
}

async fn await_listeners(
    swarm: &mut Swarm<HostBehaviour>,
    mut pending: HashSet<libp2p::core::transport::ListenerId>,
) -> Result<(), HostError> {
    let deadline = tokio::time::sleep(LISTEN_TIMEOUT);
    tokio::pin!(deadline);
    while !pending.is_empty() {
        tokio::select! {
            event = swarm.select_next_some() => match event {
                SwarmEvent::NewListenAddr { listener_id, address } => {
                    debug!(addr = %address, "listener ready");
                    pending.remove(&listener_id);
                }
                SwarmEvent::ListenerError { error, .. } => {
                    return Err(HostError::construction("listener", error));
                }
                SwarmEvent::ListenerClosed { addresses, reason, .. } => {
                    return Err(HostError::Construction(format!(
                        "listener on {addresses:?} closed during startup: {reason:?}"
                    )));
                }
                _ => {}
            },
            _ = &mut deadline => {
                return Err(HostError::Construction(format!(
                    "timed out after {LISTEN_TIMEOUT:?} waiting for listen addresses"
                )));
            }
        }
    }
    Ok(())
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Handle to a running host. Clones share the same swarm.
#[derive(Clone)]
pub struct Host {
    local_peer_id: PeerId,
    commands: mpsc::Sender<Command>,
    driver: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Host {
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Connect to `peer` and wait for the outcome.
    ///
    /// Already-connected peers succeed immediately without a new dial.
    pub async fn connect(&self, peer: &PeerInfo) -> Result<(), HostError> {
        let peer = peer.clone();
        self.request(|reply| Command::Dial {
            peer,
            reply: Some(reply),
        })
        .await?
    }

    /// Addresses the host is currently listening on, one per interface.
    pub async fn listen_addresses(&self) -> Result<Vec<Multiaddr>, HostError> {
        self.request(Command::ListenAddrs).await
    }

    pub async fn connected_peers(&self) -> Result<Vec<PeerId>, HostError> {
        self.request(Command::ConnectedPeers).await
    }

    /// Stop the driver, dropping every listener, connection and subscription.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn close(&self) -> Result<(), HostError> {
        let Some(task) = self.driver.lock().await.take() else {
            return Ok(());
        };
        // A send failure means the driver already stopped on its own.
        let _ = self.commands.send(Command::Close).await;
        task.await
            .map_err(|e| HostError::Construction(format!("host driver failed: {e}")))?;
        info!(peer_id = %self.local_peer_id, "host closed");
        Ok(())
    }

    pub(crate) async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, HostError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| HostError::HostClosed)?;
        rx.await.map_err(|_| HostError::HostClosed)
    }
}

impl Dialer for Host {
    /// Queue a dial without waiting for it. Failures are logged by the driver.
    fn dial(&self, peer: PeerInfo) {
        let peer_id = peer.peer_id;
        if let Err(e) = self.commands.try_send(Command::Dial { peer, reply: None }) {
            warn!(peer = %peer_id, error = %e, "dial not queued");
        }
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

struct HostDriver {
    swarm: Swarm<HostBehaviour>,
    commands: mpsc::Receiver<Command>,
    /// Callers waiting for a connection to a peer to succeed or fail.
    pending_dials: HashMap<PeerId, Vec<Reply<()>>>,
    subscriptions: HashMap<TopicHash, (String, mpsc::Sender<Message>)>,
    pubsub_joined: bool,
    discovered_tx: Option<mpsc::Sender<PeerInfo>>,
    discovered_rx: Option<mpsc::Receiver<PeerInfo>>,
}

impl HostDriver {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Close) | None => break,
                    Some(command) => self.handle_command(command),
                },
                event = self.swarm.select_next_some() => self.handle_event(event),
            }
        }
        for (peer, waiters) in self.pending_dials.drain() {
            for reply in waiters {
                let _ = reply.send(Err(HostError::Connection {
                    peer,
                    reason: "host closed".into(),
                }));
            }
        }
        debug!("host driver stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Dial { peer, reply } => self.dial(peer, reply),
            Command::ListenAddrs(reply) => {
                let _ = reply.send(self.swarm.listeners().cloned().collect());
            }
            Command::ConnectedPeers(reply) => {
                let _ = reply.send(self.swarm.connected_peers().copied().collect());
            }
            Command::JoinPubsub(reply) => {
                let result = if self.pubsub_joined {
                    Err(HostError::Construction("pubsub already joined on this host".into()))
                } else {
                    self.pubsub_joined = true;
                    debug!("gossipsub joined");
                    Ok(())
                };
                let _ = reply.send(result);
            }
            Command::Subscribe { topic, reply } => {
                let _ = reply.send(self.subscribe(topic));
            }
            Command::Publish { topic, data, reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(IdentTopic::new(topic.as_str()), data)
                    .map(|_| ())
                    .map_err(|e| HostError::Publish {
                        topic,
                        reason: e.to_string(),
                    });
                let _ = reply.send(result);
            }
            Command::TakeDiscovery(reply) => {
                let result = match (&self.discovered_tx, self.discovered_rx.take()) {
                    (Some(_), Some(rx)) => Ok(rx),
                    (Some(_), None) => {
                        Err(HostError::Construction("discovery service already started".into()))
                    }
                    (None, _) => Err(HostError::Construction(
                        "local discovery is not enabled on this host".into(),
                    )),
                };
                let _ = reply.send(result);
            }
            Command::BootstrapRouting(reply) => {
                match self.swarm.behaviour_mut().kademlia.bootstrap() {
                    Ok(query) => debug!(?query, "routing table bootstrap started"),
                    Err(_) => {
                        warn!("routing table is empty; bootstrap deferred until peers are known")
                    }
                }
                let _ = reply.send(Ok(()));
            }
            Command::Close => {}
        }
    }

    fn dial(&mut self, peer: PeerInfo, reply: Option<Reply<()>>) {
        let peer_id = peer.peer_id;
        if self.swarm.is_connected(&peer_id) {
            trace!(peer = %peer_id, "already connected");
            if let Some(reply) = reply {
                let _ = reply.send(Ok(()));
            }
            return;
        }

        for addr in &peer.addrs {
            self.swarm
                .behaviour_mut()
                .kademlia
                .add_address(&peer_id, addr.clone());
        }

        let opts = DialOpts::peer_id(peer_id)
            .addresses(peer.addrs)
            .condition(PeerCondition::DisconnectedAndNotDialing)
            .build();
        let outcome = match self.swarm.dial(opts) {
            Ok(()) => Ok(()),
            // A dial to this peer is already in flight; wait on its outcome.
            Err(DialError::DialPeerConditionFalse(_)) => Ok(()),
            Err(e) => Err(e),
        };
        match (outcome, reply) {
            (Ok(()), Some(reply)) => self.pending_dials.entry(peer_id).or_default().push(reply),
            (Ok(()), None) => debug!(peer = %peer_id, "dialing"),
            (Err(e), Some(reply)) => {
                let _ = reply.send(Err(HostError::Connection {
                    peer: peer_id,
                    reason: e.to_string(),
                }));
            }
            (Err(e), None) => debug!(peer = %peer_id, error = %e, "dial rejected"),
        }
    }

    fn subscribe(&mut self, topic: String) -> Result<mpsc::Receiver<Message>, HostError> {
        let subscription_error = |reason: String| HostError::Subscription {
            topic: topic.clone(),
            reason,
        };
        if !self.pubsub_joined {
            return Err(subscription_error("pubsub not joined".into()));
        }
        let ident = IdentTopic::new(topic.as_str());
        match self.swarm.behaviour_mut().gossipsub.subscribe(&ident) {
            Ok(true) => {}
            Ok(false) => return Err(subscription_error("already subscribed".into())),
            Err(e) => return Err(subscription_error(e.to_string())),
        }
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        self.subscriptions.insert(ident.hash(), (topic, tx));
        Ok(rx)
    }

    fn handle_event(&mut self, event: SwarmEvent<HostBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(addr = %address, "listening on");
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                debug!(addr = %address, "listen address expired");
            }
            SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                debug!(peer = %peer_id, addr = %endpoint.get_remote_address(), "connection established");
                self.resolve_dials(peer_id, Ok(()));
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                debug!(peer = %peer_id, "connection closed");
            }
            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                debug!(peer = %peer_id, error = %error, "outgoing connection failed");
                if !self.swarm.is_connected(&peer_id) {
                    self.resolve_dials(
                        peer_id,
                        Err(HostError::Connection {
                            peer: peer_id,
                            reason: error.to_string(),
                        }),
                    );
                }
            }
            SwarmEvent::Behaviour(event) => self.handle_behaviour_event(event),
            _ => {}
        }
    }

    fn handle_behaviour_event(&mut self, event: HostBehaviourEvent) {
        match event {
            HostBehaviourEvent::Gossipsub(gossipsub::Event::Message { message, .. }) => {
                self.deliver(message);
            }
            HostBehaviourEvent::Gossipsub(gossipsub::Event::Subscribed { peer_id, topic }) => {
                debug!(peer = %peer_id, %topic, "peer subscribed");
            }
            HostBehaviourEvent::Identify(identify::Event::Received { peer_id, info, .. }) => {
                for addr in info.listen_addrs {
                    self.swarm
                        .behaviour_mut()
                        .kademlia
                        .add_address(&peer_id, addr);
                }
            }
            HostBehaviourEvent::Mdns(mdns::Event::Discovered(found)) => {
                let mut by_peer: HashMap<PeerId, Vec<Multiaddr>> = HashMap::new();
                for (peer_id, addr) in found {
                    by_peer.entry(peer_id).or_default().push(addr);
                }
                for (peer_id, addrs) in by_peer {
                    self.announce(PeerInfo::new(peer_id, addrs));
                }
            }
            HostBehaviourEvent::Mdns(mdns::Event::Expired(expired)) => {
                for (peer_id, addr) in expired {
                    trace!(peer = %peer_id, %addr, "mdns record expired");
                }
            }
            HostBehaviourEvent::Kademlia(kad::Event::OutboundQueryProgressed {
                result: kad::QueryResult::Bootstrap(result),
                ..
            }) => match result {
                Ok(ok) => debug!(peer = %ok.peer, remaining = ok.num_remaining, "routing bootstrap progressed"),
                Err(e) => debug!(error = %e, "routing bootstrap step failed"),
            },
            HostBehaviourEvent::Kademlia(kad::Event::RoutingUpdated { peer, .. }) => {
                trace!(%peer, "routing table updated");
            }
            _ => {}
        }
    }

    fn deliver(&mut self, message: gossipsub::Message) {
        let Some((topic, tx)) = self.subscriptions.get(&message.topic) else {
            return;
        };
        let msg = Message {
            from: message.source,
            topic: topic.clone(),
            data: message.data,
        };
        match tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(topic = %topic, "subscriber lagging; message dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(topic = %topic, "subscription dropped; unsubscribing");
                let hash = message.topic;
                if let Some((topic, _)) = self.subscriptions.remove(&hash) {
                    let _ = self
                        .swarm
                        .behaviour_mut()
                        .gossipsub
                        .unsubscribe(&IdentTopic::new(topic));
                }
            }
        }
    }

    fn announce(&mut self, peer: PeerInfo) {
        if peer.peer_id == *self.swarm.local_peer_id() {
            return;
        }
        let Some(tx) = &self.discovered_tx else {
            return;
        };
        // mDNS reports a record only once, so announcements queue here until
        // the discovery service takes the receiver.
        if let Err(e) = tx.try_send(peer) {
            warn!(error = %e, "discovery announcement dropped");
        }
    }

    fn resolve_dials(&mut self, peer_id: PeerId, result: Result<(), HostError>) {
        let Some(waiters) = self.pending_dials.remove(&peer_id) else {
            return;
        };
        for reply in waiters {
            let outcome = match &result {
                Ok(()) => Ok(()),
                Err(HostError::Connection { peer, reason }) => Err(HostError::Connection {
                    peer: *peer,
                    reason: reason.clone(),
                }),
                Err(other) => Err(HostError::Connection {
                    peer: peer_id,
                    reason: other.to_string(),
                }),
            };
            let _ = reply.send(outcome);
        }
    }
}
