use libp2p::PeerId;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::HostError;
use crate::host::{Command, Host};
use crate::shutdown::Shutdown;

/// Topic every gossip host joins. Shared by all participants.
pub const PUBSUB_TOPIC: &str = "/libp2p/example/chat/1.0.0";

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Original author, when the message was signed.
    pub from: Option<PeerId>,
    pub topic: String,
    pub data: Vec<u8>,
}

/// The gossipsub network bound to one host.
#[derive(Clone)]
pub struct PubSub {
    host: Host,
}

impl PubSub {
    /// Join the gossip network of `host`. A host joins at most once.
    pub async fn join(host: &Host) -> Result<Self, HostError> {
        host.request(Command::JoinPubsub).await??;
        Ok(Self { host: host.clone() })
    }

    /// Subscribe to `topic`. A second subscription to the same topic fails.
    pub async fn subscribe(&self, topic: &str) -> Result<Subscription, HostError> {
        let messages = self
            .host
            .request(|reply| Command::Subscribe {
                topic: topic.to_string(),
                reply,
            })
            .await
            .map_err(|_| HostError::Subscription {
                topic: topic.to_string(),
                reason: "host closed".into(),
            })??;
        debug!(topic, "subscribed");
        Ok(Subscription::new(topic.to_string(), messages))
    }

    pub async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), HostError> {
        self.host
            .request(|reply| Command::Publish {
                topic: topic.to_string(),
                data,
                reply,
            })
            .await?
    }

    pub fn host(&self) -> &Host {
        &self.host
    }
}

/// Stream of messages on one topic. Ends when the host closes.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    messages: mpsc::Receiver<Message>,
}

impl Subscription {
    pub(crate) fn new(topic: String, messages: mpsc::Receiver<Message>) -> Self {
        Self { topic, messages }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or `None` once the subscription can deliver no more.
    pub async fn next(&mut self) -> Option<Message> {
        self.messages.recv().await
    }
}

/// Feed every message of `subscription` to `handler` until shutdown or until
/// the subscription ends. There is no resubscription.
pub async fn handle_messages<F>(mut subscription: Subscription, shutdown: Shutdown, mut handler: F)
where
    F: FnMut(Message),
{
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(topic = %subscription.topic(), "message handler cancelled");
                break;
            }
            message = subscription.next() => match message {
                Some(message) => handler(message),
                None => {
                    warn!(topic = %subscription.topic(), "subscription ended; no longer handling messages");
                    break;
                }
            },
        }
    }
}
