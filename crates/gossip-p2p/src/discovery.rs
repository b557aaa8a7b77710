//! Local peer discovery.
//!
//! The host's mDNS behaviour announces every peer it sees on the local
//! network. A [`DiscoveryService`] takes that announcement stream and hands
//! each peer to the registered [`Notifee`]s until shutdown. Announcements
//! made before the first notifee registers are held, not dropped.

use std::sync::Arc;

use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::HostError;
use crate::host::{Command, Host};
use crate::peer::PeerInfo;
use crate::shutdown::Shutdown;

/// Issues connection attempts without waiting for their outcome.
pub trait Dialer: Send + Sync {
    fn dial(&self, peer: PeerInfo);
}

/// Receives local peer announcements.
pub trait Notifee: Send + Sync {
    fn handle_peer_found(&self, peer: PeerInfo);
}

/// Notifee that dials every announced peer once per announcement.
///
/// It neither deduplicates nor backs off; dialing an already-connected peer
/// is a no-op on the host side.
pub struct ConnectNotifee<D> {
    dialer: D,
}

impl<D: Dialer> ConnectNotifee<D> {
    pub fn new(dialer: D) -> Self {
        Self { dialer }
    }
}

impl<D: Dialer> Notifee for ConnectNotifee<D> {
    fn handle_peer_found(&self, peer: PeerInfo) {
        debug!(peer = %peer.peer_id, addrs = ?peer.addrs, "peer found on local network");
        self.dialer.dial(peer);
    }
}

#[derive(Default)]
struct Notifees {
    list: RwLock<Vec<Arc<dyn Notifee>>>,
    registered: Notify,
}

pub struct DiscoveryService {
    notifees: Arc<Notifees>,
    task: JoinHandle<()>,
}

impl DiscoveryService {
    /// Start dispatching the host's local announcements.
    ///
    /// Fails when the host was built without local discovery or when a
    /// service is already running for it.
    pub async fn start(host: &Host, shutdown: Shutdown) -> Result<Self, HostError> {
        let announcements = host.request(Command::TakeDiscovery).await??;
        info!("local discovery started");
        Ok(Self::from_announcements(announcements, shutdown))
    }

    pub(crate) fn from_announcements(
        announcements: mpsc::Receiver<PeerInfo>,
        shutdown: Shutdown,
    ) -> Self {
        let notifees = Arc::new(Notifees::default());
        let task = tokio::spawn(dispatch(announcements, Arc::clone(&notifees), shutdown));
        Self { notifees, task }
    }

    pub async fn register_notifee(&self, notifee: impl Notifee + 'static) {
        self.notifees.list.write().await.push(Arc::new(notifee));
        self.notifees.registered.notify_one();
    }

    /// Wait for the dispatch loop to stop (after shutdown or host close).
    pub async fn stopped(self) {
        let _ = self.task.await;
    }
}

async fn dispatch(mut announcements: mpsc::Receiver<PeerInfo>, notifees: Arc<Notifees>, shutdown: Shutdown) {
    loop {
        let peer = tokio::select! {
            _ = shutdown.cancelled() => break,
            peer = announcements.recv() => match peer {
                Some(peer) => peer,
                None => break,
            },
        };
        if !wait_for_notifee(&notifees, &shutdown).await {
            break;
        }
        for notifee in notifees.list.read().await.iter() {
            notifee.handle_peer_found(peer.clone());
        }
    }
    debug!("local discovery stopped");
}

/// Wait until at least one notifee is registered. `false` on shutdown.
async fn wait_for_notifee(notifees: &Notifees, shutdown: &Shutdown) -> bool {
    while notifees.list.read().await.is_empty() {
        tokio::select! {
            _ = shutdown.cancelled() => return false,
            _ = notifees.registered.notified() => {}
        }
    }
    true
}
