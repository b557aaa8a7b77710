use futures::future::join_all;
use tracing::{info, warn};

use crate::error::HostError;
use crate::host::Host;
use crate::peer::PeerInfo;

/// How many unreachable bootstrap peers startup tolerates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapPolicy {
    /// `None` tolerates any number of failures, including all of them.
    pub max_failures: Option<usize>,
}

impl BootstrapPolicy {
    pub fn tolerate_all() -> Self {
        Self { max_failures: None }
    }

    pub fn max_failures(max: usize) -> Self {
        Self {
            max_failures: Some(max),
        }
    }

    pub fn check(&self, failed: usize, attempted: usize) -> Result<(), HostError> {
        match self.max_failures {
            Some(tolerated) if failed > tolerated => Err(HostError::Bootstrap {
                failed,
                attempted,
                tolerated,
            }),
            _ => Ok(()),
        }
    }
}

/// Outcome of connecting to the static peer list.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub attempted: usize,
    pub connected: Vec<PeerInfo>,
    pub failed: Vec<(PeerInfo, HostError)>,
}

/// Connect to every peer concurrently. Each failure is logged and recorded;
/// the policy decides whether the failures as a whole abort startup.
pub async fn bootstrap_peers(
    host: &Host,
    peers: &[PeerInfo],
    policy: BootstrapPolicy,
) -> Result<BootstrapReport, HostError> {
    let attempts = peers.iter().map(|peer| async move {
        let result = host.connect(peer).await;
        (peer.clone(), result)
    });

    let mut report = BootstrapReport {
        attempted: peers.len(),
        ..Default::default()
    };
    for (peer, result) in join_all(attempts).await {
        match result {
            Ok(()) => {
                info!(peer = %peer, "connected to bootstrap peer");
                report.connected.push(peer);
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "bootstrap peer unreachable");
                report.failed.push((peer, e));
            }
        }
    }

    policy.check(report.failed.len(), report.attempted)?;
    Ok(report)
}
