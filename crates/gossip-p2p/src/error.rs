use std::fmt;

use libp2p::PeerId;
use thiserror::Error;

/// Category of a host-construction option identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Transport,
    Muxer,
    Security,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Transport => f.write_str("transport"),
            OptionKind::Muxer => f.write_str("muxer"),
            OptionKind::Security => f.write_str("security"),
        }
    }
}

#[derive(Debug, Error)]
pub enum HostError {
    // ── Startup ──────────────────────────────────────────────────────────────
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("unsupported {kind} option: {name:?}")]
    UnsupportedOption { kind: OptionKind, name: String },

    #[error("construction failed: {0}")]
    Construction(String),

    #[error("subscription to {topic} failed: {reason}")]
    Subscription { topic: String, reason: String },

    #[error("bootstrap failed: {failed} of {attempted} peers unreachable (tolerating {tolerated})")]
    Bootstrap {
        failed: usize,
        attempted: usize,
        tolerated: usize,
    },

    // ── Runtime ──────────────────────────────────────────────────────────────
    #[error("connection to {peer} failed: {reason}")]
    Connection { peer: PeerId, reason: String },

    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("host closed")]
    HostClosed,
}

impl HostError {
    pub(crate) fn construction(context: &str, err: impl fmt::Display) -> Self {
        HostError::Construction(format!("{context}: {err}"))
    }
}
