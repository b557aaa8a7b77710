//! Transport stack assembly.
//!
//! Each configured transport is secured and multiplexed on its own, then the
//! stacks are chained with `or_transport` in preference order and wrapped in
//! DNS resolution. The relay client transport, when enabled, is chained last
//! so only `/p2p-circuit` addresses reach it.

use std::time::Duration;

use futures::future::Either;
use libp2p::core::muxing::StreamMuxerBox;
use libp2p::core::transport::Boxed;
use libp2p::core::upgrade::Version;
use libp2p::identity::Keypair;
use libp2p::{dns, noise, quic, relay, tcp, tls, websocket, yamux, PeerId, Transport};
use tracing::{debug, info};

use crate::error::HostError;
use crate::options::{Capabilities, MuxerOption, SecurityOption, TransportOption};
use crate::security::SecurityUpgrade;

pub type BoxedTransport = Boxed<(PeerId, StreamMuxerBox)>;

/// Authenticate with the configured security protocols, then multiplex.
///
/// Up to two protocols are offered, in preference order. Dialing and the
/// whole upgrade are bounded by `$timeout`.
macro_rules! secure_and_multiplex {
    ($transport:expr, $keypair:expr, $security:expr, $muxer:expr, $timeout:expr) => {{
        let noise = || {
            noise::Config::new($keypair).map_err(|e| HostError::construction("noise config", e))
        };
        let tls =
            || tls::Config::new($keypair).map_err(|e| HostError::construction("tls config", e));
        match $security {
            [SecurityOption::Noise, SecurityOption::Tls, ..] => upgraded!(
                $transport,
                SecurityUpgrade::new(noise()?, tls()?),
                $muxer,
                $timeout
            ),
            [SecurityOption::Tls, SecurityOption::Noise, ..] => upgraded!(
                $transport,
                SecurityUpgrade::new(tls()?, noise()?),
                $muxer,
                $timeout
            ),
            [SecurityOption::Tls, ..] => upgraded!($transport, tls()?, $muxer, $timeout),
            _ => upgraded!($transport, noise()?, $muxer, $timeout),
        }
    }};
}

macro_rules! upgraded {
    ($transport:expr, $security:expr, $muxer:expr, $timeout:expr) => {
        ($transport)
            .upgrade(Version::V1Lazy)
            .authenticate($security)
            .multiplex(muxer_config($muxer))
            .timeout($timeout)
            .map(|(peer, muxer), _| (peer, StreamMuxerBox::new(muxer)))
            .boxed()
    };
}

fn muxer_config(muxer: MuxerOption) -> yamux::Config {
    match muxer {
        MuxerOption::Yamux => yamux::Config::default(),
    }
}

fn tcp_config() -> tcp::Config {
    tcp::Config::default().nodelay(true)
}

fn quic_config(keypair: &Keypair, timeout: Duration) -> quic::Config {
    let mut config = quic::Config::new(keypair);
    config.handshake_timeout = timeout;
    config
}

fn chain(first: BoxedTransport, second: BoxedTransport) -> BoxedTransport {
    first
        .or_transport(second)
        .map(|either, _| match either {
            Either::Left(output) => output,
            Either::Right(output) => output,
        })
        .boxed()
}

/// Build the transport stack described by `caps`.
///
/// Returns the relay client behaviour alongside the transport when relaying
/// is enabled; the two must be installed in the same swarm.
pub fn build_transport(
    keypair: &Keypair,
    caps: &Capabilities,
) -> Result<(BoxedTransport, Option<relay::client::Behaviour>), HostError> {
    let security = caps.security.as_slice();
    let muxer = caps.preferred_muxer();
    let timeout = caps.connect_timeout;
    if caps.transports.iter().any(|t| t.needs_upgrade()) {
        info!(?security, ?muxer, "negotiating connections with");
    }

    let mut stack: Option<BoxedTransport> = None;
    for option in &caps.transports {
        let next = match option {
            TransportOption::Tcp => {
                secure_and_multiplex!(
                    tcp::tokio::Transport::new(tcp_config()),
                    keypair,
                    security,
                    muxer,
                    timeout
                )
            }
            TransportOption::WebSocket => secure_and_multiplex!(
                websocket::WsConfig::new(tcp::tokio::Transport::new(tcp_config())),
                keypair,
                security,
                muxer,
                timeout
            ),
            TransportOption::Quic => quic::tokio::Transport::new(quic_config(keypair, timeout))
                .map(|(peer, connection), _| (peer, StreamMuxerBox::new(connection)))
                .boxed(),
        };
        debug!(transport = ?option, "transport enabled");
        stack = Some(match stack {
            Some(existing) => chain(existing, next),
            None => next,
        });
    }

    let stack = stack.ok_or_else(|| HostError::Configuration("no transports configured".into()))?;
    let stack = dns::tokio::Transport::system(stack)
        .map_err(|e| HostError::construction("dns resolver", e))?
        .boxed();

    if caps.disable_relay {
        return Ok((stack, None));
    }

    let (relay_transport, relay_client) = relay::client::new(keypair.public().to_peer_id());
    let relay_transport: BoxedTransport =
        secure_and_multiplex!(relay_transport, keypair, security, muxer, timeout);
    Ok((chain(stack, relay_transport), Some(relay_client)))
}
