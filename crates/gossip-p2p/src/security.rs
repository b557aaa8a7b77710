//! Security negotiation across two protocols.
//!
//! [`SecurityUpgrade`] advertises the protocols of both inner upgrades over
//! multistream-select, the first upgrade's ahead of the second's, and runs
//! whichever one the remote agrees to. Both sides then end up with the same
//! authenticated peer id and an [`Either`] stream.

use std::error::Error;
use std::io;

use futures::future::{BoxFuture, Either, FutureExt, TryFutureExt};
use libp2p::core::upgrade::{InboundConnectionUpgrade, OutboundConnectionUpgrade, UpgradeInfo};
use libp2p::PeerId;

#[derive(Debug, Clone)]
pub struct SecurityUpgrade<A, B> {
    preferred: A,
    fallback: B,
}

impl<A, B> SecurityUpgrade<A, B> {
    pub fn new(preferred: A, fallback: B) -> Self {
        Self { preferred, fallback }
    }
}

/// A protocol name offered by one side of a [`SecurityUpgrade`].
#[derive(Debug, Clone)]
pub enum SecurityProtocol<A, B> {
    Preferred(A),
    Fallback(B),
}

impl<A: AsRef<str>, B: AsRef<str>> AsRef<str> for SecurityProtocol<A, B> {
    fn as_ref(&self) -> &str {
        match self {
            Self::Preferred(name) => name.as_ref(),
            Self::Fallback(name) => name.as_ref(),
        }
    }
}

impl<A: UpgradeInfo, B: UpgradeInfo> UpgradeInfo for SecurityUpgrade<A, B> {
    type Info = SecurityProtocol<A::Info, B::Info>;
    type InfoIter = Vec<Self::Info>;

    fn protocol_info(&self) -> Self::InfoIter {
        self.preferred
            .protocol_info()
            .into_iter()
            .map(SecurityProtocol::Preferred)
            .chain(
                self.fallback
                    .protocol_info()
                    .into_iter()
                    .map(SecurityProtocol::Fallback),
            )
            .collect()
    }
}

fn upgrade_error<E: Error + Send + Sync + 'static>(e: E) -> io::Error {
    io::Error::other(e)
}

impl<C, A, B, TA, TB> InboundConnectionUpgrade<C> for SecurityUpgrade<A, B>
where
    A: InboundConnectionUpgrade<C, Output = (PeerId, TA)>,
    B: InboundConnectionUpgrade<C, Output = (PeerId, TB)>,
    A::Future: Send + 'static,
    B::Future: Send + 'static,
    A::Error: Error + Send + Sync + 'static,
    B::Error: Error + Send + Sync + 'static,
{
    type Output = (PeerId, Either<TA, TB>);
    type Error = io::Error;
    type Future = BoxFuture<'static, Result<Self::Output, Self::Error>>;

    fn upgrade_inbound(self, socket: C, info: Self::Info) -> Self::Future {
        match info {
            SecurityProtocol::Preferred(info) => self
                .preferred
                .upgrade_inbound(socket, info)
                .map_ok(|(peer, stream)| (peer, Either::Left(stream)))
                .map_err(upgrade_error)
                .boxed(),
            SecurityProtocol::Fallback(info) => self
                .fallback
                .upgrade_inbound(socket, info)
                .map_ok(|(peer, stream)| (peer, Either::Right(stream)))
                .map_err(upgrade_error)
                .boxed(),
        }
    }
}

impl<C, A, B, TA, TB> OutboundConnectionUpgrade<C> for SecurityUpgrade<A, B>
where
    A: OutboundConnectionUpgrade<C, Output = (PeerId, TA)>,
    B: OutboundConnectionUpgrade<C, Output = (PeerId, TB)>,
    A::Future: Send + 'static,
    B::Future: Send + 'static,
    A::Error: Error + Send + Sync + 'static,
    B::Error: Error + Send + Sync + 'static,
{
    type Output = (PeerId, Either<TA, TB>);
    type Error = io::Error;
    type Future = BoxFuture<'static, Result<Self::Output, Self::Error>>;

    fn upgrade_outbound(self, socket: C, info: Self::Info) -> Self::Future {
        match info {
            SecurityProtocol::Preferred(info) => self
                .preferred
                .upgrade_outbound(socket, info)
                .map_ok(|(peer, stream)| (peer, Either::Left(stream)))
                .map_err(upgrade_error)
                .boxed(),
            SecurityProtocol::Fallback(info) => self
                .fallback
                .upgrade_outbound(socket, info)
                .map_ok(|(peer, stream)| (peer, Either::Right(stream)))
                .map_err(upgrade_error)
                .boxed(),
        }
    }
}
