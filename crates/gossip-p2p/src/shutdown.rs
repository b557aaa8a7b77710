//! Process lifetime token.
//!
//! Any number of triggers may race to stop the host; the first one wins and
//! records its reason, every later trigger is a no-op. Long-lived tasks hold
//! a clone and select on [`Shutdown::cancelled`].

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The OS interrupt signal (Ctrl+C).
    Interrupt,
    /// The chat input reached end of stream or failed.
    InputClosed,
    /// Stopped programmatically.
    Requested,
}

#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the token. Returns `true` only for the trigger that fired it.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Reason recorded by the winning trigger.
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.tx.borrow()
    }

    /// Resolves once the token has fired, immediately if it already has.
    pub async fn cancelled(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            // The sender lives as long as `self`, so this cannot fail.
            if rx.changed().await.is_err() {
                return ShutdownReason::Requested;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_trigger_wins() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        assert!(shutdown.trigger(ShutdownReason::InputClosed));
        assert!(!shutdown.trigger(ShutdownReason::Interrupt));
        assert!(!shutdown.clone().trigger(ShutdownReason::Requested));
        assert_eq!(shutdown.reason(), Some(ShutdownReason::InputClosed));
    }

    #[tokio::test]
    async fn waiters_wake_on_trigger() {
        let shutdown = Shutdown::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let s = shutdown.clone();
                tokio::spawn(async move { s.cancelled().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger(ShutdownReason::Interrupt);
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), ShutdownReason::Interrupt);
        }
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_after_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger(ShutdownReason::Requested);
        let reason = tokio::time::timeout(Duration::from_millis(100), shutdown.cancelled())
            .await
            .unwrap();
        assert_eq!(reason, ShutdownReason::Requested);
    }
}
