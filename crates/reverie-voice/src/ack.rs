//! Single-slot acknowledgment handle.
//!
//! At most one waiter is live. Installing a new waiter releases the previous
//! one, and `acknowledge` outside a pending wait does nothing.

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default)]
pub struct AckGate {
    slot: Mutex<Option<oneshot::Sender<()>>>,
}

impl AckGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend until the user acknowledges. Returns `true` on acknowledgment and
    /// `false` when the wait was superseded, released, or `cancel` fired.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.slot.lock().replace(tx).is_some() {
            debug!("AckGate: previous waiter superseded");
        }
        tokio::select! {
            result = rx => result.is_ok(),
            _ = cancel.cancelled() => false,
        }
    }

    /// Resolve the live waiter. Returns `false` (and changes nothing) when none is pending.
    pub fn acknowledge(&self) -> bool {
        match self.slot.lock().take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Drop the live waiter without acknowledging it.
    pub fn release(&self) {
        if self.slot.lock().take().is_some() {
            debug!("AckGate: waiter released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn acknowledge_without_waiter_is_ignored() {
        let gate = AckGate::new();
        assert!(!gate.acknowledge());
        assert!(!gate.acknowledge());
        assert!(!gate.is_pending());
    }

    #[tokio::test]
    async fn acknowledge_resolves_waiter_once() {
        let gate = Arc::new(AckGate::new());
        let cancel = CancellationToken::new();
        let waiter = {
            let gate = Arc::clone(&gate);
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.wait(&cancel).await })
        };
        while !gate.is_pending() {
            tokio::task::yield_now().await;
        }
        assert!(gate.acknowledge());
        assert!(waiter.await.unwrap());
        assert!(!gate.acknowledge());
    }

    #[tokio::test]
    async fn new_waiter_supersedes_old() {
        let gate = Arc::new(AckGate::new());
        let cancel = CancellationToken::new();
        let first = {
            let gate = Arc::clone(&gate);
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.wait(&cancel).await })
        };
        while !gate.is_pending() {
            tokio::task::yield_now().await;
        }
        let second = {
            let gate = Arc::clone(&gate);
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.wait(&cancel).await })
        };
        assert!(!first.await.unwrap());
        assert!(gate.acknowledge());
        assert!(second.await.unwrap());
    }

    #[tokio::test]
    async fn cancellation_ends_wait() {
        let gate = AckGate::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!gate.wait(&cancel).await);
    }

    #[test]
    fn release_wakes_waiter_with_false() {
        let gate = AckGate::new();
        let cancel = CancellationToken::new();
        let mut waiter = tokio_test::task::spawn(gate.wait(&cancel));
        tokio_test::assert_pending!(waiter.poll());
        assert!(gate.is_pending());

        gate.release();
        assert!(waiter.is_woken());
        tokio_test::assert_ready_eq!(waiter.poll(), false);
        assert!(!gate.acknowledge());
    }
}
