//! External cancellation of a run.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable cancellation signal.
///
/// The orchestrator checks it before starting each step; provider calls that
/// are already in flight run to completion.
#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Only the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|reason| reason.is_some()).await;
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_reason_wins() {
        let cancel = Cancellation::new();
        assert!(!cancel.is_cancelled());

        cancel.cancel("timeout");
        cancel.cancel("interrupted");
        assert_eq!(cancel.reason().as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let cancel = Cancellation::new();
        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { cancel.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel("interrupted");
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let cancel = Cancellation::new();
        cancel.cancel("timeout");
        tokio_test::assert_ready!(tokio_test::task::spawn(cancel.cancelled()).poll());
    }
}
