//! Shutdown token shared by every job loop.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    requested: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
}

/// A cloneable handle that requests and observes shutdown.
///
/// Requesting is idempotent: only the first reason is kept.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

impl ShutdownToken {
    /// Creates a token that has not been triggered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown and wakes every waiter.
    pub fn trigger(&self, reason: impl Into<String>) {
        if self
            .inner
            .requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.inner.reason.write() = Some(reason.into());
            self.inner.notify.notify_waiters();
        }
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// The first reason passed to [`trigger`](Self::trigger).
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Resolves once shutdown has been requested.
    pub async fn triggered(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_reason_wins() {
        let token = ShutdownToken::new();
        assert!(!token.is_triggered());

        token.trigger("SIGTERM");
        token.trigger("ctrl-c");

        assert!(token.is_triggered());
        assert_eq!(token.reason().as_deref(), Some("SIGTERM"));
    }

    #[tokio::test]
    async fn test_triggered_wakes_waiters() {
        let token = ShutdownToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.triggered().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.trigger("test");

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[test]
    fn test_triggered_is_pending_until_trigger() {
        let token = ShutdownToken::new();
        let mut waiter = tokio_test::task::spawn(token.triggered());
        tokio_test::assert_pending!(waiter.poll());

        token.trigger("SIGINT");
        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_triggered_returns_immediately_after_trigger() {
        let token = ShutdownToken::new();
        token.trigger("early");
        tokio::time::timeout(Duration::from_millis(100), token.triggered())
            .await
            .expect("already triggered");
    }
}
