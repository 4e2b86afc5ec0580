//! Engine shutdown signal
//!
//! The only suspension points in the engine are retry backoff sleeps and
//! cache refreshes; a pending backoff must not outlive a shutdown request.
//! `EngineShutdown` owns the signal, `ShutdownHandle` is the cheap clonable
//! side the retry controller selects against.

use tokio::sync::watch;
use tracing::info;

/// Owner side of the shutdown signal.
pub struct EngineShutdown {
    tx: watch::Sender<bool>,
}

impl EngineShutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// Request shutdown. Idempotent; pending backoff sleeps wake immediately.
    pub fn request_shutdown(&self) {
        if self.tx.send_replace(true) {
            return;
        }
        info!("engine shutdown requested");
    }

    pub fn is_shutdown_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for EngineShutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side, held by in-flight sessions.
#[derive(Clone)]
pub struct ShutdownHandle {
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    pub fn is_shutdown_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when shutdown is requested (immediately if it already was).
    pub async fn wait(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        // A closed channel means the owner is gone; treat it as shutdown.
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn handle_wakes_on_request() {
        let shutdown = EngineShutdown::new();
        let mut handle = shutdown.handle();

        assert!(!handle.is_shutdown_requested());

        let waiter = tokio::spawn(async move {
            handle.wait().await;
        });

        shutdown.request_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter should not panic");
        assert!(shutdown.is_shutdown_requested());
    }

    #[tokio::test]
    async fn duplicate_requests_are_idempotent() {
        let shutdown = EngineShutdown::new();
        shutdown.request_shutdown();
        shutdown.request_shutdown();
        assert!(shutdown.is_shutdown_requested());

        let mut handle = shutdown.handle();
        // Already-requested shutdown resolves immediately.
        tokio::time::timeout(Duration::from_millis(50), handle.wait())
            .await
            .expect("wait should resolve at once");
    }

    #[tokio::test]
    async fn idle_handle_stays_pending_until_requested() {
        let shutdown = EngineShutdown::new();
        let mut handle = shutdown.handle();

        let mut wait = tokio_test::task::spawn(handle.wait());
        tokio_test::assert_pending!(wait.poll());

        shutdown.request_shutdown();
        assert!(wait.is_woken());
        tokio_test::assert_ready!(wait.poll());
    }
}
