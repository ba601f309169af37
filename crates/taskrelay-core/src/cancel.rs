//! Cooperative cancellation.
//!
//! A single [`CancelHandle`]/[`CancelToken`] pair is created at startup and
//! the token is threaded through every suspension point: remote HTTP calls,
//! retry backoff sleeps, WebSocket receives, ledger operations, and the
//! engine loop.

use tokio::sync::watch;

/// Fires the cancellation signal. Held by the process entry point.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signals all token clones. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cheaply cloneable cancellation token.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Creates a fresh handle/token pair.
    #[must_use]
    pub fn new() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx })
    }

    /// A token that can never fire. Useful in tests.
    #[must_use]
    pub fn never() -> CancelToken {
        let (_tx, rx) = watch::channel(false);
        // The sender is dropped, so `changed()` resolves to Err and the
        // token reports not-cancelled forever.
        CancelToken { rx }
    }

    /// True once [`CancelHandle::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the handle fires. If the handle has been dropped without
    /// firing, pends forever.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without cancelling: nothing will ever fire.
                std::future::pending::<()>().await;
            }
        }
    }
}
