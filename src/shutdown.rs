//! Graceful Shutdown Handling
//!
//! Cancellation token handed to connection handlers, and the OS signal
//! listener that feeds the server's shutdown channel.

use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Cloneable one-shot cancellation token.
///
/// The runtime passes a shared root token to every `handle` invocation so
/// handlers can propagate cancellation through their own sub-operations. The
/// runtime itself never cancels the root token: shutdown drains in-flight
/// handlers to natural completion.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    tx: broadcast::Sender<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                tx,
            }),
        }
    }

    /// Cancel the token. Subsequent calls are no-ops.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            let _ = self.inner.tx.send(());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let mut rx = self.inner.tx.subscribe();
        // cancel() may have raced the subscribe
        if self.is_cancelled() {
            return;
        }
        let _ = rx.recv().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Block until a process termination signal arrives.
///
/// Listens for SIGHUP, SIGQUIT, SIGTERM and SIGINT on unix, Ctrl+C on
/// windows. Returns an error only if signal handlers cannot be installed.
pub async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigquit = signal(SignalKind::quit())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sighup.recv() => info!("Received SIGHUP, initiating graceful shutdown"),
            _ = sigquit.recv() => info!("Received SIGQUIT, initiating graceful shutdown"),
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, initiating graceful shutdown");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_cancel_token_starts_uncancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_is_observed_by_clones() {
        let token = CancelToken::new();
        let clone = token.clone();

        let waiter = tokio::spawn(async move { clone.cancelled().await });

        token.cancel();
        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("clone should observe cancellation")
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_after_cancel() {
        let token = CancelToken::new();
        token.cancel();
        // double cancel is a no-op
        token.cancel();

        timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already-cancelled token should not block");
    }
}
