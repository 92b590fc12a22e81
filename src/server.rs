//! Server Runtime
//!
//! Owns the listening socket, runs the accept loop, spawns one task per
//! accepted connection, and coordinates graceful shutdown triggered by a
//! termination signal or a terminal accept error. Shutdown drains: the
//! listener closes first, then in-flight handlers run to completion.

use crate::config::ServerConfig;
use crate::counter::ClientCounter;
use crate::handler::Handler;
use crate::shutdown::{self, CancelToken};
use crate::Result;
use anyhow::Context;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot, Semaphore};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Delay before retrying after a transient accept error
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(5);

/// TCP connection-acceptance runtime for one [`Handler`]
pub struct Server<H> {
    config: ServerConfig,
    handler: Arc<H>,
    counter: Arc<ClientCounter>,
    limiter: Arc<Semaphore>,
}

impl<H: Handler> Server<H> {
    pub fn new(config: ServerConfig, handler: Arc<H>) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_conns));
        Self {
            config,
            handler,
            counter: Arc::new(ClientCounter::new()),
            limiter,
        }
    }

    /// Handle to the live-connection counter
    pub fn counter(&self) -> Arc<ClientCounter> {
        Arc::clone(&self.counter)
    }

    /// Bind the configured address, install a termination-signal listener
    /// (SIGHUP, SIGQUIT, SIGTERM, SIGINT) and serve until full shutdown.
    ///
    /// Returns an error only if binding fails; no tasks are left running on
    /// that path. Accept errors after a successful bind trigger graceful
    /// shutdown and are reported through logging, not through this result.
    pub async fn serve_with_signal(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.address)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.address))?;
        info!("Bound {}, start listening", self.config.address);

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let signal_task = tokio::spawn(async move {
            match shutdown::wait_for_signal().await {
                Ok(()) => {
                    let _ = shutdown_tx.send(()).await;
                }
                Err(err) => error!("Failed to install signal handlers: {}", err),
            }
        });

        self.serve(listener, shutdown_rx).await;
        signal_task.abort();
        Ok(())
    }

    /// Serve on an already-bound listener until `shutdown` yields a value or
    /// is closed, or the listener hits a terminal accept error.
    ///
    /// This is the wiring-free entry point: callers own the signal handling
    /// (or drive shutdown programmatically, e.g. from tests). Returns once
    /// the listener is closed, `close()` has been invoked on the handler and
    /// every in-flight connection task has finished.
    pub async fn serve(self, listener: TcpListener, mut shutdown: mpsc::Receiver<()>) {
        let (stop_tx, mut stop_rx) = broadcast::channel::<()>(1);
        let (fatal_tx, fatal_rx) = oneshot::channel::<io::Error>();
        let mut fatal_tx = Some(fatal_tx);

        // Watcher races the external shutdown source against the accept
        // loop's terminal error. Whichever fires first initiates shutdown;
        // the watcher terminates after the first event, so the losing source
        // is a no-op.
        let watcher = tokio::spawn(async move {
            tokio::select! {
                msg = shutdown.recv() => match msg {
                    Some(()) => info!("Received shutdown notification"),
                    None => info!("Shutdown channel closed"),
                },
                err = fatal_rx => {
                    if let Ok(err) = err {
                        error!("Accept error: {}", err);
                    }
                }
            }
            info!("Shutting down, closing listener");
            let _ = stop_tx.send(());
        });

        // Shared root cancellation context for handlers. The runtime never
        // cancels it: shutdown drains handlers to natural completion.
        let ctx = CancelToken::new();

        loop {
            tokio::select! {
                _ = stop_rx.recv() => {
                    debug!("Stop signal received, exiting accept loop");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let permit = match Arc::clone(&self.limiter).try_acquire_owned() {
                            Ok(permit) => permit,
                            Err(_) => {
                                warn!(
                                    "Connection limit reached ({}), dropping connection from {}",
                                    self.config.max_conns, peer
                                );
                                continue;
                            }
                        };

                        debug!("Accepted connection from {}", peer);
                        let guard = self.counter.guard();
                        let handler = Arc::clone(&self.handler);
                        let ctx = ctx.clone();

                        tokio::spawn(async move {
                            // Permit and guard are released when the task
                            // exits, even if the handler panics.
                            let _permit = permit;
                            let _guard = guard;
                            handler.handle(ctx, stream).await;
                        });
                    }
                    Err(err) if is_transient_accept_error(&err) => {
                        warn!(
                            "Transient accept error: {}, retrying in {:?}",
                            err, ACCEPT_RETRY_DELAY
                        );
                        sleep(ACCEPT_RETRY_DELAY).await;
                    }
                    Err(err) => {
                        if let Some(tx) = fatal_tx.take() {
                            let _ = tx.send(err);
                        }
                        break;
                    }
                }
            }
        }

        // Dropping the listener closes the socket. Single ownership makes a
        // second close unrepresentable.
        drop(listener);

        if let Err(err) = self.handler.close().await {
            error!("Handler close error: {}", err);
        }

        let active = self.counter.active();
        if active > 0 {
            info!("Waiting for {} active connections to close", active);
        }
        self.counter.wait_for_drain().await;

        let _ = watcher.await;
        info!("Server shutdown complete");
    }
}

/// Whether an accept error is a temporary condition worth retrying.
///
/// Anything else (listener closed, descriptor exhaustion, ...) is terminal
/// and shuts the loop down.
fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}
