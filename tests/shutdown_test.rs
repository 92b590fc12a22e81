//! Tests for shutdown coordination: drain-to-completion, close() exactly
//! once, and the bind-failure path.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tcpserve::config::ServerConfig;
use tcpserve::{CancelToken, Handler, Server};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Handler that holds each connection for a fixed time and records what the
/// runtime did with it.
struct SlowHandler {
    hold: Duration,
    handled: AtomicUsize,
    close_calls: AtomicUsize,
    saw_cancelled_ctx: AtomicBool,
}

impl SlowHandler {
    fn new(hold: Duration) -> Self {
        Self {
            hold,
            handled: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            saw_cancelled_ctx: AtomicBool::new(false),
        }
    }
}

impl Handler for SlowHandler {
    async fn handle(&self, ctx: CancelToken, stream: TcpStream) {
        tokio::time::sleep(self.hold).await;
        if ctx.is_cancelled() {
            self.saw_cancelled_ctx.store(true, Ordering::Release);
        }
        self.handled.fetch_add(1, Ordering::AcqRel);
        drop(stream);
    }

    async fn close(&self) -> tcpserve::Result<()> {
        self.close_calls.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        address: "127.0.0.1:0".to_string(),
        max_conns: 16,
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_shutdown_drains_inflight_connections() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handler = Arc::new(SlowHandler::new(Duration::from_millis(300)));
    let server = Server::new(test_config(), Arc::clone(&handler));
    let counter = server.counter();

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let server_task = tokio::spawn(server.serve(listener, shutdown_rx));

    let mut streams = Vec::new();
    for _ in 0..3 {
        streams.push(TcpStream::connect(addr).await.unwrap());
    }

    timeout(Duration::from_secs(2), async {
        while counter.active() != 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("all three connections should be in flight");

    // Shut down while all three are still being handled.
    shutdown_tx.send(()).await.unwrap();
    timeout(Duration::from_secs(5), server_task)
        .await
        .expect("server did not shut down")
        .unwrap();

    // Every in-flight handler ran to completion before serve returned,
    // close() fired exactly once, and the runtime never cancelled the
    // handlers' shared context.
    assert_eq!(handler.handled.load(Ordering::Acquire), 3);
    assert_eq!(handler.close_calls.load(Ordering::Acquire), 1);
    assert!(!handler.saw_cancelled_ctx.load(Ordering::Acquire));
    assert_eq!(counter.active(), 0);

    // No new connections after shutdown.
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_closing_shutdown_channel_triggers_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let handler = Arc::new(SlowHandler::new(Duration::from_millis(10)));
    let server = Server::new(test_config(), Arc::clone(&handler));

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    let server_task = tokio::spawn(server.serve(listener, shutdown_rx));

    // Dropping the sender closes the channel, which is equivalent to a
    // shutdown notification.
    drop(shutdown_tx);

    timeout(Duration::from_secs(5), server_task)
        .await
        .expect("server did not shut down on channel close")
        .unwrap();

    assert_eq!(handler.close_calls.load(Ordering::Acquire), 1);
}

#[tokio::test]
async fn test_second_shutdown_notification_is_a_no_op() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let handler = Arc::new(SlowHandler::new(Duration::from_millis(10)));
    let server = Server::new(test_config(), Arc::clone(&handler));

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let server_task = tokio::spawn(server.serve(listener, shutdown_rx));

    shutdown_tx.send(()).await.unwrap();
    // A second notification may or may not still find a live receiver; either
    // way it must not start a second shutdown sequence.
    let _ = shutdown_tx.try_send(());

    timeout(Duration::from_secs(5), server_task)
        .await
        .expect("server did not shut down")
        .unwrap();

    assert_eq!(handler.close_calls.load(Ordering::Acquire), 1);

    // The watcher is gone after the first event: later sends fail cleanly.
    assert!(shutdown_tx.send(()).await.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn test_terminal_accept_error_shuts_down_once() {
    use std::os::unix::io::AsRawFd;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let fd = listener.as_raw_fd();

    let handler = Arc::new(SlowHandler::new(Duration::from_millis(10)));
    let server = Server::new(test_config(), Arc::clone(&handler));
    let counter = server.counter();

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let server_task = tokio::spawn(server.serve(listener, shutdown_rx));

    // Let the accept loop start; the listener stays alive inside serve
    // until shutdown, so the fd is still valid here.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Tear the listening socket down out-of-band. The pending accept
    // returns an error that is not classified as transient.
    unsafe { libc::shutdown(fd, libc::SHUT_RDWR) };

    // A notification racing in right behind the failure must not start a
    // second shutdown sequence.
    let _ = shutdown_tx.try_send(());

    timeout(Duration::from_secs(5), server_task)
        .await
        .expect("server did not shut down on terminal accept error")
        .unwrap();

    assert_eq!(handler.close_calls.load(Ordering::Acquire), 1);
    assert_eq!(counter.active(), 0);
}

#[tokio::test]
async fn test_shutdown_with_no_connections_completes_quickly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let handler = Arc::new(SlowHandler::new(Duration::from_millis(10)));
    let server = Server::new(test_config(), Arc::clone(&handler));
    let counter = server.counter();

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let server_task = tokio::spawn(server.serve(listener, shutdown_rx));

    shutdown_tx.send(()).await.unwrap();
    timeout(Duration::from_secs(1), server_task)
        .await
        .expect("idle server should shut down promptly")
        .unwrap();

    assert_eq!(counter.active(), 0);
    assert_eq!(handler.close_calls.load(Ordering::Acquire), 1);
}

#[tokio::test]
async fn test_bind_failure_is_reported_to_caller() {
    // Occupy a port, then ask the server to bind the same one.
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = occupied.local_addr().unwrap();

    let handler = Arc::new(SlowHandler::new(Duration::from_millis(10)));
    let config = ServerConfig {
        address: addr.to_string(),
        max_conns: 16,
        timeout: Duration::from_secs(5),
    };
    let server = Server::new(config, Arc::clone(&handler));

    let result = server.serve_with_signal().await;
    assert!(result.is_err(), "binding an occupied port must fail");

    // The handler was never started or closed on this path.
    assert_eq!(handler.close_calls.load(Ordering::Acquire), 0);
}
