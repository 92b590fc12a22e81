//! Echo Handler
//!
//! Reference [`Handler`] implementation: echoes each received line back to
//! the client. Used by the `tcpserve` binary and by the integration tests.

use crate::handler::Handler;
use crate::shutdown::CancelToken;
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Line-echo application server
pub struct EchoHandler {
    idle_timeout: Duration,
    closing: AtomicBool,
}

impl EchoHandler {
    /// `idle_timeout` bounds each wait for the next line; an idle client is
    /// disconnected once it elapses.
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            closing: AtomicBool::new(false),
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

impl Handler for EchoHandler {
    // Closes the connection itself: the stream is owned here and dropped on
    // return, in every path.
    async fn handle(&self, _ctx: CancelToken, stream: TcpStream) {
        if self.is_closing() {
            // refuse work while shutting down
            return;
        }

        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        loop {
            match timeout(self.idle_timeout, lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    let mut reply = line.into_bytes();
                    reply.push(b'\n');
                    if let Err(err) = writer.write_all(&reply).await {
                        warn!("Echo write to {} failed: {}", peer, err);
                        break;
                    }
                }
                Ok(Ok(None)) => {
                    debug!("Connection from {} closed by peer", peer);
                    break;
                }
                Ok(Err(err)) => {
                    warn!("Echo read from {} failed: {}", peer, err);
                    break;
                }
                Err(_) => {
                    debug!(
                        "Connection from {} idle for {:?}, disconnecting",
                        peer, self.idle_timeout
                    );
                    break;
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.closing.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_flips_closing_flag() {
        let handler = EchoHandler::new(Duration::from_secs(1));
        assert!(!handler.is_closing());
        handler.close().await.unwrap();
        assert!(handler.is_closing());
    }
}
