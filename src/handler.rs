//! Handler Contract
//!
//! The capability the runtime requires from a plugged-in application: process
//! one accepted connection end-to-end, and release global resources once the
//! server stops accepting.

use crate::shutdown::CancelToken;
use crate::Result;
use std::future::Future;
use tokio::net::TcpStream;

/// Application server over TCP.
///
/// The runtime never implements this; it only invokes it.
pub trait Handler: Send + Sync + 'static {
    /// Process one accepted connection to completion.
    ///
    /// `ctx` is a shared root cancel token for the handler's own internal
    /// cancellation propagation; the runtime does not cancel it on shutdown.
    /// The handler owns `stream` and closes it by dropping it. Errors while
    /// handling a single connection are the handler's own concern and must
    /// not escape this call.
    fn handle(&self, ctx: CancelToken, stream: TcpStream) -> impl Future<Output = ()> + Send;

    /// Release any global resources the handler owns.
    ///
    /// Invoked exactly once, after the listening socket has been closed. A
    /// returned error is logged by the runtime, not retried.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}
