//! Live Connection Accounting
//!
//! Tracks how many accepted connections are currently being handled. The
//! counter is an owned object shared via `Arc`, not a process-wide global,
//! so several servers can run in one process without colliding.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared live-connection counter with drain tracking
pub struct ClientCounter {
    active: AtomicUsize,
    peak: AtomicUsize,
    drained: Notify,
}

impl ClientCounter {
    pub fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Number of connections currently in flight
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// High-water mark of concurrent connections
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Increment the counter and return a guard that decrements on drop.
    ///
    /// The increment happens here, before the connection task is spawned;
    /// the decrement happens when the guard is dropped inside the task, so a
    /// panicking handler still releases its slot.
    pub fn guard(self: &Arc<Self>) -> ClientGuard {
        let current = self.active.fetch_add(1, Ordering::AcqRel) + 1;

        let mut peak = self.peak.load(Ordering::Relaxed);
        while current > peak {
            match self.peak.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => peak = x,
            }
        }

        ClientGuard {
            counter: Arc::clone(self),
        }
    }

    /// Wait until every in-flight connection has finished.
    ///
    /// Returns immediately if nothing is in flight. The waiter is registered
    /// before the counter is read so a decrement racing this call cannot be
    /// missed.
    pub async fn wait_for_drain(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn decrement(&self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}

impl Default for ClientCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one live connection
pub struct ClientGuard {
    counter: Arc<ClientCounter>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.counter.decrement();
    }
}
