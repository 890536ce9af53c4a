// crates/ferryrun/src/mock_transport.rs
//! In-process transports.
//!
//! `LoopbackTransport` wires a client directly to a dispatcher in the
//! same process; it backs the test suite and any single-process
//! deployment. `CountingTransport` wraps another transport and counts
//! exchanges, which is how the "`pre_defined` makes zero transport
//! calls" law gets verified.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use crate::dispatch::Dispatcher;
use crate::transport;
use crate::transport::Transport;

/// A transport whose "remote" host lives in the same process.
pub struct LoopbackTransport {
    dispatcher: Dispatcher,
}

impl LoopbackTransport {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait::async_trait]
impl Transport for LoopbackTransport {
    async fn call(&self, payload: &[u8]) -> transport::Result<Vec<u8>> {
        Ok(self.dispatcher.handle_frame(payload))
    }
}

/// Counts the exchanges that pass through an inner transport.
pub struct CountingTransport {
    inner: Arc<dyn Transport>,
    calls: AtomicUsize,
}

impl CountingTransport {
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self { inner, calls: AtomicUsize::new(0) }
    }

    /// Number of exchanges observed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for CountingTransport {
    async fn call(&self, payload: &[u8]) -> transport::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.call(payload).await
    }
}
