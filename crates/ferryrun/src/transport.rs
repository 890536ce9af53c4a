// crates/ferryrun/src/transport.rs
//! # Transport Abstraction
//!
//! A minimal, async interface for moving bytes between the client runtime
//! and the host runtime.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: a Transport knows nothing about frames, values, or
//!   handles. It moves opaque buffers.
//! - **Request-Response**: the fundamental interaction is "send bytes,
//!   await bytes". Exactly one reply per request.
//! - **Fatal failures**: a transport error kills the in-flight call.
//!   Nothing at this layer retries, because the host may already have
//!   executed side effects.

use std::fmt;

/// Errors that occur at the network/transport layer.
///
/// These are deliberately distinct from the host's structured fault
/// descriptors: a fault means the host answered; a transport error means
/// it may never have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// No response arrived before the deadline.
    Timeout,
    /// The remote peer rejected the payload size.
    PayloadTooLarge,
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "connection lost: {}", msg),
            Self::Timeout => write!(f, "request timed out"),
            Self::PayloadTooLarge => write!(f, "payload too large for transport"),
            Self::Io(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A mechanism to send a byte buffer and receive the reply.
///
/// Object-safe by design (`Arc<dyn Transport>`), so client machinery can
/// be wired over TCP, shared memory, or an in-process dispatcher without
/// caring which.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends a request payload and waits for the response bytes.
    ///
    /// # Invariants
    /// - Returns `Ok(bytes)` with the raw reply on success.
    /// - Returns `Err` if the exchange fails at the byte-moving layer.
    /// - Never interprets the payload content.
    async fn call(&self, payload: &[u8]) -> Result<Vec<u8>>;
}
