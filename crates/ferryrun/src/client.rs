// crates/ferryrun/src/client.rs
//! # RPC Client
//!
//! The client edge of the bridge: encodes request frames, moves them
//! through a transport with a deadline, validates reply correlation, and
//! re-raises host faults as typed failures.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use ferrypack::Decoder;
use ferrypack::Encoder;
use ferryrpc::BuildEncoder;
use ferryrpc::CallEncoder;
use ferryrpc::Fault;
use ferryrpc::Frame;
use ferryrpc::ReleaseEncoder;
use ferryrpc::Value;
use ferryrpc::decode_value;

use crate::payload::CallablePayload;
use crate::payload::PayloadError;
use crate::proxy::ProxyState;
use crate::registry::HandleId;
use crate::transport::Transport;
use crate::transport::TransportError;

/// Failures surfaced to the calling runtime.
#[derive(Debug)]
pub enum CallError {
    /// The proxy is not in the Live lifecycle state.
    InvalidState { state: ProxyState },
    /// The callable could not be serialized for shipping.
    Payload(PayloadError),
    /// The byte-moving layer failed; the host may or may not have acted.
    Transport(TransportError),
    /// The reply was malformed or not a reply at all.
    Rpc(ferryrpc::Error),
    /// The host answered with a structured failure, re-raised here.
    Remote(Fault),
    /// The reply correlates to a different request.
    SequenceMismatch { sent: u64, received: u64 },
    /// The reply decoded, but its value had the wrong shape.
    UnexpectedReply(String),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidState { state } => {
                write!(f, "call made in the {:?} state; only Live accepts calls", state)
            }
            Self::Payload(e) => write!(f, "cannot ship callable: {}", e),
            Self::Transport(e) => write!(f, "transport failure: {}", e),
            Self::Rpc(e) => write!(f, "protocol failure: {}", e),
            Self::Remote(fault) => write!(f, "remote failure: {}", fault),
            Self::SequenceMismatch { sent, received } => {
                write!(f, "sequence mismatch: sent {}, received {}", sent, received)
            }
            Self::UnexpectedReply(msg) => write!(f, "unexpected reply: {}", msg),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Payload(e) => Some(e),
            Self::Transport(e) => Some(e),
            Self::Rpc(e) => Some(e),
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PayloadError> for CallError {
    fn from(e: PayloadError) -> Self {
        Self::Payload(e)
    }
}

impl From<TransportError> for CallError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<ferryrpc::Error> for CallError {
    fn from(e: ferryrpc::Error) -> Self {
        Self::Rpc(e)
    }
}

pub type Result<T> = std::result::Result<T, CallError>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the BUILD / CALL / RELEASE wire contract.
///
/// Cheap to clone; clones share the transport and the sequence counter,
/// so concurrent calls from shared proxies stay uniquely correlated.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    seq: Arc<AtomicU64>,
    timeout: Duration,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            seq: Arc::new(AtomicU64::new(1)),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// BUILD: ships a payload and returns the handle the host allocated.
    pub async fn build(&self, payload: &CallablePayload) -> Result<HandleId> {
        let seq = self.next_seq();
        let mut enc = Encoder::new();
        BuildEncoder::new(seq, payload.as_bytes()).encode(&mut enc)?;

        match self.round_trip(seq, enc).await? {
            Value::Int(raw) if raw >= 0 => Ok(HandleId(raw as u64)),
            other => Err(CallError::UnexpectedReply(format!(
                "BUILD should return a handle, got {}",
                other.type_desc()
            ))),
        }
    }

    /// CALL: invokes a named method against a remote handle.
    pub async fn call(&self, handle: HandleId, method: &str, args: &[Value]) -> Result<Value> {
        let seq = self.next_seq();
        let mut enc = Encoder::new();
        CallEncoder::new(seq, handle.0, method, args).encode(&mut enc)?;
        self.round_trip(seq, enc).await
    }

    /// RELEASE: tells the host to drop a handle. Always acked.
    pub async fn release(&self, handle: HandleId) -> Result<()> {
        let seq = self.next_seq();
        let mut enc = Encoder::new();
        ReleaseEncoder::new(seq, handle.0).encode(&mut enc)?;
        self.round_trip(seq, enc).await?;
        Ok(())
    }

    /// One synchronous exchange: send, await under the deadline, decode,
    /// correlate, unwrap.
    ///
    /// Dropping the returned future abandons the wait; it does not
    /// interrupt whatever the host is already executing.
    async fn round_trip(&self, seq: u64, enc: Encoder) -> Result<Value> {
        let payload = enc.into_bytes().map_err(ferryrpc::Error::from)?;

        let reply_bytes = tokio::time::timeout(self.timeout, self.transport.call(&payload))
            .await
            .map_err(|_| CallError::Transport(TransportError::Timeout))??;

        let mut dec = Decoder::new(&reply_bytes);
        let reply = match Frame::decode(&mut dec)? {
            Frame::Reply(reply) => reply,
            _ => {
                return Err(CallError::Rpc(ferryrpc::Error::ProtocolViolation(
                    "received a request frame while waiting for a Reply".into(),
                )));
            }
        };

        if reply.seq != seq {
            return Err(CallError::SequenceMismatch { sent: seq, received: reply.seq });
        }

        match reply.status {
            Ok(mut value_dec) => Ok(decode_value(&mut value_dec)?),
            Err(fault) => Err(CallError::Remote(fault)),
        }
    }
}
