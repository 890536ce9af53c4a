// crates/ferryrun/src/dispatch.rs
//! # Call Dispatcher
//!
//! The host edge of the bridge. Decodes a request frame, routes it
//! against the registry, and always answers with an encoded reply.
//!
//! ## Invariants
//!
//! - **Total**: `handle_frame` never panics outward and never crashes the
//!   host. Garbage in, failure reply out.
//! - Every failure raised during execution is captured into a structured
//!   fault descriptor. The message survives; stack context does not.
//! - Method routing covers exactly the capability set; anything else is
//!   an `unsupported-method` fault, not a lookup panic.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;

use ferrypack::Decoder;
use ferrypack::Encoder;
use ferryrpc::Fault;
use ferryrpc::FaultKind;
use ferryrpc::Frame;
use ferryrpc::ReplyErrEncoder;
use ferryrpc::ReplyOkEncoder;
use ferryrpc::Value;
use ferryrpc::decode_values;
use ferryrpc::peek_seq;

use crate::partition::ExecResult;
use crate::partition::PartitionFn;
use crate::payload::CallablePayload;
use crate::payload::PayloadError;
use crate::payload::deserialize;
use crate::registry::HandleId;
use crate::registry::Registry;

/// Executes named methods against registered objects on behalf of remote
/// proxies.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// The registry this dispatcher routes against.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Handles one request frame and returns the encoded reply.
    ///
    /// This is a total function: malformed frames, unknown handles, and
    /// panicking objects all come back as failure replies. The sequence
    /// number of a malformed frame is recovered best-effort (0 when even
    /// that fails) so the client can still correlate the failure.
    pub fn handle_frame(&self, payload: &[u8]) -> Vec<u8> {
        let seq = peek_seq(payload).unwrap_or(0);

        let mut dec = Decoder::new(payload);
        let outcome = match Frame::decode(&mut dec) {
            Ok(Frame::Build(build)) => self.build(&CallablePayload::from_bytes(build.payload.to_vec())),
            Ok(Frame::Call(call)) => {
                self.call(HandleId(call.handle), call.method, call.args)
            }
            Ok(Frame::Release(release)) => {
                self.registry.release(HandleId(release.handle));
                Ok(Value::Unit)
            }
            Ok(Frame::Reply(_)) => Err(Fault::new(
                FaultKind::CorruptPayload,
                "host received a Reply frame",
            )),
            Err(e) => Err(Fault::new(
                FaultKind::CorruptPayload,
                format!("malformed frame: {}", e),
            )),
        };

        encode_reply(seq, &outcome)
    }

    /// BUILD: payload → object → fresh handle.
    ///
    /// On any payload error the registry is left untouched.
    fn build(&self, payload: &CallablePayload) -> std::result::Result<Value, Fault> {
        let spec = deserialize(payload).map_err(payload_fault)?;
        let object: Box<dyn PartitionFn> = spec.materialize();
        let handle = self.registry.register(object);
        Ok(Value::Int(handle.0 as i64))
    }

    /// CALL: resolve, route, convert arguments, execute under a panic
    /// guard.
    fn call(
        &self,
        handle: HandleId,
        method: &str,
        args: Decoder<'_>,
    ) -> std::result::Result<Value, Fault> {
        let entry = self.registry.resolve(handle).map_err(|e| {
            Fault::new(FaultKind::UnknownHandle, e.to_string())
        })?;

        let args = decode_values(args).map_err(|e| {
            Fault::new(FaultKind::UnmarshalableValue, format!("argument list: {}", e))
        })?;

        let mut object = entry.lock();
        match method {
            "prepare" => {
                let [sources, destinations] = want_arity::<2>(method, &args)?;
                let sources = want_id_set("sources", sources)?;
                let destinations = want_id_set("destinations", destinations)?;
                guarded(method, || object.prepare(&sources, &destinations))?;
                Ok(Value::Unit)
            }
            "partition" => {
                let [source_index, value] = want_arity::<2>(method, &args)?;
                let source_index = want_int("source_index", source_index)?;
                let picked = guarded(method, || object.partition(source_index, value))?;
                Ok(Value::Int(picked))
            }
            "commit" => {
                let [source_index, partition] = want_arity::<2>(method, &args)?;
                let source_index = want_int("source_index", source_index)?;
                let partition = want_int("partition", partition)?;
                let committed = guarded(method, || object.commit(source_index, partition))?;
                Ok(Value::Int(committed))
            }
            "pre_defined" => {
                want_arity::<0>(method, &args)?;
                Ok(Value::Bool(object.pre_defined()))
            }
            other => Err(Fault::new(
                FaultKind::UnsupportedMethod,
                format!("'{}' is not part of the partition capability set", other),
            )),
        }
    }
}

/// Runs one method invocation, converting both `ExecError` returns and
/// panics into `remote-execution` faults.
fn guarded<T>(
    method: &str,
    invoke: impl FnOnce() -> ExecResult<T>,
) -> std::result::Result<T, Fault> {
    match catch_unwind(AssertUnwindSafe(invoke)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Fault::new(FaultKind::RemoteExecution, e.message)),
        Err(panic) => {
            let message = panic_message(&panic);
            tracing::warn!(method, message, "object panicked during execution");
            Err(Fault::new(
                FaultKind::RemoteExecution,
                format!("{} panicked: {}", method, message),
            ))
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "opaque panic payload"
    }
}

fn payload_fault(e: PayloadError) -> Fault {
    let kind = match &e {
        PayloadError::UnsupportedObject(_) => FaultKind::UnsupportedObject,
        PayloadError::Corrupt(_) => FaultKind::CorruptPayload,
        PayloadError::VersionMismatch(_) => FaultKind::VersionMismatch,
    };
    Fault::new(kind, e.to_string())
}

fn want_arity<'a, const N: usize>(
    method: &str,
    args: &'a [Value],
) -> std::result::Result<[&'a Value; N], Fault> {
    let exact: &[Value; N] = args.try_into().map_err(|_| {
        Fault::new(
            FaultKind::UnmarshalableValue,
            format!("{} takes {} arguments, got {}", method, N, args.len()),
        )
    })?;
    Ok(std::array::from_fn(|i| &exact[i]))
}

fn want_int(name: &str, value: &Value) -> std::result::Result<i64, Fault> {
    match value {
        Value::Int(v) => Ok(*v),
        other => Err(Fault::new(
            FaultKind::UnmarshalableValue,
            format!("{} must be an int, got {}", name, other.type_desc()),
        )),
    }
}

/// Converts a wire list of ids into the unordered unique set the
/// capability contract expects. Duplicates collapse silently.
fn want_id_set(name: &str, value: &Value) -> std::result::Result<BTreeSet<i64>, Fault> {
    let Value::List(items) = value else {
        return Err(Fault::new(
            FaultKind::UnmarshalableValue,
            format!("{} must be a list of ints, got {}", name, value.type_desc()),
        ));
    };
    items.iter().map(|item| want_int(name, item)).collect()
}

fn encode_reply(seq: u64, outcome: &std::result::Result<Value, Fault>) -> Vec<u8> {
    let mut enc = Encoder::new();
    let encoded = match outcome {
        Ok(value) => ReplyOkEncoder::new(seq, value).encode(&mut enc),
        Err(fault) => ReplyErrEncoder::new(seq, fault).encode(&mut enc),
    };

    // Reply values are ints, bools, and unit; fault bodies are strings.
    // None of these can fail to encode, but the host must not crash even
    // if that ever changes: an empty reply surfaces client-side as a
    // protocol error.
    match encoded.and_then(|()| enc.into_bytes().map_err(Into::into)) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(seq, error = %e, "failed to encode reply");
            Vec::new()
        }
    }
}
