// crates/ferryrun/src/payload.rs
//! # Callable Payloads
//!
//! Turns a client-side callable into an opaque, runtime-independent byte
//! payload, and reconstructs a live object from it on the host side.
//!
//! ## Philosophy
//!
//! A shippable callable is *data*, not code: an operation tag plus its
//! captured state. The client runtime cannot serialize arbitrary
//! closures for a host it shares no code with, so anything runtime-local
//! is rejected at the boundary instead of being smuggled across half
//! working. This is a deliberate capability reduction relative to
//! pickling free-form closures.
//!
//! ## Payload layout
//!
//! `[magic: 4b]["version": 1b][ferrypack variant: op + state]`
//!
//! The version byte gates format evolution; the variant name gates
//! operation evolution. Both failures are distinct from corruption.

use std::collections::BTreeMap;

use ferrypack::Decoder;
use ferrypack::Encoder;

use crate::partition::LoadBalancedFn;
use crate::partition::ModuloFn;
use crate::partition::PartitionFn;
use crate::partition::TableFn;

/// First bytes of every callable payload.
pub const PAYLOAD_MAGIC: [u8; 4] = *b"FRYC";

/// The payload format this build reads and writes.
pub const FORMAT_VERSION: u8 = 1;

/// Serialization and deserialization failures for callable payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// The object references runtime-local state and cannot cross the
    /// boundary.
    UnsupportedObject(String),
    /// The payload bytes are malformed.
    Corrupt(String),
    /// The payload format or operation set is from an incompatible
    /// build.
    VersionMismatch(String),
}

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadError::UnsupportedObject(msg) => {
                write!(f, "object cannot cross the boundary: {}", msg)
            }
            PayloadError::Corrupt(msg) => write!(f, "corrupt payload: {}", msg),
            PayloadError::VersionMismatch(msg) => write!(f, "version mismatch: {}", msg),
        }
    }
}

impl std::error::Error for PayloadError {}

pub type Result<T> = std::result::Result<T, PayloadError>;

/// An introspectable description of a shippable partition function:
/// operation tag plus captured state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallableSpec {
    /// Round-robin across the destinations announced by `prepare`.
    LoadBalanced,
    /// Stable key of the value, modulo `buckets`.
    Modulo { buckets: u32 },
    /// Explicit integer routing table with a fallback partition.
    Table { routes: Vec<(i64, i64)>, fallback: i64 },
}

impl CallableSpec {
    /// Checks invariants that must hold before the spec may ship.
    fn validate(&self) -> std::result::Result<(), String> {
        match self {
            CallableSpec::LoadBalanced => Ok(()),
            CallableSpec::Modulo { buckets: 0 } => {
                Err("modulo spec with zero buckets".to_string())
            }
            CallableSpec::Modulo { .. } => Ok(()),
            CallableSpec::Table { .. } => Ok(()),
        }
    }

    /// Builds the host-side object this spec describes.
    pub fn materialize(self) -> Box<dyn PartitionFn> {
        match self {
            CallableSpec::LoadBalanced => Box::new(LoadBalancedFn::new()),
            CallableSpec::Modulo { buckets } => Box::new(ModuloFn::new(buckets)),
            CallableSpec::Table { routes, fallback } => {
                let routes: BTreeMap<i64, i64> = routes.into_iter().collect();
                Box::new(TableFn::new(routes, fallback))
            }
        }
    }
}

/// What the client holds before building: either a shippable spec, or a
/// runtime-local object that can only ever run in this process.
pub enum LocalCallable {
    Spec(CallableSpec),
    /// A locally-defined implementation. It works in-process, but there
    /// is no way to introspect its behavior into bytes, so serialization
    /// refuses it.
    Native(Box<dyn PartitionFn>),
}

impl LocalCallable {
    /// The `load_balanced` factory shortcut.
    pub fn load_balanced() -> Self {
        LocalCallable::Spec(CallableSpec::LoadBalanced)
    }

    pub fn modulo(buckets: u32) -> Self {
        LocalCallable::Spec(CallableSpec::Modulo { buckets })
    }

    pub fn table(routes: Vec<(i64, i64)>, fallback: i64) -> Self {
        LocalCallable::Spec(CallableSpec::Table { routes, fallback })
    }
}

/// An immutable, self-describing byte payload for one callable.
///
/// Created once at build time; the bytes never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallablePayload {
    bytes: Vec<u8>,
}

impl CallablePayload {
    /// Wraps raw bytes received from a peer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Serializes a callable into a payload the host can rebuild it from.
///
/// # Errors
/// `PayloadError::UnsupportedObject` if the callable is runtime-local or
/// its captured state violates a spec invariant.
pub fn serialize(callable: &LocalCallable) -> Result<CallablePayload> {
    let spec = match callable {
        LocalCallable::Spec(spec) => spec,
        LocalCallable::Native(_) => {
            return Err(PayloadError::UnsupportedObject(
                "runtime-local object cannot cross the boundary; express it as a CallableSpec"
                    .to_string(),
            ));
        }
    };
    spec.validate().map_err(PayloadError::UnsupportedObject)?;

    let mut enc = Encoder::new();
    encode_spec(&mut enc, spec).map_err(|e| PayloadError::Corrupt(e.to_string()))?;
    let body = enc
        .into_bytes()
        .map_err(|e| PayloadError::Corrupt(e.to_string()))?;

    let mut bytes = Vec::with_capacity(5 + body.len());
    bytes.extend_from_slice(&PAYLOAD_MAGIC);
    bytes.push(FORMAT_VERSION);
    bytes.extend_from_slice(&body);
    Ok(CallablePayload { bytes })
}

/// Reconstructs the spec a payload describes.
///
/// # Errors
/// - `PayloadError::Corrupt` on truncation, bad magic, or malformed body.
/// - `PayloadError::VersionMismatch` on a foreign format version or an
///   operation tag this build does not know.
pub fn deserialize(payload: &CallablePayload) -> Result<CallableSpec> {
    let bytes = payload.as_bytes();
    if bytes.len() < PAYLOAD_MAGIC.len() + 1 {
        return Err(PayloadError::Corrupt("payload shorter than its header".to_string()));
    }
    if bytes[..PAYLOAD_MAGIC.len()] != PAYLOAD_MAGIC {
        return Err(PayloadError::Corrupt("payload magic does not match".to_string()));
    }
    let version = bytes[PAYLOAD_MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(PayloadError::VersionMismatch(format!(
            "payload format v{}, this host speaks v{}",
            version, FORMAT_VERSION
        )));
    }

    let mut dec = Decoder::new(&bytes[PAYLOAD_MAGIC.len() + 1..]);
    let spec = decode_spec(&mut dec)?;
    if dec.remaining() != 0 {
        return Err(PayloadError::Corrupt("trailing bytes after callable spec".to_string()));
    }
    spec.validate().map_err(PayloadError::Corrupt)?;
    Ok(spec)
}

fn encode_spec(enc: &mut Encoder, spec: &CallableSpec) -> ferrypack::Result<()> {
    match spec {
        CallableSpec::LoadBalanced => {
            enc.variant_begin("load-balanced")?;
            enc.unit()?;
            enc.variant_end()?;
        }
        CallableSpec::Modulo { buckets } => {
            enc.variant_begin("modulo")?;
            enc.int(i64::from(*buckets))?;
            enc.variant_end()?;
        }
        CallableSpec::Table { routes, fallback } => {
            enc.variant_begin("table")?;
            enc.map_begin()?;
            enc.variant_begin("routes")?;
            enc.list_begin()?;
            for (key, partition) in routes {
                enc.list_begin()?;
                enc.int(*key)?;
                enc.int(*partition)?;
                enc.list_end()?;
            }
            enc.list_end()?;
            enc.variant_end()?;
            enc.variant_begin("fallback")?;
            enc.int(*fallback)?;
            enc.variant_end()?;
            enc.map_end()?;
            enc.variant_end()?;
        }
    }
    Ok(())
}

fn decode_spec(dec: &mut Decoder) -> Result<CallableSpec> {
    let corrupt = |e: ferrypack::Error| PayloadError::Corrupt(e.to_string());

    let (op, mut body) = dec.variant().map_err(corrupt)?;
    match op {
        "load-balanced" => {
            body.unit().map_err(corrupt)?;
            Ok(CallableSpec::LoadBalanced)
        }
        "modulo" => {
            let raw = body.int().map_err(corrupt)?;
            let buckets = u32::try_from(raw).map_err(|_| {
                PayloadError::Corrupt(format!("modulo bucket count {} out of range", raw))
            })?;
            Ok(CallableSpec::Modulo { buckets })
        }
        "table" => {
            let mut routes = Vec::new();
            let mut fallback = None;
            let mut map = body.map().map_err(corrupt)?;
            while let Some((key, mut val)) = map.next().map_err(corrupt)? {
                match key {
                    "routes" => {
                        let mut iter = val.list().map_err(corrupt)?;
                        while let Some(mut pair) = iter.next() {
                            let mut inner = pair.list().map_err(corrupt)?;
                            let mut k = inner.next().ok_or_else(|| {
                                PayloadError::Corrupt("route entry missing key".to_string())
                            })?;
                            let mut p = inner.next().ok_or_else(|| {
                                PayloadError::Corrupt("route entry missing partition".to_string())
                            })?;
                            routes.push((k.int().map_err(corrupt)?, p.int().map_err(corrupt)?));
                        }
                    }
                    "fallback" => fallback = Some(val.int().map_err(corrupt)?),
                    _ => val.skip().map_err(corrupt)?,
                }
            }
            Ok(CallableSpec::Table {
                routes,
                fallback: fallback
                    .ok_or_else(|| PayloadError::Corrupt("table spec missing fallback".to_string()))?,
            })
        }
        other => Err(PayloadError::VersionMismatch(format!(
            "unknown operation '{}'; this host is older than the client",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferryrpc::Value;

    #[test]
    fn test_roundtrip_preserves_behavior() {
        let spec = CallableSpec::Modulo { buckets: 4 };
        let payload = serialize(&LocalCallable::Spec(spec.clone())).unwrap();
        let rebuilt = deserialize(&payload).unwrap();
        assert_eq!(rebuilt, spec);

        let mut original = spec.materialize();
        let mut shipped = rebuilt.materialize();
        for raw in [0, 7, 8, -3, 1000] {
            assert_eq!(
                original.partition(0, &Value::Int(raw)).unwrap(),
                shipped.partition(0, &Value::Int(raw)).unwrap(),
            );
        }
    }

    #[test]
    fn test_table_roundtrip() {
        let spec = CallableSpec::Table { routes: vec![(1, 10), (2, 20)], fallback: 0 };
        let payload = serialize(&LocalCallable::Spec(spec.clone())).unwrap();
        assert_eq!(deserialize(&payload).unwrap(), spec);
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let callable = LocalCallable::table(vec![(5, 50)], 1);
        let a = serialize(&callable).unwrap();
        let b = serialize(&callable).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_native_object_rejected() {
        use crate::partition::LoadBalancedFn;

        let callable = LocalCallable::Native(Box::new(LoadBalancedFn::new()));
        match serialize(&callable) {
            Err(PayloadError::UnsupportedObject(_)) => {}
            other => panic!("expected UnsupportedObject, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_zero_buckets_rejected() {
        match serialize(&LocalCallable::modulo(0)) {
            Err(PayloadError::UnsupportedObject(msg)) => assert!(msg.contains("zero buckets")),
            other => panic!("expected UnsupportedObject, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_truncated_payload_is_corrupt() {
        let payload = serialize(&LocalCallable::load_balanced()).unwrap();
        let mut bytes = payload.as_bytes().to_vec();
        bytes.truncate(bytes.len() - 2);

        match deserialize(&CallablePayload::from_bytes(bytes)) {
            Err(PayloadError::Corrupt(_)) => {}
            other => panic!("expected Corrupt, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let payload = serialize(&LocalCallable::load_balanced()).unwrap();
        let mut bytes = payload.as_bytes().to_vec();
        bytes[0] = b'X';

        match deserialize(&CallablePayload::from_bytes(bytes)) {
            Err(PayloadError::Corrupt(msg)) => assert!(msg.contains("magic")),
            other => panic!("expected Corrupt, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_foreign_version_is_mismatch() {
        let payload = serialize(&LocalCallable::load_balanced()).unwrap();
        let mut bytes = payload.as_bytes().to_vec();
        bytes[PAYLOAD_MAGIC.len()] = FORMAT_VERSION + 1;

        match deserialize(&CallablePayload::from_bytes(bytes)) {
            Err(PayloadError::VersionMismatch(_)) => {}
            other => panic!("expected VersionMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unknown_operation_is_mismatch() {
        let mut enc = Encoder::new();
        enc.variant_begin("quantum-split").unwrap();
        enc.unit().unwrap();
        enc.variant_end().unwrap();
        let body = enc.into_bytes().unwrap();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&PAYLOAD_MAGIC);
        bytes.push(FORMAT_VERSION);
        bytes.extend_from_slice(&body);

        match deserialize(&CallablePayload::from_bytes(bytes)) {
            Err(PayloadError::VersionMismatch(msg)) => assert!(msg.contains("quantum-split")),
            other => panic!("expected VersionMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let payload = serialize(&LocalCallable::load_balanced()).unwrap();
        let mut bytes = payload.as_bytes().to_vec();
        bytes.push(0x00);

        match deserialize(&CallablePayload::from_bytes(bytes)) {
            Err(PayloadError::Corrupt(msg)) => assert!(msg.contains("trailing")),
            other => panic!("expected Corrupt, got {:?}", other.map(|_| ())),
        }
    }
}
