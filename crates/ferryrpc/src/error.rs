// crates/ferryrpc/src/error.rs
//! # Error Definitions
//!
//! Two distinct failure families live here, mirroring the two sides of a
//! boundary crossing: `Error` is the *protocol* failing (bad bytes,
//! malformed frames), `Fault` is the *remote system* reporting a failure
//! as data inside a well-formed Reply.

use ferrypack::Error as PackError;

/// Operational failures within the RPC mechanism itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The underlying ferrypack layer failed (truncation, bad tags).
    Pack(PackError),
    /// The message structure was invalid (missing header field, wrong
    /// container shape).
    ProtocolViolation(String),
    /// An unknown variant name was encountered at the frame or fault level.
    UnknownVariant(String),
    /// A value exceeded the nesting depth limit.
    ValueTooDeep,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Pack(e) => write!(f, "ferrypack error: {}", e),
            Error::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            Error::UnknownVariant(name) => write!(f, "unknown variant: {}", name),
            Error::ValueTooDeep => write!(f, "value exceeds the nesting depth limit"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Pack(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PackError> for Error {
    fn from(e: PackError) -> Self {
        Error::Pack(e)
    }
}

/// A specialized Result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The taxonomy of host-reported failures.
///
/// These travel inside the Err side of a Reply frame as kebab-case tags,
/// never as transport errors. Transport failures are a separate concern
/// and a separate type (`ferryrun::transport`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The callable references runtime-local state and cannot cross.
    UnsupportedObject,
    /// The payload bytes could not be decoded.
    CorruptPayload,
    /// The payload format tag is incompatible with this host.
    VersionMismatch,
    /// The handle was never registered or has been released.
    UnknownHandle,
    /// The method is not part of the capability set.
    UnsupportedMethod,
    /// An argument or result is not representable on the wire.
    UnmarshalableValue,
    /// A call was made outside the Live lifecycle state.
    InvalidState,
    /// The remote method itself failed during execution. The message is
    /// preserved; stack context is dropped at the boundary.
    RemoteExecution,
}

impl FaultKind {
    /// The wire tag for this kind.
    pub fn as_tag(&self) -> &'static str {
        match self {
            FaultKind::UnsupportedObject => "unsupported-object",
            FaultKind::CorruptPayload => "corrupt-payload",
            FaultKind::VersionMismatch => "version-mismatch",
            FaultKind::UnknownHandle => "unknown-handle",
            FaultKind::UnsupportedMethod => "unsupported-method",
            FaultKind::UnmarshalableValue => "unmarshalable-value",
            FaultKind::InvalidState => "invalid-state",
            FaultKind::RemoteExecution => "remote-execution",
        }
    }

    /// Parses a wire tag back into a kind.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "unsupported-object" => Ok(FaultKind::UnsupportedObject),
            "corrupt-payload" => Ok(FaultKind::CorruptPayload),
            "version-mismatch" => Ok(FaultKind::VersionMismatch),
            "unknown-handle" => Ok(FaultKind::UnknownHandle),
            "unsupported-method" => Ok(FaultKind::UnsupportedMethod),
            "unmarshalable-value" => Ok(FaultKind::UnmarshalableValue),
            "invalid-state" => Ok(FaultKind::InvalidState),
            "remote-execution" => Ok(FaultKind::RemoteExecution),
            other => Err(Error::UnknownVariant(format!("fault kind: {}", other))),
        }
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A structured failure descriptor reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Fault {}
