// crates/ferryrpc/src/lib.rs
//! # Ferryrpc
//!
//! The wire protocol of the ferry bridge: a self-describing value model
//! and the BUILD / CALL / RELEASE / Reply frame envelopes, encoded with
//! [ferrypack].
//!
//! ## Architecture
//!
//! Frames are named variants wrapping a keyed map, so unknown header
//! fields can be skipped by older peers:
//! - Build: `["Build", {seq, payload}]`
//! - Call: `["Call", {seq, handle, method, args: [...]}]`
//! - Release: `["Release", {seq, handle}]`
//! - Reply: `["Reply", Result<{seq, value}, {seq, kind, message}>]`
//!
//! The failure side of a Reply is a structured fault descriptor
//! (`kind` + `message`), never a raw panic.

mod error;
mod frame;
mod value;

#[cfg(test)]
mod tests;

pub use crate::error::Error;
pub use crate::error::Fault;
pub use crate::error::FaultKind;
pub use crate::error::Result;

pub use crate::value::MAX_VALUE_DEPTH;
pub use crate::value::Value;
pub use crate::value::decode_value;
pub use crate::value::decode_values;
pub use crate::value::encode_value;
pub use crate::value::encode_values;

pub use crate::frame::BuildEncoder;
pub use crate::frame::CallEncoder;
pub use crate::frame::Frame;
pub use crate::frame::ReleaseEncoder;
pub use crate::frame::ReplyErrEncoder;
pub use crate::frame::ReplyOkEncoder;
pub use crate::frame::peek_seq;
