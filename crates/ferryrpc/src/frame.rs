// crates/ferryrpc/src/frame.rs
//! # Protocol Frames
//!
//! The envelopes of the wire contract: BUILD, CALL, RELEASE, and Reply.
//!
//! ## Invariants
//! - **Panic Safety**: all decoding paths return `Result`, never panicking
//!   on unknown data.
//! - **Forward Compatibility**: unknown header fields are safely skipped.

use ferrypack::Decoder;
use ferrypack::Encoder;

use crate::error::Error;
use crate::error::Fault;
use crate::error::FaultKind;
use crate::error::Result;
use crate::value::Value;
use crate::value::encode_value;
use crate::value::encode_values;

/// Encodes an outbound Build frame carrying a serialized callable.
pub struct BuildEncoder<'a> {
    pub seq: u64,
    pub payload: &'a [u8],
}

impl<'a> BuildEncoder<'a> {
    pub fn new(seq: u64, payload: &'a [u8]) -> Self {
        Self { seq, payload }
    }

    /// Encode this frame into the encoder.
    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.variant_begin("Build")?;
        enc.map_begin()?;
        write_entry_u64(enc, "seq", self.seq)?;
        enc.variant_begin("payload")?;
        enc.bytes(self.payload)?;
        enc.variant_end()?;
        enc.map_end()?;
        enc.variant_end()?;
        Ok(())
    }
}

/// Encodes an outbound Call frame.
pub struct CallEncoder<'a> {
    pub seq: u64,
    pub handle: u64,
    pub method: &'a str,
    pub args: &'a [Value],
}

impl<'a> CallEncoder<'a> {
    pub fn new(seq: u64, handle: u64, method: &'a str, args: &'a [Value]) -> Self {
        Self { seq, handle, method, args }
    }

    /// Encode this frame into the encoder.
    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.variant_begin("Call")?;
        enc.map_begin()?;

        write_entry_u64(enc, "seq", self.seq)?;
        write_entry_u64(enc, "handle", self.handle)?;
        write_entry_str(enc, "method", self.method)?;

        enc.variant_begin("args")?;
        encode_values(enc, self.args)?;
        enc.variant_end()?;

        enc.map_end()?;
        enc.variant_end()?;
        Ok(())
    }
}

/// Encodes an outbound Release frame.
pub struct ReleaseEncoder {
    pub seq: u64,
    pub handle: u64,
}

impl ReleaseEncoder {
    pub fn new(seq: u64, handle: u64) -> Self {
        Self { seq, handle }
    }

    /// Encode this frame into the encoder.
    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.variant_begin("Release")?;
        enc.map_begin()?;
        write_entry_u64(enc, "seq", self.seq)?;
        write_entry_u64(enc, "handle", self.handle)?;
        enc.map_end()?;
        enc.variant_end()?;
        Ok(())
    }
}

/// Encodes an outbound Reply frame (success).
pub struct ReplyOkEncoder<'a> {
    pub seq: u64,
    pub value: &'a Value,
}

impl<'a> ReplyOkEncoder<'a> {
    pub fn new(seq: u64, value: &'a Value) -> Self {
        Self { seq, value }
    }

    /// Encode this success reply into the encoder.
    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.variant_begin("Reply")?;
        enc.result_ok_begin()?;
        enc.map_begin()?;

        write_entry_u64(enc, "seq", self.seq)?;
        enc.variant_begin("value")?;
        encode_value(enc, self.value)?;
        enc.variant_end()?;

        enc.map_end()?;
        enc.result_ok_end()?;
        enc.variant_end()?;
        Ok(())
    }
}

/// Encodes an outbound Reply frame (failure).
pub struct ReplyErrEncoder<'a> {
    pub seq: u64,
    pub fault: &'a Fault,
}

impl<'a> ReplyErrEncoder<'a> {
    pub fn new(seq: u64, fault: &'a Fault) -> Self {
        Self { seq, fault }
    }

    /// Encode this failure reply into the encoder.
    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.variant_begin("Reply")?;
        enc.result_err_begin()?;
        enc.map_begin()?;

        write_entry_u64(enc, "seq", self.seq)?;
        write_entry_str(enc, "kind", self.fault.kind.as_tag())?;
        write_entry_str(enc, "message", &self.fault.message)?;

        enc.map_end()?;
        enc.result_err_end()?;
        enc.variant_end()?;
        Ok(())
    }
}

/// A decoded Build frame.
pub struct BuildFrame<'a> {
    pub seq: u64,
    pub payload: &'a [u8],
}

/// A decoded Call frame.
///
/// **Invariant**: `args` is a decoder positioned at the List container of
/// arguments; read it with `decode_values`.
pub struct CallFrame<'a> {
    pub seq: u64,
    pub handle: u64,
    pub method: &'a str,
    pub args: Decoder<'a>,
}

/// A decoded Release frame.
pub struct ReleaseFrame {
    pub seq: u64,
    pub handle: u64,
}

/// A decoded Reply frame.
pub struct ReplyFrame<'a> {
    pub seq: u64,
    /// The outcome of the request.
    /// - `Ok(Decoder)`: success; positioned at the reply value.
    /// - `Err(Fault)`: a structured host-side failure.
    pub status: std::result::Result<Decoder<'a>, Fault>,
}

/// Top-level frame decoder.
pub enum Frame<'a> {
    Build(BuildFrame<'a>),
    Call(CallFrame<'a>),
    Release(ReleaseFrame),
    Reply(ReplyFrame<'a>),
}

impl<'a> Frame<'a> {
    /// Decode any wire frame from the decoder.
    pub fn decode(dec: &mut Decoder<'a>) -> Result<Self> {
        let (name, body) = dec.variant()?;
        match name {
            "Build" => Ok(Frame::Build(decode_build(body)?)),
            "Call" => Ok(Frame::Call(decode_call(body)?)),
            "Release" => Ok(Frame::Release(decode_release(body)?)),
            "Reply" => Ok(Frame::Reply(decode_reply(body)?)),
            other => Err(Error::UnknownVariant(format!("top-level frame: {}", other))),
        }
    }
}

fn decode_build(mut body: Decoder) -> Result<BuildFrame> {
    let mut map = body.map()?;
    let mut seq = None;
    let mut payload = None;

    while let Some((key, mut val)) = map.next()? {
        match key {
            "seq" => seq = Some(read_u64(&mut val)?),
            "payload" => payload = Some(val.bytes()?),
            _ => val.skip()?,
        }
    }

    Ok(BuildFrame {
        seq: seq.ok_or_else(|| missing("seq"))?,
        payload: payload.ok_or_else(|| missing("payload"))?,
    })
}

fn decode_call(mut body: Decoder) -> Result<CallFrame> {
    let mut map = body.map()?;
    let mut seq = None;
    let mut handle = None;
    let mut method = None;
    let mut args = None;

    while let Some((key, mut val)) = map.next()? {
        match key {
            "seq" => seq = Some(read_u64(&mut val)?),
            "handle" => handle = Some(read_u64(&mut val)?),
            "method" => method = Some(val.str()?),
            "args" => args = Some(val),
            _ => val.skip()?,
        }
    }

    Ok(CallFrame {
        seq: seq.ok_or_else(|| missing("seq"))?,
        handle: handle.ok_or_else(|| missing("handle"))?,
        method: method.ok_or_else(|| missing("method"))?,
        args: args.ok_or_else(|| missing("args"))?,
    })
}

fn decode_release(mut body: Decoder) -> Result<ReleaseFrame> {
    let mut map = body.map()?;
    let mut seq = None;
    let mut handle = None;

    while let Some((key, mut val)) = map.next()? {
        match key {
            "seq" => seq = Some(read_u64(&mut val)?),
            "handle" => handle = Some(read_u64(&mut val)?),
            _ => val.skip()?,
        }
    }

    Ok(ReleaseFrame {
        seq: seq.ok_or_else(|| missing("seq"))?,
        handle: handle.ok_or_else(|| missing("handle"))?,
    })
}

fn decode_reply(mut body: Decoder) -> Result<ReplyFrame> {
    match body.result()? {
        Ok(mut ok_body) => {
            let mut map = ok_body.map()?;
            let mut seq = None;
            let mut value = None;

            while let Some((key, mut val)) = map.next()? {
                match key {
                    "seq" => seq = Some(read_u64(&mut val)?),
                    "value" => value = Some(val),
                    _ => val.skip()?,
                }
            }

            Ok(ReplyFrame {
                seq: seq.ok_or_else(|| missing("seq"))?,
                status: Ok(value.ok_or_else(|| missing("value"))?),
            })
        }
        Err(mut err_body) => {
            let mut map = err_body.map()?;
            let mut seq = None;
            let mut kind = None;
            let mut message = None;

            while let Some((key, mut val)) = map.next()? {
                match key {
                    "seq" => seq = Some(read_u64(&mut val)?),
                    "kind" => kind = Some(FaultKind::from_tag(val.str()?)?),
                    "message" => message = Some(val.str()?.to_string()),
                    _ => val.skip()?,
                }
            }

            Ok(ReplyFrame {
                seq: seq.ok_or_else(|| missing("seq"))?,
                status: Err(Fault {
                    kind: kind.ok_or_else(|| missing("kind"))?,
                    message: message.unwrap_or_default(),
                }),
            })
        }
    }
}

/// Decodes just the sequence number from a raw frame.
///
/// Useful for addressing a failure reply when full decoding fails.
pub fn peek_seq(bytes: &[u8]) -> Result<u64> {
    let mut dec = Decoder::new(bytes);
    let (name, mut body) = dec.variant()?;
    let mut map = match name {
        "Build" | "Call" | "Release" => body.map()?,
        "Reply" => match body.result()? {
            Ok(mut ok_body) => ok_body.map()?,
            Err(mut err_body) => err_body.map()?,
        },
        other => return Err(Error::UnknownVariant(format!("top-level frame: {}", other))),
    };

    while let Some((key, mut val)) = map.next()? {
        if key == "seq" {
            return Ok(read_u64(&mut val)?);
        }
        val.skip()?;
    }

    Err(missing("seq"))
}

// Helper functions

fn write_entry_u64(enc: &mut Encoder, key: &str, val: u64) -> Result<()> {
    enc.variant_begin(key)?;
    // The wire integer is i64; ids and sequence numbers stay well below
    // the sign bit in practice.
    enc.int(val as i64)?;
    enc.variant_end()?;
    Ok(())
}

fn write_entry_str(enc: &mut Encoder, key: &str, val: &str) -> Result<()> {
    enc.variant_begin(key)?;
    enc.str(val)?;
    enc.variant_end()?;
    Ok(())
}

fn read_u64(dec: &mut Decoder) -> Result<u64> {
    let raw = dec.int()?;
    u64::try_from(raw)
        .map_err(|_| Error::ProtocolViolation(format!("negative identifier: {}", raw)))
}

fn missing(field: &str) -> Error {
    Error::ProtocolViolation(format!("missing {}", field))
}
