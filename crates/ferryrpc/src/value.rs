// crates/ferryrpc/src/value.rs
//! # Wire Value Model
//!
//! The shared representation for everything that crosses the boundary:
//! primitives, and well-formed sequences and mappings of the same.
//!
//! Values are self-describing on the wire. Decoding needs no out-of-band
//! type information, which is what lets the host reconstruct arguments
//! for an object it has never seen the source of.
//!
//! ## Invariants
//! - Nesting is bounded by [`MAX_VALUE_DEPTH`]; deeper values are
//!   rejected on both encode and decode.

use ferrypack::Decoder;
use ferrypack::Encoder;
use ferrypack::Tag;

use crate::error::Error;
use crate::error::Result;

/// The maximum nesting depth for values crossing the boundary.
pub const MAX_VALUE_DEPTH: usize = 64;

/// A value in the shared wire representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// String-keyed mapping. Entry order is preserved on the wire.
    Map(Vec<(String, Value)>),
}

impl Value {
    /// A short description of the value's shape, for error messages.
    pub fn type_desc(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

/// Encodes a value into the encoder stream.
///
/// # Errors
/// Returns `Error::ValueTooDeep` if the value nests past
/// [`MAX_VALUE_DEPTH`].
pub fn encode_value(enc: &mut Encoder, value: &Value) -> Result<()> {
    encode_value_at(enc, value, 0)
}

fn encode_value_at(enc: &mut Encoder, value: &Value, depth: usize) -> Result<()> {
    if depth > MAX_VALUE_DEPTH {
        return Err(Error::ValueTooDeep);
    }

    match value {
        Value::Unit => enc.unit()?,
        Value::Bool(b) => enc.bool(*b)?,
        Value::Int(v) => enc.int(*v)?,
        Value::Float(v) => enc.float(*v)?,
        Value::Str(s) => enc.str(s)?,
        Value::Bytes(b) => enc.bytes(b)?,
        Value::List(items) => {
            enc.list_begin()?;
            for item in items {
                encode_value_at(enc, item, depth + 1)?;
            }
            enc.list_end()?;
        }
        Value::Map(entries) => {
            enc.map_begin()?;
            for (key, item) in entries {
                enc.variant_begin(key)?;
                encode_value_at(enc, item, depth + 1)?;
                enc.variant_end()?;
            }
            enc.map_end()?;
        }
    }
    Ok(())
}

/// Encodes a list of values as a single List container.
///
/// Used for argument lists; the receiving side reads them back with
/// [`decode_values`].
pub fn encode_values(enc: &mut Encoder, values: &[Value]) -> Result<()> {
    enc.list_begin()?;
    for value in values {
        encode_value_at(enc, value, 1)?;
    }
    enc.list_end()?;
    Ok(())
}

/// Decodes a single self-describing value.
pub fn decode_value(dec: &mut Decoder) -> Result<Value> {
    decode_value_at(dec, 0)
}

fn decode_value_at(dec: &mut Decoder, depth: usize) -> Result<Value> {
    if depth > MAX_VALUE_DEPTH {
        return Err(Error::ValueTooDeep);
    }

    match dec.peek_tag()? {
        Tag::Unit => {
            dec.unit()?;
            Ok(Value::Unit)
        }
        Tag::BoolTrue | Tag::BoolFalse => Ok(Value::Bool(dec.bool()?)),
        Tag::Int => Ok(Value::Int(dec.int()?)),
        Tag::Float => Ok(Value::Float(dec.float()?)),
        Tag::Str => Ok(Value::Str(dec.str()?.to_string())),
        Tag::Bytes => Ok(Value::Bytes(dec.bytes()?.to_vec())),
        Tag::List => {
            let mut iter = dec.list()?;
            let mut items = Vec::new();
            while let Some(mut item) = iter.next() {
                items.push(decode_value_at(&mut item, depth + 1)?);
            }
            Ok(Value::List(items))
        }
        Tag::Map => {
            let mut iter = dec.map()?;
            let mut entries = Vec::new();
            while let Some((key, mut item)) = iter.next()? {
                entries.push((key.to_string(), decode_value_at(&mut item, depth + 1)?));
            }
            Ok(Value::Map(entries))
        }
        other => Err(Error::ProtocolViolation(format!(
            "tag {:?} is not a wire value",
            other
        ))),
    }
}

/// Decodes a List container of values.
///
/// The decoder must be positioned at the List produced by
/// [`encode_values`].
pub fn decode_values(mut list_decoder: Decoder) -> Result<Vec<Value>> {
    let mut iter = list_decoder.list()?;
    let mut values = Vec::new();
    while let Some(mut item) = iter.next() {
        values.push(decode_value_at(&mut item, 1)?);
    }
    Ok(values)
}
