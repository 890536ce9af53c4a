use ferrypack::Decoder;
use ferrypack::Encoder;

use crate::*;

fn roundtrip(value: &Value) -> Value {
    let mut enc = Encoder::new();
    encode_value(&mut enc, value).unwrap();
    let bytes = enc.into_bytes().unwrap();
    let mut dec = Decoder::new(&bytes);
    decode_value(&mut dec).unwrap()
}

// ============================================================================
//  VALUES
// ============================================================================

#[test]
fn test_scalar_values_roundtrip() {
    for value in [
        Value::Unit,
        Value::Bool(true),
        Value::Bool(false),
        Value::Int(-77),
        Value::Float(2.5),
        Value::Str("partition".into()),
        Value::Bytes(vec![1, 2, 3]),
    ] {
        assert_eq!(roundtrip(&value), value);
    }
}

#[test]
fn test_nested_values_roundtrip() {
    let value = Value::Map(vec![
        ("sources".into(), Value::List(vec![Value::Int(0), Value::Int(1)])),
        (
            "meta".into(),
            Value::Map(vec![("name".into(), Value::Str("lb".into()))]),
        ),
    ]);
    assert_eq!(roundtrip(&value), value);
}

#[test]
fn test_value_depth_limit_on_encode() {
    let mut value = Value::Int(0);
    for _ in 0..=MAX_VALUE_DEPTH {
        value = Value::List(vec![value]);
    }

    let mut enc = Encoder::new();
    match encode_value(&mut enc, &value) {
        Err(Error::ValueTooDeep) => {}
        other => panic!("expected ValueTooDeep, got {:?}", other),
    }
}

#[test]
fn test_values_list_roundtrip() {
    let args = vec![Value::Int(0), Value::Str("val".into())];

    let mut enc = Encoder::new();
    encode_values(&mut enc, &args).unwrap();
    let bytes = enc.into_bytes().unwrap();

    let decoded = decode_values(Decoder::new(&bytes)).unwrap();
    assert_eq!(decoded, args);
}

// ============================================================================
//  FAULTS
// ============================================================================

#[test]
fn test_fault_kind_tag_roundtrip() {
    let kinds = [
        FaultKind::UnsupportedObject,
        FaultKind::CorruptPayload,
        FaultKind::VersionMismatch,
        FaultKind::UnknownHandle,
        FaultKind::UnsupportedMethod,
        FaultKind::UnmarshalableValue,
        FaultKind::InvalidState,
        FaultKind::RemoteExecution,
    ];
    for kind in kinds {
        assert_eq!(FaultKind::from_tag(kind.as_tag()).unwrap(), kind);
    }
}

#[test]
fn test_unknown_fault_tag_rejected() {
    match FaultKind::from_tag("out-of-cheese") {
        Err(Error::UnknownVariant(_)) => {}
        other => panic!("expected UnknownVariant, got {:?}", other),
    }
}

// ============================================================================
//  FRAMES
// ============================================================================

#[test]
fn test_build_frame_roundtrip() -> anyhow::Result<()> {
    let mut enc = Encoder::new();
    BuildEncoder::new(3, &[0xAB, 0xCD]).encode(&mut enc)?;
    let bytes = enc.into_bytes()?;

    let mut dec = Decoder::new(&bytes);
    match Frame::decode(&mut dec)? {
        Frame::Build(build) => {
            assert_eq!(build.seq, 3);
            assert_eq!(build.payload, &[0xAB, 0xCD]);
        }
        _ => panic!("expected Build frame"),
    }
    Ok(())
}

#[test]
fn test_call_frame_roundtrip() -> anyhow::Result<()> {
    let args = vec![Value::Int(0), Value::Int(7)];
    let mut enc = Encoder::new();
    CallEncoder::new(11, 42, "partition", &args).encode(&mut enc)?;
    let bytes = enc.into_bytes()?;

    let mut dec = Decoder::new(&bytes);
    match Frame::decode(&mut dec)? {
        Frame::Call(call) => {
            assert_eq!(call.seq, 11);
            assert_eq!(call.handle, 42);
            assert_eq!(call.method, "partition");
            assert_eq!(decode_values(call.args)?, args);
        }
        _ => panic!("expected Call frame"),
    }
    Ok(())
}

#[test]
fn test_release_frame_roundtrip() -> anyhow::Result<()> {
    let mut enc = Encoder::new();
    ReleaseEncoder::new(5, 9).encode(&mut enc)?;
    let bytes = enc.into_bytes()?;

    let mut dec = Decoder::new(&bytes);
    match Frame::decode(&mut dec)? {
        Frame::Release(release) => {
            assert_eq!(release.seq, 5);
            assert_eq!(release.handle, 9);
        }
        _ => panic!("expected Release frame"),
    }
    Ok(())
}

#[test]
fn test_reply_ok_roundtrip() -> anyhow::Result<()> {
    let mut enc = Encoder::new();
    ReplyOkEncoder::new(8, &Value::Int(3)).encode(&mut enc)?;
    let bytes = enc.into_bytes()?;

    let mut dec = Decoder::new(&bytes);
    match Frame::decode(&mut dec)? {
        Frame::Reply(reply) => {
            assert_eq!(reply.seq, 8);
            let mut value_dec = reply.status.expect("success reply");
            assert_eq!(decode_value(&mut value_dec)?, Value::Int(3));
        }
        _ => panic!("expected Reply frame"),
    }
    Ok(())
}

#[test]
fn test_reply_err_roundtrip() -> anyhow::Result<()> {
    let fault = Fault::new(FaultKind::UnknownHandle, "handle-4 was released");
    let mut enc = Encoder::new();
    ReplyErrEncoder::new(8, &fault).encode(&mut enc)?;
    let bytes = enc.into_bytes()?;

    let mut dec = Decoder::new(&bytes);
    match Frame::decode(&mut dec)? {
        Frame::Reply(reply) => {
            assert_eq!(reply.seq, 8);
            match reply.status {
                Err(decoded) => assert_eq!(decoded, fault),
                Ok(_) => panic!("expected failure reply"),
            }
        }
        _ => panic!("expected Reply frame"),
    }
    Ok(())
}

#[test]
fn test_unknown_top_level_frame_rejected() {
    let mut enc = Encoder::new();
    enc.variant_begin("Gossip").unwrap();
    enc.unit().unwrap();
    enc.variant_end().unwrap();
    let bytes = enc.into_bytes().unwrap();

    let mut dec = Decoder::new(&bytes);
    match Frame::decode(&mut dec) {
        Err(Error::UnknownVariant(_)) => {}
        other => panic!("expected UnknownVariant, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_peek_seq_from_every_frame() -> anyhow::Result<()> {
    let mut enc = Encoder::new();
    BuildEncoder::new(21, &[]).encode(&mut enc)?;
    assert_eq!(peek_seq(&enc.into_bytes()?)?, 21);

    let mut enc = Encoder::new();
    CallEncoder::new(22, 1, "commit", &[]).encode(&mut enc)?;
    assert_eq!(peek_seq(&enc.into_bytes()?)?, 22);

    let mut enc = Encoder::new();
    ReleaseEncoder::new(23, 1).encode(&mut enc)?;
    assert_eq!(peek_seq(&enc.into_bytes()?)?, 23);

    let mut enc = Encoder::new();
    let fault = Fault::new(FaultKind::RemoteExecution, "exec failed");
    ReplyErrEncoder::new(24, &fault).encode(&mut enc)?;
    assert_eq!(peek_seq(&enc.into_bytes()?)?, 24);
    Ok(())
}

#[test]
fn test_call_frame_skips_unknown_fields() -> anyhow::Result<()> {
    // Hand-build a Call frame with an extra header field a future client
    // might send.
    let mut enc = Encoder::new();
    enc.variant_begin("Call")?;
    enc.map_begin()?;
    enc.variant_begin("seq")?;
    enc.int(1)?;
    enc.variant_end()?;
    enc.variant_begin("deadline_ms")?;
    enc.int(2500)?;
    enc.variant_end()?;
    enc.variant_begin("handle")?;
    enc.int(6)?;
    enc.variant_end()?;
    enc.variant_begin("method")?;
    enc.str("prepare")?;
    enc.variant_end()?;
    enc.variant_begin("args")?;
    enc.list_begin()?;
    enc.list_end()?;
    enc.variant_end()?;
    enc.map_end()?;
    enc.variant_end()?;
    let bytes = enc.into_bytes()?;

    let mut dec = Decoder::new(&bytes);
    match Frame::decode(&mut dec)? {
        Frame::Call(call) => {
            assert_eq!(call.seq, 1);
            assert_eq!(call.handle, 6);
            assert_eq!(call.method, "prepare");
        }
        _ => panic!("expected Call frame"),
    }
    Ok(())
}

#[test]
fn test_malformed_bytes_rejected() {
    let mut dec = Decoder::new(&[0xFF, 0x01, 0x02]);
    match Frame::decode(&mut dec) {
        Err(Error::Pack(_)) => {}
        other => panic!("expected Pack error, got {:?}", other.map(|_| ())),
    }
}
