//! The typed key-value argument codec (spec §6: "a length-prefixed
//! key-value list — typed — each entry carries a byte code identifying the
//! value type"). Grounded on `dekaf`/`cgo`'s use of `bytes::{Buf, BufMut}`
//! for hand-rolled wire formats in the teacher, rather than a serde-based
//! encoding: the wire shape here is fixed and small enough that a direct
//! codec reads more plainly than a derive would.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use drms_types::value::{Value, ValueType};

use crate::error::{ProtoError, Result};

fn type_tag(t: ValueType) -> u8 {
    match t {
        ValueType::Char => 0,
        ValueType::Short => 1,
        ValueType::Int => 2,
        ValueType::Long => 3,
        ValueType::Float => 4,
        ValueType::Double => 5,
        ValueType::Time => 6,
        ValueType::String => 7,
    }
}

fn type_from_tag(tag: u8) -> Result<ValueType> {
    Ok(match tag {
        0 => ValueType::Char,
        1 => ValueType::Short,
        2 => ValueType::Int,
        3 => ValueType::Long,
        4 => ValueType::Float,
        5 => ValueType::Double,
        6 => ValueType::Time,
        7 => ValueType::String,
        other => return Err(ProtoError::UnknownValueTag(other)),
    })
}

fn put_value(buf: &mut BytesMut, value: &Value) {
    buf.put_u8(type_tag(value.value_type()));
    match value {
        Value::Char(v) => buf.put_i8(*v),
        Value::Short(v) => buf.put_i16(*v),
        Value::Int(v) => buf.put_i32(*v),
        Value::Long(v) => buf.put_i64(*v),
        Value::Float(v) => buf.put_f32(*v),
        Value::Double(v) => buf.put_f64(*v),
        Value::Time(v) => buf.put_f64(*v),
        Value::String(bytes) => {
            buf.put_u32(bytes.len() as u32);
            buf.put_slice(bytes);
        }
    }
}

fn take_value(buf: &mut Bytes) -> Result<Value> {
    if !buf.has_remaining() {
        return Err(ProtoError::MalformedKvList("missing value tag".into()));
    }
    let tag = buf.get_u8();
    let t = type_from_tag(tag)?;
    let need = match t {
        ValueType::Char => 1,
        ValueType::Short => 2,
        ValueType::Int | ValueType::Float => 4,
        ValueType::Long | ValueType::Double | ValueType::Time => 8,
        ValueType::String => 4,
    };
    if buf.remaining() < need {
        return Err(ProtoError::MalformedKvList(format!(
            "truncated {t} value: need {need} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(match t {
        ValueType::Char => Value::Char(buf.get_i8()),
        ValueType::Short => Value::Short(buf.get_i16()),
        ValueType::Int => Value::Int(buf.get_i32()),
        ValueType::Long => Value::Long(buf.get_i64()),
        ValueType::Float => Value::Float(buf.get_f32()),
        ValueType::Double => Value::Double(buf.get_f64()),
        ValueType::Time => Value::Time(buf.get_f64()),
        ValueType::String => {
            let len = buf.get_u32() as usize;
            if buf.remaining() < len {
                return Err(ProtoError::MalformedKvList("truncated string value".into()));
            }
            let bytes = buf.copy_to_bytes(len);
            Value::String(bytes.to_vec())
        }
    })
}

/// Encodes a key-value argument list: a `u32` entry count, then per entry a
/// `u16`-length-prefixed key and a tagged [`Value`].
pub fn encode_kv_list(args: &[(String, Value)]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u32(args.len() as u32);
    for (key, value) in args {
        let key_bytes = key.as_bytes();
        buf.put_u16(key_bytes.len() as u16);
        buf.put_slice(key_bytes);
        put_value(&mut buf, value);
    }
    buf.freeze()
}

pub fn decode_kv_list(bytes: &[u8]) -> Result<Vec<(String, Value)>> {
    let mut buf = Bytes::copy_from_slice(bytes);
    if buf.remaining() < 4 {
        return Err(ProtoError::Truncated {
            expected: 4,
            got: buf.remaining(),
        });
    }
    let count = buf.get_u32() as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.remaining() < 2 {
            return Err(ProtoError::MalformedKvList("truncated key length".into()));
        }
        let key_len = buf.get_u16() as usize;
        if buf.remaining() < key_len {
            return Err(ProtoError::MalformedKvList("truncated key".into()));
        }
        let key = String::from_utf8(buf.copy_to_bytes(key_len).to_vec())
            .map_err(|e| ProtoError::MalformedKvList(e.to_string()))?;
        let value = take_value(&mut buf)?;
        out.push((key, value));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_kv_list() {
        let args = vec![
            ("series".to_string(), Value::String(b"su.prod.foo".to_vec())),
            ("recnum".to_string(), Value::Long(42)),
            ("rank".to_string(), Value::Short(-3)),
            ("scale".to_string(), Value::Double(1.5)),
        ];
        let wire = encode_kv_list(&args);
        let back = decode_kv_list(&wire).unwrap();
        assert_eq!(back.len(), args.len());
        for ((k1, v1), (k2, v2)) in args.iter().zip(back.iter()) {
            assert_eq!(k1, k2);
            assert_eq!(v1, v2);
        }
    }

    #[test]
    fn rejects_truncated_list() {
        assert!(decode_kv_list(&[0, 0, 0, 1]).is_err());
    }
}
