//! Binary value frames.
//!
//! A value frame is a MessagePack array `[topicId, timestampMicros,
//! typeTag, payload]`. Payload decoding is directed by the tag, never
//! inferred from the payload itself. One binary transport message may
//! carry several frames back to back; `decode_values` yields all of them
//! and that batch is the subscription manager's delivery window.

use crate::error::{ClientError, Result};
use crate::types::{DataType, Timestamp, TopicId, Value};
use std::io::{Cursor, Read};

/// One decoded value frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueFrame {
    pub id: TopicId,
    pub timestamp: Timestamp,
    pub value: Value,
}

/// Encode a single value frame.
pub fn encode_value(id: TopicId, timestamp: Timestamp, value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    rmp::encode::write_array_len(&mut buf, 4)?;
    rmp::encode::write_sint(&mut buf, id.0)?;
    rmp::encode::write_uint(&mut buf, timestamp.0.max(0) as u64)?;
    rmp::encode::write_uint(&mut buf, value.tag() as u64)?;
    write_payload(&mut buf, value)?;
    Ok(buf)
}

fn write_payload(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Boolean(v) => {
            rmp::encode::write_bool(buf, *v).map_err(ClientError::Io)?;
        }
        Value::Double(v) => {
            rmp::encode::write_f64(buf, *v)?;
        }
        Value::Int(v) => {
            rmp::encode::write_sint(buf, *v)?;
        }
        Value::Float(v) => {
            rmp::encode::write_f32(buf, *v)?;
        }
        Value::Str(v) => {
            rmp::encode::write_str(buf, v)?;
        }
        Value::Raw(v) | Value::Structured { data: v, .. } => {
            rmp::encode::write_bin(buf, v)?;
        }
        Value::BooleanArray(v) => {
            rmp::encode::write_array_len(buf, v.len() as u32)?;
            for item in v {
                rmp::encode::write_bool(buf, *item).map_err(ClientError::Io)?;
            }
        }
        Value::DoubleArray(v) => {
            rmp::encode::write_array_len(buf, v.len() as u32)?;
            for item in v {
                rmp::encode::write_f64(buf, *item)?;
            }
        }
        Value::IntArray(v) => {
            rmp::encode::write_array_len(buf, v.len() as u32)?;
            for item in v {
                rmp::encode::write_sint(buf, *item)?;
            }
        }
        Value::FloatArray(v) => {
            rmp::encode::write_array_len(buf, v.len() as u32)?;
            for item in v {
                rmp::encode::write_f32(buf, *item)?;
            }
        }
        Value::StringArray(v) => {
            rmp::encode::write_array_len(buf, v.len() as u32)?;
            for item in v {
                rmp::encode::write_str(buf, item)?;
            }
        }
    }
    Ok(())
}

/// Decode every frame in a binary transport message.
///
/// An unrecognized type tag or truncated payload fails the whole message
/// as a `ProtocolError`; the connection drops it and stays up.
pub fn decode_values(buf: &[u8]) -> Result<Vec<ValueFrame>> {
    let mut rd = Cursor::new(buf);
    let mut frames = Vec::new();
    while (rd.position() as usize) < buf.len() {
        frames.push(decode_one(&mut rd)?);
    }
    Ok(frames)
}

fn decode_one(rd: &mut Cursor<&[u8]>) -> Result<ValueFrame> {
    let len = rmp::decode::read_array_len(rd)?;
    if len != 4 {
        return Err(ClientError::Protocol(format!(
            "value frame has {} elements, expected 4",
            len
        )));
    }

    let id: i64 = rmp::decode::read_int(rd)?;
    let timestamp: i64 = rmp::decode::read_int(rd)?;
    let tag: u8 = rmp::decode::read_int(rd)?;

    let data_type = DataType::from_tag(tag)
        .ok_or_else(|| ClientError::Protocol(format!("unknown value type tag {}", tag)))?;
    let value = read_payload(rd, &data_type)?;

    Ok(ValueFrame {
        id: TopicId(id),
        timestamp: Timestamp(timestamp),
        value,
    })
}

fn read_payload(rd: &mut Cursor<&[u8]>, data_type: &DataType) -> Result<Value> {
    let value = match data_type {
        DataType::Boolean => Value::Boolean(rmp::decode::read_bool(rd)?),
        DataType::Double => Value::Double(rmp::decode::read_f64(rd)?),
        DataType::Int => Value::Int(rmp::decode::read_int(rd)?),
        DataType::Float => Value::Float(rmp::decode::read_f32(rd)?),
        DataType::String | DataType::Json => Value::Str(read_str(rd)?),
        DataType::Raw | DataType::Structured(_) => {
            let len = rmp::decode::read_bin_len(rd)? as usize;
            Value::Raw(read_exact(rd, len)?)
        }
        DataType::BooleanArray => {
            let len = rmp::decode::read_array_len(rd)? as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(rmp::decode::read_bool(rd)?);
            }
            Value::BooleanArray(items)
        }
        DataType::DoubleArray => {
            let len = rmp::decode::read_array_len(rd)? as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(rmp::decode::read_f64(rd)?);
            }
            Value::DoubleArray(items)
        }
        DataType::IntArray => {
            let len = rmp::decode::read_array_len(rd)? as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(rmp::decode::read_int(rd)?);
            }
            Value::IntArray(items)
        }
        DataType::FloatArray => {
            let len = rmp::decode::read_array_len(rd)? as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(rmp::decode::read_f32(rd)?);
            }
            Value::FloatArray(items)
        }
        DataType::StringArray => {
            let len = rmp::decode::read_array_len(rd)? as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(read_str(rd)?);
            }
            Value::StringArray(items)
        }
    };
    Ok(value)
}

fn read_str(rd: &mut Cursor<&[u8]>) -> Result<String> {
    let len = rmp::decode::read_str_len(rd)? as usize;
    let bytes = read_exact(rd, len)?;
    String::from_utf8(bytes).map_err(|e| ClientError::Protocol(e.to_string()))
}

fn read_exact(rd: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    // Sanity bound: a single payload never legitimately exceeds the frame.
    let remaining = rd.get_ref().len().saturating_sub(rd.position() as usize);
    if len > remaining {
        return Err(ClientError::Protocol(format!(
            "payload length {} exceeds remaining frame bytes {}",
            len, remaining
        )));
    }
    let mut bytes = vec![0u8; len];
    rd.read_exact(&mut bytes)?;
    Ok(bytes)
}
