//! Protobuf-compatible record encoding.
//!
//! ```text
//! tag      varint  (field_id << 3) | wire_type
//! bool     varint
//! int32    varint  (negative values sign-extended to 64 bits)
//! float    fixed32 little-endian
//! string   len-delimited
//! repeated bool/int32/float   packed, one len-delimited run
//! repeated string             one tag per element
//! ```
//!
//! Fields are written in ascending field-id order so equal records always
//! encode to equal bytes.

use crate::{Record, Value};
use byteorder::{ByteOrder, LittleEndian};
use schema::{ColumnSpec, ScalarType, SheetSchema};
use std::collections::HashMap;
use thiserror::Error;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record truncated at byte {0}")]
    Truncated(usize),

    #[error("varint longer than 10 bytes at byte {0}")]
    VarintOverflow(usize),

    #[error("field {field} has wire type {wire_type}, which does not match its column type")]
    WireType { field: u32, wire_type: u8 },

    #[error("unsupported wire type {0}")]
    UnknownWireType(u8),

    #[error("field {0} is not valid UTF-8")]
    Utf8(u32),
}

/// Encodes the fields of `record` that `schema` declares.
pub fn encode(schema: &SheetSchema, record: &Record) -> Vec<u8> {
    let mut out = Vec::new();
    for col in schema.columns_by_id() {
        if let Some(value) = record.get(&col.name) {
            encode_field(&mut out, col.field_id, value);
        }
    }
    out
}

fn encode_field(out: &mut Vec<u8>, id: u32, value: &Value) {
    match value {
        Value::Bool(v) => {
            put_tag(out, id, WIRE_VARINT);
            put_varint(out, *v as u64);
        }
        Value::Int32(v) => {
            put_tag(out, id, WIRE_VARINT);
            put_varint(out, *v as i64 as u64);
        }
        Value::Float32(v) => {
            put_tag(out, id, WIRE_FIXED32);
            put_f32(out, *v);
        }
        Value::Str(v) => put_bytes(out, id, v.as_bytes()),
        Value::BoolList(vs) => {
            let mut packed = Vec::with_capacity(vs.len());
            for v in vs {
                put_varint(&mut packed, *v as u64);
            }
            put_bytes(out, id, &packed);
        }
        Value::Int32List(vs) => {
            let mut packed = Vec::with_capacity(vs.len() * 2);
            for v in vs {
                put_varint(&mut packed, *v as i64 as u64);
            }
            put_bytes(out, id, &packed);
        }
        Value::Float32List(vs) => {
            let mut packed = Vec::with_capacity(vs.len() * 4);
            for v in vs {
                put_f32(&mut packed, *v);
            }
            put_bytes(out, id, &packed);
        }
        Value::StrList(vs) => {
            for v in vs {
                put_bytes(out, id, v.as_bytes());
            }
        }
    }
}

fn put_tag(out: &mut Vec<u8>, id: u32, wire_type: u8) {
    put_varint(out, (u64::from(id) << 3) | u64::from(wire_type));
}

fn put_varint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

fn put_f32(out: &mut Vec<u8>, v: f32) {
    let mut buf = [0u8; 4];
    LittleEndian::write_f32(&mut buf, v);
    out.extend_from_slice(&buf);
}

fn put_bytes(out: &mut Vec<u8>, id: u32, bytes: &[u8]) {
    put_tag(out, id, WIRE_LEN);
    put_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Byte cursor over an encoded record.
struct Input<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Input<'a> {
    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        let mut v = 0u64;
        for shift in (0..70).step_by(7) {
            let b = *self.buf.get(self.pos).ok_or(DecodeError::Truncated(self.pos))?;
            self.pos += 1;
            v |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(v);
            }
        }
        Err(DecodeError::VarintOverflow(start))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Truncated(self.pos))?;
        let bytes = self.buf.get(self.pos..end).ok_or(DecodeError::Truncated(self.pos))?;
        self.pos = end;
        Ok(bytes)
    }

    fn len_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.varint()?;
        let len = usize::try_from(len).map_err(|_| DecodeError::Truncated(self.pos))?;
        self.take(len)
    }

    fn skip(&mut self, wire_type: u8) -> Result<(), DecodeError> {
        match wire_type {
            WIRE_VARINT => self.varint().map(|_| ()),
            WIRE_FIXED64 => self.take(8).map(|_| ()),
            WIRE_LEN => self.len_delimited().map(|_| ()),
            WIRE_FIXED32 => self.take(4).map(|_| ()),
            other => Err(DecodeError::UnknownWireType(other)),
        }
    }
}

/// Decodes bytes produced by [`encode`] (or any protobuf encoder) using
/// `schema`. Fields the schema does not know are skipped.
pub fn decode(schema: &SheetSchema, key: &str, bytes: &[u8]) -> Result<Record, DecodeError> {
    let by_id: HashMap<u32, &ColumnSpec> = schema.columns.iter().map(|c| (c.field_id, c)).collect();
    let mut input = Input { buf: bytes, pos: 0 };
    let mut record = Record::new(key);

    while !input.is_empty() {
        let tag = input.varint()?;
        let wire_type = (tag & 0x7) as u8;
        let field = (tag >> 3) as u32;
        let Some(col) = by_id.get(&field) else {
            input.skip(wire_type)?;
            continue;
        };
        if col.repeated {
            decode_repeated(&mut input, &mut record, col, wire_type, field)?;
            continue;
        }

        let value = match (col.scalar, wire_type) {
            (ScalarType::Bool, WIRE_VARINT) => Value::Bool(input.varint()? != 0),
            (ScalarType::Int32, WIRE_VARINT) => Value::Int32(input.varint()? as i32),
            (ScalarType::Float32, WIRE_FIXED32) => Value::Float32(LittleEndian::read_f32(input.take(4)?)),
            (ScalarType::String, WIRE_LEN) => Value::Str(utf8(input.len_delimited()?, field)?),
            _ => return Err(DecodeError::WireType { field, wire_type }),
        };
        record.set(col.name.clone(), value);
    }

    Ok(record)
}

fn decode_repeated(
    input: &mut Input<'_>,
    record: &mut Record,
    col: &ColumnSpec,
    wire_type: u8,
    field: u32,
) -> Result<(), DecodeError> {
    let mismatch = DecodeError::WireType { field, wire_type };
    let slot = record.fields.entry(col.name.clone()).or_insert_with(|| match col.scalar {
        ScalarType::Bool => Value::BoolList(Vec::new()),
        ScalarType::Int32 => Value::Int32List(Vec::new()),
        ScalarType::Float32 => Value::Float32List(Vec::new()),
        ScalarType::String => Value::StrList(Vec::new()),
    });

    match (slot, wire_type) {
        (Value::StrList(list), WIRE_LEN) => list.push(utf8(input.len_delimited()?, field)?),
        (Value::BoolList(list), WIRE_VARINT) => list.push(input.varint()? != 0),
        (Value::Int32List(list), WIRE_VARINT) => list.push(input.varint()? as i32),
        (Value::Float32List(list), WIRE_FIXED32) => list.push(LittleEndian::read_f32(input.take(4)?)),
        (Value::BoolList(list), WIRE_LEN) => {
            let mut packed = Input { buf: input.len_delimited()?, pos: 0 };
            while !packed.is_empty() {
                list.push(packed.varint()? != 0);
            }
        }
        (Value::Int32List(list), WIRE_LEN) => {
            let mut packed = Input { buf: input.len_delimited()?, pos: 0 };
            while !packed.is_empty() {
                list.push(packed.varint()? as i32);
            }
        }
        (Value::Float32List(list), WIRE_LEN) => {
            let run = input.len_delimited()?;
            if run.len() % 4 != 0 {
                return Err(mismatch);
            }
            list.extend(run.chunks_exact(4).map(LittleEndian::read_f32));
        }
        _ => return Err(mismatch),
    }
    Ok(())
}

fn utf8(bytes: &[u8], field: u32) -> Result<String, DecodeError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::Utf8(field))
}
