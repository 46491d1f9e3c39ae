//! BSON binary encoder.
//!
//! Document layout:
//!
//! ```text
//! +-----------+-----------------------------------+------+
//! | total_len | element*                          | 0x00 |
//! | i32 LE    | tag (1) | cstring key | payload   |      |
//! +-----------+-----------------------------------+------+
//! ```
//!
//! Lengths are computed bottom-up before anything is written, so a document
//! that fails validation leaves the output buffer untouched.

use crate::array::Array;
use crate::document::Document;
use crate::error::BsonError;
use crate::value::Value;
use crate::MAX_NESTING_DEPTH;
use bytes::BufMut;

/// Largest length a BSON length prefix can express.
const MAX_ENCODED_LEN: usize = i32::MAX as usize;

/// Encodes a document into a new buffer.
pub fn to_vec(doc: &Document) -> Result<Vec<u8>, BsonError> {
    let len = document_len(doc)?;
    let mut buf = Vec::with_capacity(len);
    put_document(&mut buf, doc);
    Ok(buf)
}

/// Appends the encoding of `doc` to `buf` and returns the number of bytes
/// written.
pub fn write_document<B: BufMut>(buf: &mut B, doc: &Document) -> Result<usize, BsonError> {
    let len = document_len(doc)?;
    put_document(buf, doc);
    Ok(len)
}

/// Validates a document for encoding and returns its exact encoded size.
pub(crate) fn document_len(doc: &Document) -> Result<usize, BsonError> {
    validate_document(doc, 0)?;
    let len = raw_document_len(doc);
    if len > MAX_ENCODED_LEN {
        return Err(BsonError::DocumentTooLarge {
            size: len,
            max: MAX_ENCODED_LEN,
        });
    }
    Ok(len)
}

fn validate_document(doc: &Document, depth: usize) -> Result<(), BsonError> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(BsonError::NestingTooDeep {
            max: MAX_NESTING_DEPTH,
        });
    }
    for (key, value) in doc.iter() {
        if key.as_bytes().contains(&0) {
            return Err(BsonError::KeyContainsNul(key.to_string()));
        }
        validate_value(value, depth)?;
    }
    Ok(())
}

fn validate_value(value: &Value, depth: usize) -> Result<(), BsonError> {
    match value {
        Value::Document(doc) => validate_document(doc, depth + 1),
        Value::Array(array) => {
            if depth + 1 >= MAX_NESTING_DEPTH {
                return Err(BsonError::NestingTooDeep {
                    max: MAX_NESTING_DEPTH,
                });
            }
            array.iter().try_for_each(|v| validate_value(v, depth + 1))
        }
        Value::RegularExpression(re) => {
            if re.pattern.as_bytes().contains(&0) {
                return Err(BsonError::RegexContainsNul("pattern"));
            }
            if re.options.as_bytes().contains(&0) {
                return Err(BsonError::RegexContainsNul("options"));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn index_key_len(mut index: usize) -> usize {
    let mut digits = 1;
    while index >= 10 {
        index /= 10;
        digits += 1;
    }
    digits
}

fn raw_document_len(doc: &Document) -> usize {
    // length prefix + terminator
    let elements: usize = doc
        .iter()
        .map(|(key, value)| 1 + key.len() + 1 + raw_value_len(value))
        .sum();
    4 + elements + 1
}

fn raw_array_len(array: &Array) -> usize {
    let elements: usize = array
        .iter()
        .enumerate()
        .map(|(i, value)| 1 + index_key_len(i) + 1 + raw_value_len(value))
        .sum();
    4 + elements + 1
}

fn raw_value_len(value: &Value) -> usize {
    match value {
        Value::Double(_) => 8,
        Value::String(s) => 4 + s.len() + 1,
        Value::Document(doc) => raw_document_len(doc),
        Value::Array(array) => raw_array_len(array),
        Value::Binary(bin) => 4 + 1 + bin.bytes.len(),
        Value::ObjectId(_) => 12,
        Value::Boolean(_) => 1,
        Value::DateTime(_) => 8,
        Value::Null => 0,
        Value::RegularExpression(re) => re.pattern.len() + 1 + re.options.len() + 1,
        Value::Int32(_) => 4,
        Value::Timestamp(_) => 8,
        Value::Int64(_) => 8,
        Value::Decimal128(_) => 16,
    }
}

fn put_cstring<B: BufMut>(buf: &mut B, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

fn put_document<B: BufMut>(buf: &mut B, doc: &Document) {
    buf.put_i32_le(raw_document_len(doc) as i32);
    for (key, value) in doc.iter() {
        put_element(buf, key, value);
    }
    buf.put_u8(0);
}

fn put_array<B: BufMut>(buf: &mut B, array: &Array) {
    buf.put_i32_le(raw_array_len(array) as i32);
    for (i, value) in array.iter().enumerate() {
        put_element(buf, &i.to_string(), value);
    }
    buf.put_u8(0);
}

fn put_element<B: BufMut>(buf: &mut B, key: &str, value: &Value) {
    buf.put_u8(value.element_type() as u8);
    put_cstring(buf, key);

    match value {
        Value::Double(f) => buf.put_f64_le(*f),
        Value::String(s) => {
            buf.put_i32_le((s.len() + 1) as i32);
            put_cstring(buf, s);
        }
        Value::Document(doc) => put_document(buf, doc),
        Value::Array(array) => put_array(buf, array),
        Value::Binary(bin) => {
            buf.put_i32_le(bin.bytes.len() as i32);
            buf.put_u8(bin.subtype);
            buf.put_slice(&bin.bytes);
        }
        Value::ObjectId(oid) => buf.put_slice(&oid.bytes()),
        Value::Boolean(b) => buf.put_u8(u8::from(*b)),
        Value::DateTime(dt) => buf.put_i64_le(dt.timestamp_millis()),
        Value::Null => {}
        Value::RegularExpression(re) => {
            put_cstring(buf, &re.pattern);
            put_cstring(buf, &re.options);
        }
        Value::Int32(i) => buf.put_i32_le(*i),
        // increment first, then seconds
        Value::Timestamp(ts) => {
            buf.put_u32_le(ts.increment);
            buf.put_u32_le(ts.time);
        }
        Value::Int64(i) => buf.put_i64_le(*i),
        Value::Decimal128(d) => buf.put_slice(&d.bytes()),
    }
}
