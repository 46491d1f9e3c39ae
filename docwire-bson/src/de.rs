//! BSON binary decoder.
//!
//! The decoder reads the declared length first and never looks past it.
//! Reads that run off the end of the input are [`BsonError::TruncatedInput`];
//! reads that run past an enclosing document's declared length are
//! [`BsonError::LengthMismatch`].

use crate::array::{check_index, Array};
use crate::document::Document;
use crate::error::BsonError;
use crate::oid::ObjectId;
use crate::types::{Binary, DateTime, Regex, Timestamp};
use crate::value::{ElementType, Value};
use crate::decimal128::Decimal128;
use crate::{MAX_NESTING_DEPTH, MIN_DOCUMENT_SIZE};

/// Decodes a buffer holding exactly one document.
pub fn from_slice(bytes: &[u8]) -> Result<Document, BsonError> {
    let mut reader = Reader::new(bytes);
    let doc = read_document_at(&mut reader, 0)?;
    if reader.pos != bytes.len() {
        return Err(BsonError::LengthMismatch {
            offset: reader.pos,
            reason: format!("{} trailing bytes after document", bytes.len() - reader.pos),
        });
    }
    Ok(doc)
}

/// Decodes one document from the front of `buf` and advances `buf` past it.
///
/// On error `buf` is left unchanged.
pub fn read_document(buf: &mut &[u8]) -> Result<Document, BsonError> {
    let input: &[u8] = buf;
    let mut reader = Reader::new(input);
    let doc = read_document_at(&mut reader, 0)?;
    *buf = &input[reader.pos..];
    Ok(doc)
}

/// Returns the declared length of the document at the front of `bytes`, if
/// at least the length prefix is present.
pub fn peek_document_len(bytes: &[u8]) -> Option<i32> {
    let prefix = bytes.get(..4)?;
    Some(i32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]))
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    /// End of the region the current document body may occupy.
    limit: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            limit: buf.len(),
        }
    }

    fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    fn overrun(&self, needed: usize) -> BsonError {
        if self.limit == self.buf.len() {
            BsonError::TruncatedInput {
                offset: self.pos,
                needed,
                available: self.remaining(),
            }
        } else {
            BsonError::LengthMismatch {
                offset: self.pos,
                reason: format!(
                    "element needs {} bytes but only {} remain in the enclosing document",
                    needed,
                    self.remaining()
                ),
            }
        }
    }

    fn ensure(&self, needed: usize) -> Result<(), BsonError> {
        if needed <= self.remaining() {
            Ok(())
        } else {
            Err(self.overrun(needed))
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BsonError> {
        self.ensure(n)?;
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], BsonError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, BsonError> {
        Ok(self.array::<1>()?[0])
    }

    fn read_i32(&mut self) -> Result<i32, BsonError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn read_u32(&mut self) -> Result<u32, BsonError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn read_i64(&mut self) -> Result<i64, BsonError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn read_f64(&mut self) -> Result<f64, BsonError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn read_cstring(&mut self) -> Result<&'a str, BsonError> {
        let start = self.pos;
        let window = &self.buf[self.pos..self.limit];
        let nul = match window.iter().position(|&b| b == 0) {
            Some(nul) => nul,
            None => return Err(self.overrun(window.len() + 1)),
        };
        self.pos += nul + 1;
        std::str::from_utf8(&window[..nul]).map_err(|_| BsonError::InvalidUtf8 { offset: start })
    }

    fn read_string(&mut self) -> Result<String, BsonError> {
        let start = self.pos;
        let len = self.read_i32()?;
        if len < 1 {
            return Err(BsonError::LengthMismatch {
                offset: start,
                reason: format!("string length {} below minimum 1", len),
            });
        }
        let bytes = self.take(len as usize)?;
        let (text, terminator) = bytes.split_at(bytes.len() - 1);
        if terminator[0] != 0 {
            return Err(BsonError::LengthMismatch {
                offset: start,
                reason: "string is not NUL-terminated".to_string(),
            });
        }
        let text =
            std::str::from_utf8(text).map_err(|_| BsonError::InvalidUtf8 { offset: start + 4 })?;
        Ok(text.to_string())
    }
}

/// Reads a length-prefixed body, confining `read_body` to the declared
/// length and checking the terminator.
fn with_body<'a, T>(
    r: &mut Reader<'a>,
    depth: usize,
    read_body: impl FnOnce(&mut Reader<'a>) -> Result<T, BsonError>,
) -> Result<T, BsonError> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(BsonError::NestingTooDeep {
            max: MAX_NESTING_DEPTH,
        });
    }

    let start = r.pos;
    let declared = r.read_i32()?;
    if declared < MIN_DOCUMENT_SIZE as i32 {
        return Err(BsonError::LengthMismatch {
            offset: start,
            reason: format!(
                "declared length {} below minimum {}",
                declared, MIN_DOCUMENT_SIZE
            ),
        });
    }
    let declared = declared as usize;
    // The prefix is already consumed.
    r.ensure(declared - 4)?;

    let end = start + declared;
    let outer_limit = r.limit;
    r.limit = end - 1;
    let body = read_body(r);
    r.limit = outer_limit;
    let body = body?;

    let offset = r.pos;
    if r.read_u8()? != 0 {
        return Err(BsonError::LengthMismatch {
            offset,
            reason: "missing document terminator".to_string(),
        });
    }
    Ok(body)
}

/// Reads the tag and key of the next element. Hitting the terminator early
/// means the declared length is larger than the elements.
fn read_element_header<'a>(r: &mut Reader<'a>) -> Result<(u8, &'a str, usize), BsonError> {
    let offset = r.pos;
    let tag = r.read_u8()?;
    if tag == 0 {
        return Err(BsonError::LengthMismatch {
            offset,
            reason: "terminator found before declared end of document".to_string(),
        });
    }
    let key = r.read_cstring()?;
    Ok((tag, key, offset))
}

fn read_document_at(r: &mut Reader<'_>, depth: usize) -> Result<Document, BsonError> {
    with_body(r, depth, |r| {
        let mut doc = Document::new();
        while r.remaining() > 0 {
            let (tag, key, offset) = read_element_header(r)?;
            let value = read_value(r, tag, key, offset, depth)?;
            doc.insert(key, value)?;
        }
        Ok(doc)
    })
}

fn read_array_at(r: &mut Reader<'_>, depth: usize) -> Result<Array, BsonError> {
    with_body(r, depth, |r| {
        let mut array = Array::new();
        while r.remaining() > 0 {
            let (tag, key, offset) = read_element_header(r)?;
            check_index(array.len(), key)?;
            array.push(read_value(r, tag, key, offset, depth)?);
        }
        Ok(array)
    })
}

fn read_value(
    r: &mut Reader<'_>,
    tag: u8,
    key: &str,
    offset: usize,
    depth: usize,
) -> Result<Value, BsonError> {
    let ty = ElementType::from_u8(tag).ok_or_else(|| BsonError::UnknownTypeTag {
        tag,
        key: key.to_string(),
        offset,
    })?;

    let value = match ty {
        ElementType::Double => Value::Double(r.read_f64()?),
        ElementType::String => Value::String(r.read_string()?),
        ElementType::EmbeddedDocument => Value::Document(read_document_at(r, depth + 1)?),
        ElementType::Array => Value::Array(read_array_at(r, depth + 1)?),
        ElementType::Binary => {
            let start = r.pos;
            let len = r.read_i32()?;
            if len < 0 {
                return Err(BsonError::LengthMismatch {
                    offset: start,
                    reason: format!("negative binary length {}", len),
                });
            }
            let subtype = r.read_u8()?;
            Value::Binary(Binary::new(subtype, r.take(len as usize)?))
        }
        ElementType::ObjectId => Value::ObjectId(ObjectId::from_bytes(r.array()?)),
        ElementType::Boolean => {
            let at = r.pos;
            match r.read_u8()? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                other => {
                    return Err(BsonError::InvalidBool {
                        value: other,
                        offset: at,
                    })
                }
            }
        }
        ElementType::DateTime => Value::DateTime(DateTime::from_millis(r.read_i64()?)),
        ElementType::Null => Value::Null,
        ElementType::RegularExpression => {
            let pattern = r.read_cstring()?;
            let options = r.read_cstring()?;
            Value::RegularExpression(Regex::new(pattern, options))
        }
        ElementType::Int32 => Value::Int32(r.read_i32()?),
        ElementType::Timestamp => {
            let increment = r.read_u32()?;
            let time = r.read_u32()?;
            Value::Timestamp(Timestamp::new(time, increment))
        }
        ElementType::Int64 => Value::Int64(r.read_i64()?),
        ElementType::Decimal128 => Value::Decimal128(Decimal128::from_bytes(r.array()?)),
    };
    Ok(value)
}
