//! Message header and low-level body parsing.
//!
//! Header layout (16 bytes, all fields little-endian):
//!
//! ```text
//! +---------------+------------+-------------+---------+
//! | messageLength | requestID  | responseTo  | opCode  |
//! | i32           | i32        | i32         | i32     |
//! +---------------+------------+-------------+---------+
//! ```
//!
//! `messageLength` counts the header itself.

use crate::error::ProtocolError;
use crate::MIN_MESSAGE_SIZE;
use bytes::BufMut;
use docwire_bson::{de::peek_document_len, Document};
use std::fmt;

/// Size of the fixed message header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Wire opcodes docwire knows by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OpCode {
    /// Legacy reply to OP_QUERY.
    Reply = 1,
    /// Legacy query, still used for the initial handshake by old drivers.
    Query = 2004,
    /// Compressed wrapper around another opcode. Not supported.
    Compressed = 2012,
    /// Extensible message format.
    Msg = 2013,
}

impl OpCode {
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            1 => Some(OpCode::Reply),
            2004 => Some(OpCode::Query),
            2012 => Some(OpCode::Compressed),
            2013 => Some(OpCode::Msg),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpCode::Reply => "OP_REPLY",
            OpCode::Query => "OP_QUERY",
            OpCode::Compressed => "OP_COMPRESSED",
            OpCode::Msg => "OP_MSG",
        };
        f.write_str(name)
    }
}

/// A parsed message header. The opcode is kept raw so unknown values can
/// be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: i32,
}

impl MsgHeader {
    /// Parses the header at the front of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::HeaderTooShort {
                received: bytes.len(),
            });
        }
        let field = |at: usize| {
            i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        Ok(Self {
            message_length: field(0),
            request_id: field(4),
            response_to: field(8),
            op_code: field(12),
        })
    }

    pub fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32_le(self.message_length);
        buf.put_i32_le(self.request_id);
        buf.put_i32_le(self.response_to);
        buf.put_i32_le(self.op_code);
    }
}

/// Validates a declared message length against the accepted bounds and
/// returns it as a size.
pub fn check_length(length: i32, max: usize) -> Result<usize, ProtocolError> {
    match usize::try_from(length) {
        Ok(len) if (MIN_MESSAGE_SIZE..=max).contains(&len) => Ok(len),
        _ => Err(ProtocolError::DeclaredLengthOutOfBounds {
            length,
            min: MIN_MESSAGE_SIZE,
            max,
        }),
    }
}

/// Cursor over a message body. Offsets in errors are relative to the start
/// of the whole message.
pub(crate) struct BodyReader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> BodyReader<'a> {
    pub(crate) fn new(buf: &'a [u8], base: usize) -> Self {
        Self { buf, pos: 0, base }
    }

    pub(crate) fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if n > self.remaining() {
            return Err(ProtocolError::mismatch(
                self.offset(),
                format!("need {} bytes, {} remain", n, self.remaining()),
            ));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Splits off the next `n` bytes as their own reader.
    pub(crate) fn sub_reader(&mut self, n: usize) -> Result<BodyReader<'a>, ProtocolError> {
        let base = self.offset();
        Ok(BodyReader::new(self.take(n)?, base))
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub(crate) fn read_cstring(&mut self, section: usize) -> Result<String, ProtocolError> {
        let start = self.offset();
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ProtocolError::mismatch(start, "unterminated string"))?;
        let text = std::str::from_utf8(&rest[..nul]).map_err(|_| ProtocolError::Bson {
            section,
            source: docwire_bson::BsonError::InvalidUtf8 { offset: start },
        })?;
        self.pos += nul + 1;
        Ok(text.to_string())
    }

    /// Reads one BSON document, which must fit in the remaining bytes.
    pub(crate) fn read_document(&mut self, section: usize) -> Result<Document, ProtocolError> {
        let start = self.offset();
        let rest = &self.buf[self.pos..];
        let declared = peek_document_len(rest).ok_or_else(|| {
            ProtocolError::mismatch(start, "section ends inside a document length")
        })?;
        let len = usize::try_from(declared)
            .ok()
            .filter(|len| (docwire_bson::MIN_DOCUMENT_SIZE..=rest.len()).contains(len))
            .ok_or_else(|| {
                ProtocolError::mismatch(
                    start,
                    format!(
                        "document declares {} bytes, section has {}",
                        declared,
                        rest.len()
                    ),
                )
            })?;
        let bytes = self.take(len)?;
        docwire_bson::from_slice(bytes).map_err(|source| ProtocolError::Bson { section, source })
    }
}
