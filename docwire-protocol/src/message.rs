//! Whole wire messages: header plus an opcode-specific body.

use crate::error::ProtocolError;
use crate::frame::{check_length, BodyReader, MsgHeader, OpCode, HEADER_SIZE};
use crate::legacy::{OpQuery, OpReply};
use crate::op_msg::{OpMsg, Section};
use crate::MAX_MESSAGE_SIZE;
use bytes::BytesMut;
use docwire_bson::Document;

/// Opcode-specific message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Msg(OpMsg),
    Query(OpQuery),
    Reply(OpReply),
}

impl Op {
    pub fn op_code(&self) -> OpCode {
        match self {
            Op::Msg(_) => OpCode::Msg,
            Op::Query(_) => OpCode::Query,
            Op::Reply(_) => OpCode::Reply,
        }
    }

    fn encoded_len(&self) -> Result<usize, ProtocolError> {
        match self {
            Op::Msg(msg) => msg.encoded_len(),
            Op::Query(query) => query.encoded_len(),
            Op::Reply(reply) => reply.encoded_len(),
        }
    }

    fn put(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        match self {
            Op::Msg(msg) => msg.put(buf),
            Op::Query(query) => query.put(buf),
            Op::Reply(reply) => reply.put(buf),
        }
    }
}

/// A complete wire message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub request_id: i32,
    pub response_to: i32,
    pub op: Op,
}

impl Message {
    pub fn new(request_id: i32, response_to: i32, op: Op) -> Self {
        Self {
            request_id,
            response_to,
            op,
        }
    }

    pub fn op_code(&self) -> OpCode {
        self.op.op_code()
    }

    /// Returns every document the message carries, in wire order.
    pub fn documents(&self) -> Vec<&Document> {
        match &self.op {
            Op::Msg(msg) => msg
                .sections
                .iter()
                .flat_map(|section| match section {
                    Section::Body(doc) => std::slice::from_ref(doc).iter(),
                    Section::Sequence { documents, .. } => documents.iter(),
                })
                .collect(),
            Op::Query(query) => std::iter::once(&query.query)
                .chain(query.return_fields_selector.as_ref())
                .collect(),
            Op::Reply(reply) => reply.documents.iter().collect(),
        }
    }

    /// Consumes the message and returns its documents in wire order.
    pub fn into_documents(self) -> Vec<Document> {
        match self.op {
            Op::Msg(msg) => msg
                .sections
                .into_iter()
                .flat_map(|section| match section {
                    Section::Body(doc) => vec![doc],
                    Section::Sequence { documents, .. } => documents,
                })
                .collect(),
            Op::Query(query) => std::iter::once(query.query)
                .chain(query.return_fields_selector)
                .collect(),
            Op::Reply(reply) => reply.documents,
        }
    }

    /// Decodes the next message from `buf` under the default size limit.
    ///
    /// Returns `Ok(Some(message))` if a complete message was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors. A
    /// message whose declared length is in bounds but whose contents fail to
    /// parse is still removed from `buf`. A length outside the bounds leaves
    /// `buf` untouched: the message boundary is unknown, every later call
    /// fails the same way, and the caller must drop the connection.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        Self::decode_with_limit(buf, MAX_MESSAGE_SIZE)
    }

    pub fn decode_with_limit(
        buf: &mut BytesMut,
        max_size: usize,
    ) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < 4 {
            return Ok(None);
        }

        // Peek at the length without consuming
        let declared = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let length = check_length(declared, max_size)?;
        if buf.len() < length {
            buf.reserve(length - buf.len());
            return Ok(None);
        }

        let frame = buf.split_to(length);
        Self::parse_with_limit(&frame, max_size).map(Some)
    }

    /// Parses a buffer holding exactly one message.
    pub fn parse(frame: &[u8]) -> Result<Self, ProtocolError> {
        Self::parse_with_limit(frame, MAX_MESSAGE_SIZE)
    }

    pub fn parse_with_limit(frame: &[u8], max_size: usize) -> Result<Self, ProtocolError> {
        let header = MsgHeader::parse(frame)?;
        let length = check_length(header.message_length, max_size)?;
        if length != frame.len() {
            return Err(ProtocolError::mismatch(
                0,
                format!(
                    "header declares {} bytes, frame holds {}",
                    length,
                    frame.len()
                ),
            ));
        }

        let body = BodyReader::new(&frame[HEADER_SIZE..], HEADER_SIZE);
        let op = match OpCode::from_i32(header.op_code) {
            Some(OpCode::Msg) => Op::Msg(OpMsg::parse(frame)?),
            Some(OpCode::Query) => Op::Query(OpQuery::parse(body)?),
            Some(OpCode::Reply) => Op::Reply(OpReply::parse(body)?),
            _ => return Err(ProtocolError::UnsupportedOpCode(header.op_code)),
        };

        Ok(Self {
            request_id: header.request_id,
            response_to: header.response_to,
            op,
        })
    }

    /// Encodes the message. Lengths are computed before anything is
    /// written.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let size = HEADER_SIZE + self.op.encoded_len()?;
        if size > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size,
                max: MAX_MESSAGE_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(size);
        MsgHeader {
            message_length: size as i32,
            request_id: self.request_id,
            response_to: self.response_to,
            op_code: self.op_code().as_i32(),
        }
        .put(&mut buf);
        self.op.put(&mut buf)?;
        debug_assert_eq!(buf.len(), size);
        Ok(buf)
    }
}
