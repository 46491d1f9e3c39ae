//! Buffering decoder, reply encoder and the flat document-list contract
//! used by the command layer.

use crate::error::ProtocolError;
use crate::frame::{MsgHeader, OpCode};
use crate::legacy::OpReply;
use crate::message::{Message, Op};
use crate::op_msg::{OpMsg, Section};
use crate::MAX_MESSAGE_SIZE;
use bytes::{Bytes, BytesMut};
use docwire_bson::Document;
use std::sync::atomic::{AtomicI32, Ordering};

/// Identifier of the kind 1 section that carries every document after the
/// first in [`encode_message`].
const DOCUMENTS_SEQUENCE: &str = "documents";

/// Decodes one complete message into its header and documents in wire order.
///
/// `frame` must hold exactly one message. To pull messages off a byte stream
/// use [`read_message`](crate::read_message) for async readers or
/// [`Decoder`] for buffered bytes.
pub fn decode_message(frame: &[u8]) -> Result<(MsgHeader, Vec<Document>), ProtocolError> {
    let header = MsgHeader::parse(frame)?;
    let message = Message::parse(frame)?;
    Ok((header, message.into_documents()))
}

/// Encodes documents as a message of the given opcode.
///
/// For OP_MSG the first document becomes the body section and any others
/// travel in a `documents` sequence. OP_REPLY carries them all in order.
pub fn encode_message(
    request_id: i32,
    response_to: i32,
    op_code: OpCode,
    documents: Vec<Document>,
) -> Result<BytesMut, ProtocolError> {
    let op = match op_code {
        OpCode::Msg => {
            let mut documents = documents.into_iter();
            let body = documents.next().ok_or(ProtocolError::MissingBodySection)?;
            let rest: Vec<Document> = documents.collect();
            let mut msg = OpMsg::new(body);
            if !rest.is_empty() {
                msg.sections.push(Section::Sequence {
                    identifier: DOCUMENTS_SEQUENCE.to_string(),
                    documents: rest,
                });
            }
            Op::Msg(msg)
        }
        OpCode::Reply => Op::Reply(OpReply::new(documents)),
        OpCode::Query | OpCode::Compressed => {
            return Err(ProtocolError::UnsupportedOpCode(op_code.as_i32()))
        }
    };
    Message::new(request_id, response_to, op).encode()
}

/// Builds replies and hands out request ids.
pub struct Encoder {
    next_request_id: AtomicI32,
    checksum: bool,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            next_request_id: AtomicI32::new(1),
            checksum: false,
        }
    }

    /// Appends a CRC32C checksum to every OP_MSG reply.
    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    /// Returns the next request id, wrapping past `i32::MAX`.
    pub fn next_request_id(&self) -> i32 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Wraps `body` in a reply matching the request's format.
    ///
    /// An OP_QUERY is answered with OP_REPLY; everything else with OP_MSG,
    /// checksummed when configured or when the request carried one.
    pub fn reply(&self, request: &Message, body: Document) -> Message {
        let op = match &request.op {
            Op::Query(_) => Op::Reply(OpReply::new(vec![body])),
            Op::Msg(msg) => {
                let reply = OpMsg::new(body);
                if self.checksum || msg.flags.checksum_present() {
                    Op::Msg(reply.with_checksum())
                } else {
                    Op::Msg(reply)
                }
            }
            Op::Reply(_) => {
                let reply = OpMsg::new(body);
                Op::Msg(if self.checksum {
                    reply.with_checksum()
                } else {
                    reply
                })
            }
        };
        Message::new(self.next_request_id(), request.request_id, op)
    }

    /// Encodes the reply to `request` in one step.
    pub fn encode_reply(
        &self,
        request: &Message,
        body: Document,
    ) -> Result<BytesMut, ProtocolError> {
        self.reply(request, body).encode()
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates bytes from a stream and yields complete messages.
pub struct Decoder {
    buffer: BytesMut,
    max_message_size: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Lowers the accepted message size. Values above the protocol maximum
    /// are clamped.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max.min(MAX_MESSAGE_SIZE);
        self
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Appends bytes to the internal buffer.
    pub fn extend_bytes(&mut self, data: Bytes) {
        self.buffer.extend_from_slice(&data);
    }

    /// Attempts to decode the next message from the buffer.
    ///
    /// After a length-bound error the buffer is left as it was and the
    /// stream cannot be resynchronized; see [`Message::decode`].
    pub fn decode(&mut self) -> Result<Option<Message>, ProtocolError> {
        Message::decode_with_limit(&mut self.buffer, self.max_message_size)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
