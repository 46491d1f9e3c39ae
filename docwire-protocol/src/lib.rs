//! # docwire-protocol
//!
//! MongoDB wire protocol framing for docwire.
//!
//! This crate provides:
//! - The 16-byte message header and length bounds checks
//! - OP_MSG with kind 0 and kind 1 sections and optional CRC32C checksums
//! - Legacy OP_QUERY requests and OP_REPLY responses for old handshakes
//! - A buffering [`Decoder`], a reply [`Encoder`] and async stream helpers
//! - MongoDB error codes for error replies

pub mod codec;
pub mod error;
pub mod frame;
pub mod io;
pub mod legacy;
pub mod message;
pub mod op_msg;

pub use codec::{decode_message, encode_message, Decoder, Encoder};
pub use error::{ErrorCode, ProtocolError};
pub use frame::{MsgHeader, OpCode, HEADER_SIZE};
pub use io::{read_message, write_message};
pub use legacy::{OpQuery, OpReply};
pub use message::{Message, Op};
pub use op_msg::{MsgFlags, OpMsg, Section};

/// Default MongoDB port.
pub const DEFAULT_PORT: u16 = 27017;

/// Smallest accepted message: header, flag bits and one section kind byte.
pub const MIN_MESSAGE_SIZE: usize = HEADER_SIZE + 5;

/// Largest accepted message (`maxMessageSizeBytes`).
pub const MAX_MESSAGE_SIZE: usize = 48_000_000;

/// Largest write batch advertised to drivers (`maxWriteBatchSize`).
pub const MAX_WRITE_BATCH_SIZE: i32 = 100_000;
