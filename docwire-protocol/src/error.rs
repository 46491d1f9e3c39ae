//! Protocol error types and error codes.

use docwire_bson::BsonError;
use std::fmt;
use thiserror::Error;

/// Errors raised while framing or unframing wire messages.
///
/// Every variant except `Io` leaves the stream aligned on the next message
/// boundary when produced by the buffering decoder, but the peer is
/// misbehaving and callers normally close the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("header too short: received {received} of 16 bytes")]
    HeaderTooShort { received: usize },

    #[error("declared message length {length} outside accepted range {min}..={max}")]
    DeclaredLengthOutOfBounds { length: i32, min: usize, max: usize },

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("section length mismatch at offset {offset}: {reason}")]
    SectionLengthMismatch { offset: usize, reason: String },

    #[error("checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("unknown section kind {0}")]
    UnknownSectionKind(u8),

    #[error("unsupported opcode {0}")]
    UnsupportedOpCode(i32),

    #[error("OP_MSG has no body section")]
    MissingBodySection,

    #[error("OP_MSG has more than one body section")]
    DuplicateBodySection,

    #[error("unknown required flag bits {0:#010x}")]
    UnknownRequiredFlags(u32),

    #[error("BSON error in section {section}: {source}")]
    Bson { section: usize, source: BsonError },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn mismatch(offset: usize, reason: impl Into<String>) -> Self {
        ProtocolError::SectionLengthMismatch {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns the error code to report if the error is answered rather
    /// than ending the connection.
    pub fn code(&self) -> ErrorCode {
        match self {
            ProtocolError::Bson { .. } => ErrorCode::InvalidBson,
            ProtocolError::UnsupportedOpCode(_) => ErrorCode::NotImplemented,
            ProtocolError::UnknownRequiredFlags(_) => ErrorCode::InvalidOptions,
            ProtocolError::Io(_) => ErrorCode::InternalError,
            _ => ErrorCode::FailedToParse,
        }
    }
}

/// MongoDB error codes used in error replies.
///
/// Numbers and names must match the server's so drivers classify errors
/// correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InternalError,
    BadValue,
    FailedToParse,
    TypeMismatch,
    InvalidBson,
    CommandNotFound,
    InvalidOptions,
    NotImplemented,
}

impl ErrorCode {
    /// Numeric `code` field.
    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::InternalError => 1,
            ErrorCode::BadValue => 2,
            ErrorCode::FailedToParse => 9,
            ErrorCode::TypeMismatch => 14,
            ErrorCode::InvalidBson => 22,
            ErrorCode::CommandNotFound => 59,
            ErrorCode::InvalidOptions => 72,
            ErrorCode::NotImplemented => 238,
        }
    }

    /// `codeName` field.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::InternalError => "InternalError",
            ErrorCode::BadValue => "BadValue",
            ErrorCode::FailedToParse => "FailedToParse",
            ErrorCode::TypeMismatch => "TypeMismatch",
            ErrorCode::InvalidBson => "InvalidBSON",
            ErrorCode::CommandNotFound => "CommandNotFound",
            ErrorCode::InvalidOptions => "InvalidOptions",
            ErrorCode::NotImplemented => "NotImplemented",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_numbers() {
        assert_eq!(ErrorCode::CommandNotFound.code(), 59);
        assert_eq!(ErrorCode::CommandNotFound.name(), "CommandNotFound");
        assert_eq!(ErrorCode::InvalidBson.name(), "InvalidBSON");
        assert_eq!(ErrorCode::FailedToParse.to_string(), "FailedToParse(9)");
    }

    #[test]
    fn test_protocol_error_codes() {
        let err = ProtocolError::Bson {
            section: 0,
            source: BsonError::InvalidUtf8 { offset: 3 },
        };
        assert_eq!(err.code(), ErrorCode::InvalidBson);
        assert_eq!(
            ProtocolError::UnsupportedOpCode(2012).code(),
            ErrorCode::NotImplemented
        );
        assert_eq!(
            ProtocolError::MissingBodySection.code(),
            ErrorCode::FailedToParse
        );
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::HeaderTooShort { received: 7 };
        assert!(err.to_string().contains('7'));

        let err = ProtocolError::DeclaredLengthOutOfBounds {
            length: -1,
            min: 21,
            max: 48_000_000,
        };
        assert!(err.to_string().contains("-1"));

        let err = ProtocolError::ChecksumMismatch {
            expected: 0xABC,
            actual: 0xDEF,
        };
        let msg = err.to_string();
        assert!(msg.contains("0x00000abc"));
        assert!(msg.contains("0x00000def"));

        let err = ProtocolError::Bson {
            section: 2,
            source: BsonError::DuplicateKey {
                key: "x".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("section 2"));
        assert!(msg.contains("duplicate key"));

        let err = ProtocolError::UnknownRequiredFlags(0x4);
        assert!(err.to_string().contains("0x00000004"));
    }
}
