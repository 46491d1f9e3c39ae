//! Codec error types.

use crate::value::ElementType;
use thiserror::Error;

/// Errors produced while building, encoding or decoding BSON documents.
///
/// Every decode error is terminal for the call that produced it; partially
/// decoded documents are never returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BsonError {
    #[error("truncated input at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedInput {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("length mismatch at offset {offset}: {reason}")]
    LengthMismatch { offset: usize, reason: String },

    #[error("unknown element type {tag:#04x} for key {key:?} at offset {offset}")]
    UnknownTypeTag {
        tag: u8,
        key: String,
        offset: usize,
    },

    #[error("invalid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("duplicate key {key:?}")]
    DuplicateKey { key: String },

    #[error("non-contiguous array index: expected {expected:?}, found {found:?}")]
    NonContiguousArrayIndex { expected: String, found: String },

    #[error("invalid boolean byte {value:#04x} at offset {offset}")]
    InvalidBool { value: u8, offset: usize },

    #[error("documents nested deeper than {max} levels")]
    NestingTooDeep { max: usize },

    #[error("key contains NUL byte: {0:?}")]
    KeyContainsNul(String),

    #[error("regular expression {0} contains NUL byte")]
    RegexContainsNul(&'static str),

    #[error("document too large: {size} bytes (max {max})")]
    DocumentTooLarge { size: usize, max: usize },

    #[error("invalid ObjectId: {0}")]
    InvalidObjectId(String),

    #[error("invalid Decimal128: {0}")]
    InvalidDecimal128(String),
}

impl BsonError {
    /// Returns whether the error came from malformed input bytes rather than
    /// from an unencodable value.
    pub fn is_decode_error(&self) -> bool {
        !matches!(
            self,
            BsonError::KeyContainsNul(_)
                | BsonError::RegexContainsNul(_)
                | BsonError::DocumentTooLarge { .. }
        )
    }
}

/// Errors produced by the extended JSON codec.
#[derive(Debug, Error)]
pub enum ExtJsonError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bare null literal is not a valid {0} value")]
    NullInput(ElementType),

    #[error("unknown extended JSON wrapper {0:?}")]
    UnknownWrapper(String),

    #[error("malformed {wrapper} wrapper: {reason}")]
    MalformedWrapper {
        wrapper: &'static str,
        reason: String,
    },

    #[error("duplicate key {0:?}")]
    DuplicateKey(String),

    #[error("values nested deeper than {max} levels")]
    NestingTooDeep { max: usize },

    #[error("document with the single key {0:?} would read back as a type wrapper")]
    ReservedKey(String),

    #[error("expected {expected} value, found {found}")]
    TypeMismatch {
        expected: ElementType,
        found: ElementType,
    },
}

impl ExtJsonError {
    pub(crate) fn malformed(wrapper: &'static str, reason: impl Into<String>) -> Self {
        ExtJsonError::MalformedWrapper {
            wrapper,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bson_error_display() {
        let err = BsonError::TruncatedInput {
            offset: 4,
            needed: 10,
            available: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("offset 4"));
        assert!(msg.contains("10"));

        let err = BsonError::UnknownTypeTag {
            tag: 0x7f,
            key: "x".to_string(),
            offset: 9,
        };
        assert!(err.to_string().contains("0x7f"));

        let err = BsonError::DuplicateKey {
            key: "x".to_string(),
        };
        assert!(err.to_string().contains("\"x\""));
    }

    #[test]
    fn test_decode_error_classification() {
        assert!(BsonError::InvalidUtf8 { offset: 0 }.is_decode_error());
        assert!(!BsonError::KeyContainsNul("a\0b".to_string()).is_decode_error());
        assert!(!BsonError::DocumentTooLarge { size: 1, max: 0 }.is_decode_error());
    }

    #[test]
    fn test_extjson_error_display() {
        let err = ExtJsonError::NullInput(ElementType::Boolean);
        assert!(err.to_string().contains("bool"));

        let err = ExtJsonError::UnknownWrapper("$foo".to_string());
        assert!(err.to_string().contains("$foo"));

        let err = ExtJsonError::malformed("$oid", "bad hex");
        assert!(err.to_string().contains("$oid"));
        assert!(err.to_string().contains("bad hex"));
    }
}
