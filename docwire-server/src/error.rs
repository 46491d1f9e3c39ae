//! Server error types.

use crate::config::ConfigError;
use docwire_bson::{BsonError, ElementType};
use docwire_protocol::{ErrorCode, ProtocolError};
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("BSON error: {0}")]
    Bson(#[from] BsonError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("no such command: '{0}'")]
    CommandNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("field '{field}' must be of type {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: ElementType,
    },

    #[error("{0}")]
    InvalidOption(String),

    #[error("server shutting down")]
    ShuttingDown,

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),
}

impl ServerError {
    /// Returns the code reported in an error reply.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ServerError::Protocol(e) => e.code(),
            ServerError::Bson(_) => ErrorCode::InvalidBson,
            ServerError::CommandNotFound(_) => ErrorCode::CommandNotFound,
            ServerError::InvalidRequest(_) => ErrorCode::BadValue,
            ServerError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            ServerError::InvalidOption(_) => ErrorCode::InvalidOptions,
            ServerError::Io(_)
            | ServerError::Config(_)
            | ServerError::ShuttingDown
            | ServerError::TlsConfig(_)
            | ServerError::TlsHandshake(_) => ErrorCode::InternalError,
        }
    }

    /// Returns whether the connection should be closed rather than answered.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ServerError::Io(_) | ServerError::Protocol(_) | ServerError::ShuttingDown
        )
    }
}
