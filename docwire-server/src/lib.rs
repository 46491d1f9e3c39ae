//! # docwire-server
//!
//! TCP server for docwire.
//!
//! This crate provides:
//! - TCP connection handling with async I/O and optional TLS
//! - One sequential read/dispatch/reply loop per connection
//! - The [`CommandHandler`] seam and a built-in [`HandshakeHandler`]
//! - Configuration from YAML and `DOCWIRE_*` environment variables

pub mod config;
pub mod error;
pub mod handler;
pub mod server;
pub mod session;
pub mod stream;
pub mod tls;

pub use config::{Config, ConfigError, LimitsConfig, NetworkConfig, TlsConfig};
pub use error::ServerError;
pub use handler::{error_reply, CommandHandler, HandshakeHandler, Request, ServerInfo};
pub use server::{Server, ServerConfig, ServerStats};
pub use session::Session;
