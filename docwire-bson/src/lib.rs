//! # docwire-bson
//!
//! Document model and codecs for docwire.
//!
//! This crate provides:
//! - An ordered [`Document`] / [`Array`] model over the closed [`Value`] type set
//! - A bit-exact BSON binary encoder and a validating decoder
//! - A canonical, lossless extended JSON encoder and decoder
//!
//! All codecs are pure functions over their input buffers and hold no shared
//! mutable state, so they can be called concurrently from any number of
//! connections.

pub mod array;
pub mod de;
pub mod decimal128;
pub mod document;
pub mod error;
pub mod extjson;
pub mod oid;
pub mod ser;
pub mod types;
pub mod value;

pub use array::Array;
pub use de::{from_slice, read_document};
pub use decimal128::Decimal128;
pub use document::Document;
pub use error::{BsonError, ExtJsonError};
pub use oid::ObjectId;
pub use ser::{to_vec, write_document};
pub use types::{Binary, DateTime, Regex, Timestamp};
pub use value::{ElementType, Value};

/// Smallest possible encoded document: length prefix plus terminator.
pub const MIN_DOCUMENT_SIZE: usize = 5;

/// Maximum size of a single BSON document (16 MiB), as advertised to drivers.
pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

/// Maximum nesting of documents and arrays accepted by the decoder.
pub const MAX_NESTING_DEPTH: usize = 100;
