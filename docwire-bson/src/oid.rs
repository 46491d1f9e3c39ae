//! 12-byte object identifiers.

use crate::error::BsonError;
use chrono::Utc;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

/// A 12-byte identifier, compared byte-wise.
///
/// Generated ids are laid out as 4 bytes of big-endian seconds, 5 bytes that
/// are random per process, and a 3-byte big-endian counter.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

const COUNTER_MASK: u32 = 0x00FF_FFFF;

fn process_unique() -> &'static [u8; 5] {
    static PROCESS: OnceLock<[u8; 5]> = OnceLock::new();
    PROCESS.get_or_init(|| {
        let random = uuid::Uuid::new_v4();
        let mut out = [0u8; 5];
        out.copy_from_slice(&random.as_bytes()[..5]);
        out
    })
}

fn counter() -> &'static AtomicU32 {
    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
    COUNTER.get_or_init(|| {
        let random = uuid::Uuid::new_v4();
        let b = random.as_bytes();
        AtomicU32::new(u32::from_be_bytes([0, b[5], b[6], b[7]]))
    })
}

impl ObjectId {
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Generates a new identifier.
    pub fn new() -> Self {
        let secs = Utc::now().timestamp() as u32;
        let count = counter().fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(process_unique());
        bytes[9..12].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Parses a 24-character hex string (either case).
    pub fn parse_str(s: &str) -> Result<Self, BsonError> {
        if s.len() != 24 {
            return Err(BsonError::InvalidObjectId(format!(
                "expected 24 hex characters, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| BsonError::InvalidObjectId(e.to_string()))?;
        Ok(Self(bytes))
    }

    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Returns the lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the creation time embedded in the first four bytes.
    pub fn timestamp_secs(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = BsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}
