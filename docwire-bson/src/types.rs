//! Small value types without a native Rust counterpart.

use chrono::{TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;

/// Binary data with its subtype byte. The payload is opaque to the codecs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binary {
    pub subtype: u8,
    pub bytes: Vec<u8>,
}

impl Binary {
    /// Generic binary subtype.
    pub const GENERIC: u8 = 0x00;
    /// Function subtype.
    pub const FUNCTION: u8 = 0x01;
    /// RFC 4122 UUID subtype.
    pub const UUID: u8 = 0x04;
    /// MD5 subtype.
    pub const MD5: u8 = 0x05;
    /// Start of the user-defined subtype range.
    pub const USER_DEFINED: u8 = 0x80;

    pub fn new(subtype: u8, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            subtype,
            bytes: bytes.into(),
        }
    }

    pub fn generic(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Self::GENERIC, bytes)
    }
}

/// Milliseconds since the Unix epoch. Negative values are pre-epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime(i64);

impl DateTime {
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub const fn timestamp_millis(&self) -> i64 {
        self.0
    }

    /// Converts to a calendar time, if it lies within chrono's range.
    pub fn to_chrono(&self) -> Option<chrono::DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl From<chrono::DateTime<Utc>> for DateTime {
    fn from(dt: chrono::DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_chrono() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            None => write!(f, "DateTime({})", self.0),
        }
    }
}

/// A regular expression. Options are kept exactly as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Regex {
    pub pattern: String,
    pub options: String,
}

impl Regex {
    pub fn new(pattern: impl Into<String>, options: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            options: options.into(),
        }
    }
}

/// Internal replication timestamp, ordered by `(time, increment)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub time: u32,
    /// Ordinal within the second.
    pub increment: u32,
}

impl Timestamp {
    pub const fn new(time: u32, increment: u32) -> Self {
        Self { time, increment }
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.increment).cmp(&(other.time, other.increment))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
