//! OP_MSG, the extensible message format.
//!
//! Body layout after the header:
//!
//! ```text
//! +----------+-----------------------------+------------+
//! | flagBits | section+                    | [checksum] |
//! | u32 LE   | kind 0: 0x00 document       | u32 LE     |
//! |          | kind 1: 0x01 i32 size       |            |
//! |          |         cstring identifier  |            |
//! |          |         document*           |            |
//! +----------+-----------------------------+------------+
//! ```
//!
//! The checksum, present when flag bit 0 is set, is CRC32C over every
//! preceding byte of the message including the header.

use crate::error::ProtocolError;
use crate::frame::{BodyReader, HEADER_SIZE};
use bytes::{BufMut, BytesMut};
use docwire_bson::{Array, BsonError, Document, Value};

const CHECKSUM_SIZE: usize = 4;

/// OP_MSG flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MsgFlags(u32);

impl MsgFlags {
    /// A CRC32C checksum trails the last section.
    pub const CHECKSUM_PRESENT: u32 = 1 << 0;
    /// The sender will not wait for a reply.
    pub const MORE_TO_COME: u32 = 1 << 1;
    /// The client accepts multiple replies to this request.
    pub const EXHAUST_ALLOWED: u32 = 1 << 16;

    /// Bits 0-15 must be understood by the receiver.
    const REQUIRED_MASK: u32 = 0xFFFF;
    const KNOWN_REQUIRED: u32 = Self::CHECKSUM_PRESENT | Self::MORE_TO_COME;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_checksum(mut self) -> Self {
        self.0 |= Self::CHECKSUM_PRESENT;
        self
    }

    pub fn with_more_to_come(mut self) -> Self {
        self.0 |= Self::MORE_TO_COME;
        self
    }

    pub fn with_exhaust_allowed(mut self) -> Self {
        self.0 |= Self::EXHAUST_ALLOWED;
        self
    }

    pub fn checksum_present(&self) -> bool {
        self.0 & Self::CHECKSUM_PRESENT != 0
    }

    pub fn more_to_come(&self) -> bool {
        self.0 & Self::MORE_TO_COME != 0
    }

    pub fn exhaust_allowed(&self) -> bool {
        self.0 & Self::EXHAUST_ALLOWED != 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Accepts any optional bit (16-31) but rejects unknown required bits.
    pub fn from_bits(bits: u32) -> Result<Self, ProtocolError> {
        let unknown = bits & Self::REQUIRED_MASK & !Self::KNOWN_REQUIRED;
        if unknown != 0 {
            return Err(ProtocolError::UnknownRequiredFlags(unknown));
        }
        Ok(Self(bits))
    }
}

/// One OP_MSG section.
#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    /// Kind 0: the command document.
    Body(Document),
    /// Kind 1: a named run of documents, equivalent to an array field of the
    /// command document.
    Sequence {
        identifier: String,
        documents: Vec<Document>,
    },
}

impl Section {
    fn kind(&self) -> u8 {
        match self {
            Section::Body(_) => 0,
            Section::Sequence { .. } => 1,
        }
    }
}

/// A decoded OP_MSG.
#[derive(Debug, Clone, PartialEq)]
pub struct OpMsg {
    pub flags: MsgFlags,
    pub sections: Vec<Section>,
}

impl OpMsg {
    /// Creates a message with a single body section.
    pub fn new(body: Document) -> Self {
        Self {
            flags: MsgFlags::new(),
            sections: vec![Section::Body(body)],
        }
    }

    pub fn with_checksum(mut self) -> Self {
        self.flags = self.flags.with_checksum();
        self
    }

    pub fn with_sequence(
        mut self,
        identifier: impl Into<String>,
        documents: Vec<Document>,
    ) -> Self {
        self.sections.push(Section::Sequence {
            identifier: identifier.into(),
            documents,
        });
        self
    }

    /// Returns the body section's document.
    pub fn body(&self) -> Option<&Document> {
        self.sections.iter().find_map(|section| match section {
            Section::Body(doc) => Some(doc),
            Section::Sequence { .. } => None,
        })
    }

    /// Folds every document sequence into the body as an array field,
    /// producing the logical command document.
    pub fn into_command(self) -> Result<Document, ProtocolError> {
        let mut body = None;
        let mut sequences = Vec::new();
        for (index, section) in self.sections.into_iter().enumerate() {
            match section {
                Section::Body(doc) => body = Some(doc),
                Section::Sequence {
                    identifier,
                    documents,
                } => sequences.push((index, identifier, documents)),
            }
        }

        let mut command = body.ok_or(ProtocolError::MissingBodySection)?;
        for (section, identifier, documents) in sequences {
            let array: Array = documents.into_iter().map(Value::Document).collect();
            command
                .insert(identifier, array)
                .map_err(|source| ProtocolError::Bson { section, source })?;
        }
        Ok(command)
    }

    /// Parses an OP_MSG from a complete message, header included.
    pub(crate) fn parse(frame: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = BodyReader::new(&frame[HEADER_SIZE..], HEADER_SIZE);
        let bits = reader.read_u32()?;

        // The checksum covers the flags, so verify it before trusting them.
        let mut sections_end = frame.len();
        if bits & MsgFlags::CHECKSUM_PRESENT != 0 {
            if frame.len() < HEADER_SIZE + 4 + CHECKSUM_SIZE {
                return Err(ProtocolError::mismatch(
                    HEADER_SIZE + 4,
                    "no room for checksum",
                ));
            }
            sections_end -= CHECKSUM_SIZE;
            let (covered, trailer) = frame.split_at(sections_end);
            let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
            let actual = crc32c::crc32c(covered);
            if expected != actual {
                return Err(ProtocolError::ChecksumMismatch { expected, actual });
            }
        }
        let flags = MsgFlags::from_bits(bits)?;

        let mut reader = BodyReader::new(&frame[HEADER_SIZE + 4..sections_end], HEADER_SIZE + 4);
        let mut sections = Vec::new();
        let mut has_body = false;
        while !reader.is_empty() {
            let index = sections.len();
            let section = match reader.read_u8()? {
                0 => {
                    if has_body {
                        return Err(ProtocolError::DuplicateBodySection);
                    }
                    has_body = true;
                    Section::Body(reader.read_document(index)?)
                }
                1 => {
                    let start = reader.offset();
                    let size = reader.read_i32()?;
                    let payload_len = usize::try_from(size)
                        .ok()
                        .and_then(|size| size.checked_sub(4))
                        .filter(|len| *len <= reader.remaining())
                        .ok_or_else(|| {
                            ProtocolError::mismatch(
                                start,
                                format!(
                                    "sequence declares {} bytes, {} remain",
                                    size,
                                    reader.remaining() + 4
                                ),
                            )
                        })?;
                    let mut sequence = reader.sub_reader(payload_len)?;
                    let identifier = sequence.read_cstring(index)?;
                    let mut documents = Vec::new();
                    while !sequence.is_empty() {
                        documents.push(sequence.read_document(index)?);
                    }
                    Section::Sequence {
                        identifier,
                        documents,
                    }
                }
                kind => return Err(ProtocolError::UnknownSectionKind(kind)),
            };
            sections.push(section);
        }

        if !has_body {
            return Err(ProtocolError::MissingBodySection);
        }
        Ok(Self { flags, sections })
    }

    /// Returns the encoded body length (everything after the header).
    pub(crate) fn encoded_len(&self) -> Result<usize, ProtocolError> {
        let mut len = 4;
        for (index, section) in self.sections.iter().enumerate() {
            let bson = |source: BsonError| ProtocolError::Bson {
                section: index,
                source,
            };
            len += 1;
            match section {
                Section::Body(doc) => len += doc.encoded_len().map_err(bson)?,
                Section::Sequence {
                    identifier,
                    documents,
                } => {
                    if identifier.as_bytes().contains(&0) {
                        return Err(bson(BsonError::KeyContainsNul(identifier.clone())));
                    }
                    len += 4 + identifier.len() + 1;
                    for doc in documents {
                        len += doc.encoded_len().map_err(bson)?;
                    }
                }
            }
        }
        if self.flags.checksum_present() {
            len += CHECKSUM_SIZE;
        }
        Ok(len)
    }

    /// Writes the body. `buf` must hold exactly the header written so far,
    /// so the checksum covers the whole message.
    pub(crate) fn put(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_u32_le(self.flags.bits());
        for (index, section) in self.sections.iter().enumerate() {
            let bson = |source: BsonError| ProtocolError::Bson {
                section: index,
                source,
            };
            buf.put_u8(section.kind());
            match section {
                Section::Body(doc) => {
                    docwire_bson::write_document(buf, doc).map_err(bson)?;
                }
                Section::Sequence {
                    identifier,
                    documents,
                } => {
                    let mut size = 4 + identifier.len() + 1;
                    for doc in documents {
                        size += doc.encoded_len().map_err(bson)?;
                    }
                    buf.put_i32_le(size as i32);
                    buf.put_slice(identifier.as_bytes());
                    buf.put_u8(0);
                    for doc in documents {
                        docwire_bson::write_document(buf, doc).map_err(bson)?;
                    }
                }
            }
        }
        if self.flags.checksum_present() {
            let checksum = crc32c::crc32c(&buf[..]);
            buf.put_u32_le(checksum);
        }
        Ok(())
    }
}
