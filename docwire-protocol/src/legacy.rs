//! Legacy OP_QUERY and OP_REPLY.
//!
//! Drivers that do not yet know the server's wire version send their first
//! `hello` as an OP_QUERY against `admin.$cmd` and expect an OP_REPLY.

use crate::error::ProtocolError;
use crate::frame::BodyReader;
use bytes::{BufMut, BytesMut};
use docwire_bson::Document;

/// A legacy query.
///
/// ```text
/// flags:i32 | fullCollectionName:cstring | numberToSkip:i32 |
/// numberToReturn:i32 | query:document | [returnFieldsSelector:document]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OpQuery {
    pub flags: i32,
    pub full_collection_name: String,
    pub number_to_skip: i32,
    pub number_to_return: i32,
    pub query: Document,
    pub return_fields_selector: Option<Document>,
}

impl OpQuery {
    /// Creates a command query against `<database>.$cmd`.
    pub fn command(database: &str, query: Document) -> Self {
        Self {
            flags: 0,
            full_collection_name: format!("{}.$cmd", database),
            number_to_skip: 0,
            number_to_return: -1,
            query,
            return_fields_selector: None,
        }
    }

    /// Returns the database part of the namespace.
    pub fn database(&self) -> &str {
        match self.full_collection_name.split_once('.') {
            Some((db, _)) => db,
            None => &self.full_collection_name,
        }
    }

    /// Returns whether the query targets the `$cmd` pseudo-collection.
    pub fn is_command(&self) -> bool {
        self.full_collection_name.ends_with(".$cmd")
    }

    pub(crate) fn parse(mut reader: BodyReader<'_>) -> Result<Self, ProtocolError> {
        let flags = reader.read_i32()?;
        let full_collection_name = reader.read_cstring(0)?;
        let number_to_skip = reader.read_i32()?;
        let number_to_return = reader.read_i32()?;
        let query = reader.read_document(0)?;
        let return_fields_selector = if reader.is_empty() {
            None
        } else {
            Some(reader.read_document(1)?)
        };
        if !reader.is_empty() {
            return Err(ProtocolError::mismatch(
                reader.offset(),
                format!("{} trailing bytes after OP_QUERY", reader.remaining()),
            ));
        }
        Ok(Self {
            flags,
            full_collection_name,
            number_to_skip,
            number_to_return,
            query,
            return_fields_selector,
        })
    }

    pub(crate) fn encoded_len(&self) -> Result<usize, ProtocolError> {
        let mut len = 4 + self.full_collection_name.len() + 1 + 8;
        len += self
            .query
            .encoded_len()
            .map_err(|source| ProtocolError::Bson { section: 0, source })?;
        if let Some(selector) = &self.return_fields_selector {
            len += selector
                .encoded_len()
                .map_err(|source| ProtocolError::Bson { section: 1, source })?;
        }
        Ok(len)
    }

    pub(crate) fn put(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_i32_le(self.flags);
        buf.put_slice(self.full_collection_name.as_bytes());
        buf.put_u8(0);
        buf.put_i32_le(self.number_to_skip);
        buf.put_i32_le(self.number_to_return);
        docwire_bson::write_document(buf, &self.query)
            .map_err(|source| ProtocolError::Bson { section: 0, source })?;
        if let Some(selector) = &self.return_fields_selector {
            docwire_bson::write_document(buf, selector)
                .map_err(|source| ProtocolError::Bson { section: 1, source })?;
        }
        Ok(())
    }
}

/// A legacy reply.
///
/// ```text
/// responseFlags:i32 | cursorID:i64 | startingFrom:i32 |
/// numberReturned:i32 | documents*
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OpReply {
    pub response_flags: i32,
    pub cursor_id: i64,
    pub starting_from: i32,
    pub documents: Vec<Document>,
}

impl OpReply {
    /// Set when the query failed; the single document carries `$err`.
    pub const QUERY_FAILURE: i32 = 1 << 1;
    /// Set by servers that accept the `AwaitData` query option.
    pub const AWAIT_CAPABLE: i32 = 1 << 3;

    /// Creates a reply carrying documents with no open cursor.
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            response_flags: Self::AWAIT_CAPABLE,
            cursor_id: 0,
            starting_from: 0,
            documents,
        }
    }

    pub(crate) fn parse(mut reader: BodyReader<'_>) -> Result<Self, ProtocolError> {
        let response_flags = reader.read_i32()?;
        let cursor_id = reader.read_i64()?;
        let starting_from = reader.read_i32()?;
        let count_offset = reader.offset();
        let number_returned = reader.read_i32()?;

        let mut documents = Vec::new();
        while !reader.is_empty() {
            documents.push(reader.read_document(documents.len())?);
        }
        if usize::try_from(number_returned).ok() != Some(documents.len()) {
            return Err(ProtocolError::mismatch(
                count_offset,
                format!(
                    "numberReturned is {} but {} documents follow",
                    number_returned,
                    documents.len()
                ),
            ));
        }
        Ok(Self {
            response_flags,
            cursor_id,
            starting_from,
            documents,
        })
    }

    pub(crate) fn encoded_len(&self) -> Result<usize, ProtocolError> {
        let mut len = 20;
        for (section, doc) in self.documents.iter().enumerate() {
            len += doc
                .encoded_len()
                .map_err(|source| ProtocolError::Bson { section, source })?;
        }
        Ok(len)
    }

    pub(crate) fn put(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_i32_le(self.response_flags);
        buf.put_i64_le(self.cursor_id);
        buf.put_i32_le(self.starting_from);
        buf.put_i32_le(self.documents.len() as i32);
        for (section, doc) in self.documents.iter().enumerate() {
            docwire_bson::write_document(buf, doc)
                .map_err(|source| ProtocolError::Bson { section, source })?;
        }
        Ok(())
    }
}
