//! The closed set of values a document can hold.

use crate::array::Array;
use crate::decimal128::Decimal128;
use crate::document::Document;
use crate::oid::ObjectId;
use crate::types::{Binary, DateTime, Regex, Timestamp};
use std::fmt;

/// BSON element type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElementType {
    Double = 0x01,
    String = 0x02,
    EmbeddedDocument = 0x03,
    Array = 0x04,
    Binary = 0x05,
    ObjectId = 0x07,
    Boolean = 0x08,
    DateTime = 0x09,
    Null = 0x0A,
    RegularExpression = 0x0B,
    Int32 = 0x10,
    Timestamp = 0x11,
    Int64 = 0x12,
    Decimal128 = 0x13,
}

impl ElementType {
    /// Maps a wire tag to its element type, or `None` for tags outside the
    /// supported set.
    pub fn from_u8(tag: u8) -> Option<Self> {
        let ty = match tag {
            0x01 => ElementType::Double,
            0x02 => ElementType::String,
            0x03 => ElementType::EmbeddedDocument,
            0x04 => ElementType::Array,
            0x05 => ElementType::Binary,
            0x07 => ElementType::ObjectId,
            0x08 => ElementType::Boolean,
            0x09 => ElementType::DateTime,
            0x0A => ElementType::Null,
            0x0B => ElementType::RegularExpression,
            0x10 => ElementType::Int32,
            0x11 => ElementType::Timestamp,
            0x12 => ElementType::Int64,
            0x13 => ElementType::Decimal128,
            _ => return None,
        };
        Some(ty)
    }

    /// Returns the MongoDB type alias (as used by `$type`).
    pub fn alias(&self) -> &'static str {
        match self {
            ElementType::Double => "double",
            ElementType::String => "string",
            ElementType::EmbeddedDocument => "object",
            ElementType::Array => "array",
            ElementType::Binary => "binData",
            ElementType::ObjectId => "objectId",
            ElementType::Boolean => "bool",
            ElementType::DateTime => "date",
            ElementType::Null => "null",
            ElementType::RegularExpression => "regex",
            ElementType::Int32 => "int",
            ElementType::Timestamp => "timestamp",
            ElementType::Int64 => "long",
            ElementType::Decimal128 => "decimal",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.alias())
    }
}

/// A single document value.
///
/// Equality is value identity: doubles compare by bit pattern, except that
/// any two NaNs are equal. `0.0` and `-0.0` are therefore distinct values.
#[derive(Debug, Clone)]
pub enum Value {
    Double(f64),
    String(String),
    Document(Document),
    Array(Array),
    Binary(Binary),
    ObjectId(ObjectId),
    Boolean(bool),
    DateTime(DateTime),
    Null,
    RegularExpression(Regex),
    Int32(i32),
    Timestamp(Timestamp),
    Int64(i64),
    Decimal128(Decimal128),
}

impl Value {
    /// Returns the element type of this value.
    pub fn element_type(&self) -> ElementType {
        match self {
            Value::Double(_) => ElementType::Double,
            Value::String(_) => ElementType::String,
            Value::Document(_) => ElementType::EmbeddedDocument,
            Value::Array(_) => ElementType::Array,
            Value::Binary(_) => ElementType::Binary,
            Value::ObjectId(_) => ElementType::ObjectId,
            Value::Boolean(_) => ElementType::Boolean,
            Value::DateTime(_) => ElementType::DateTime,
            Value::Null => ElementType::Null,
            Value::RegularExpression(_) => ElementType::RegularExpression,
            Value::Int32(_) => ElementType::Int32,
            Value::Timestamp(_) => ElementType::Timestamp,
            Value::Int64(_) => ElementType::Int64,
            Value::Decimal128(_) => ElementType::Decimal128,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Value::ObjectId(oid) => Some(*oid),
            _ => None,
        }
    }

    /// Interprets any numeric variant as an `f64`, the way command arguments
    /// such as `{ping: 1}` are read regardless of their exact number type.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(*f),
            Value::Int32(i) => Some(f64::from(*i)),
            Value::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Double(a), Value::Double(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::ObjectId(a), Value::ObjectId(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::RegularExpression(a), Value::RegularExpression(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Decimal128(a), Value::Decimal128(b)) => a == b,
            _ => false,
        }
    }
}

macro_rules! impl_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    f64 => Double,
    String => String,
    Document => Document,
    Array => Array,
    Binary => Binary,
    ObjectId => ObjectId,
    bool => Boolean,
    DateTime => DateTime,
    Regex => RegularExpression,
    i32 => Int32,
    Timestamp => Timestamp,
    i64 => Int64,
    Decimal128 => Decimal128,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(Array::from(v))
    }
}

impl From<Vec<Document>> for Value {
    fn from(v: Vec<Document>) -> Self {
        Value::Array(v.into_iter().map(Value::Document).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_tags() {
        for tag in 0u8..=0xFF {
            if let Some(ty) = ElementType::from_u8(tag) {
                assert_eq!(ty as u8, tag);
            }
        }
        assert_eq!(ElementType::from_u8(0x06), None); // undefined
        assert_eq!(ElementType::from_u8(0x7F), None); // max key
        assert_eq!(ElementType::from_u8(0xFF), None); // min key
    }

    #[test]
    fn test_double_identity() {
        assert_eq!(Value::Double(f64::NAN), Value::Double(-f64::NAN));
        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
        assert_eq!(Value::Double(1.5), Value::Double(1.5));
        assert_ne!(Value::Double(1.0), Value::Int32(1));
    }

    #[test]
    fn test_from_impls() {
        assert_eq!(Value::from("a"), Value::String("a".to_string()));
        assert_eq!(Value::from(7i64), Value::Int64(7));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(true)), Value::Boolean(true));
        assert_eq!(
            Value::from(vec![Value::Int32(1)]).element_type(),
            ElementType::Array
        );
    }

    #[test]
    fn test_as_number() {
        assert_eq!(Value::Int32(1).as_number(), Some(1.0));
        assert_eq!(Value::Int64(-2).as_number(), Some(-2.0));
        assert_eq!(Value::Double(0.5).as_number(), Some(0.5));
        assert_eq!(Value::Null.as_number(), None);
    }

    #[test]
    fn test_alias_display() {
        assert_eq!(ElementType::Int64.to_string(), "long");
        assert_eq!(ElementType::EmbeddedDocument.to_string(), "object");
    }
}
