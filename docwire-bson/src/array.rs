//! Arrays and their document form.

use crate::document::Document;
use crate::error::BsonError;
use crate::value::Value;

/// An ordered sequence of values.
///
/// On the wire an array is a document keyed `"0"`, `"1"`, ... with no gaps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array(Vec<Value>);

impl Array {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.0.push(value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }

    /// Builds an array from its document form, requiring keys `"0".."n-1"`
    /// in ascending order.
    pub fn from_document(doc: Document) -> Result<Self, BsonError> {
        let mut values = Vec::with_capacity(doc.len());
        for (i, (key, value)) in doc.into_iter().enumerate() {
            check_index(i, &key)?;
            values.push(value);
        }
        Ok(Self(values))
    }

    /// Returns the document form of this array.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::with_capacity(self.0.len());
        for (i, value) in self.0.iter().enumerate() {
            // Index keys are distinct by construction.
            doc.set(i.to_string(), value.clone());
        }
        doc
    }
}

pub(crate) fn check_index(expected: usize, key: &str) -> Result<(), BsonError> {
    // Compare textually so "01" or "+1" never pass as index 1.
    let expected = expected.to_string();
    if key != expected {
        return Err(BsonError::NonContiguousArrayIndex {
            expected,
            found: key.to_string(),
        });
    }
    Ok(())
}

impl From<Vec<Value>> for Array {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Array {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Array {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_roundtrip() {
        let array = Array::from(vec![Value::Int32(1), Value::from("x"), Value::Null]);
        let doc = array.to_document();
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["0", "1", "2"]);
        assert_eq!(Array::from_document(doc).unwrap(), array);
    }

    #[test]
    fn test_gap_rejected() {
        let doc = Document::from_pairs([("0", 1i32), ("2", 2i32)]).unwrap();
        let err = Array::from_document(doc).unwrap_err();
        assert_eq!(
            err,
            BsonError::NonContiguousArrayIndex {
                expected: "1".to_string(),
                found: "2".to_string(),
            }
        );
    }

    #[test]
    fn test_out_of_order_rejected() {
        let doc = Document::from_pairs([("1", 1i32), ("0", 2i32)]).unwrap();
        assert!(matches!(
            Array::from_document(doc),
            Err(BsonError::NonContiguousArrayIndex { .. })
        ));
    }

    #[test]
    fn test_non_canonical_index_rejected() {
        let doc = Document::from_pairs([("00", 1i32)]).unwrap();
        assert!(Array::from_document(doc).is_err());
    }

    #[test]
    fn test_get_out_of_range() {
        let array = Array::from(vec![Value::Int32(1)]);
        assert_eq!(array.get(0), Some(&Value::Int32(1)));
        assert_eq!(array.get(1), None);
    }

    #[test]
    fn test_empty() {
        let array = Array::from_document(Document::new()).unwrap();
        assert!(array.is_empty());
        assert!(array.to_document().is_empty());
    }
}
