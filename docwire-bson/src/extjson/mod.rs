//! Extended JSON: a lossless, type-preserving text form of the document model.
//!
//! Values that plain JSON cannot carry are written as single-key wrapper
//! objects:
//!
//! | Value | Text |
//! |---|---|
//! | finite double | JSON number with a fraction or exponent |
//! | NaN, ±Infinity | `{"$numberDouble":"NaN"}` |
//! | int32 | JSON integer |
//! | int64 | `{"$numberLong":"-9223372036854775808"}` |
//! | ObjectId | `{"$oid":"<24 hex>"}` |
//! | binary | `{"$binary":{"base64":"..","subType":"00"}}` |
//! | datetime | `{"$date":{"$numberLong":"<ms>"}}` |
//! | regex | `{"$regularExpression":{"pattern":"..","options":".."}}` |
//! | timestamp | `{"$timestamp":{"t":<secs>,"i":<increment>}}` |
//! | decimal128 | `{"$numberDecimal":"<decimal>"}` |
//! | non-canonical decimal128 | `{"$numberDecimalBytes":"<32 hex, wire order>"}` |
//!
//! A decimal128 whose bytes differ from the encoding of its own string form
//! (a signed or payload-carrying NaN, a coefficient above 10^34 - 1) keeps
//! its bytes through `$numberDecimalBytes`. Nesting is capped at
//! [`MAX_NESTING_DEPTH`](crate::MAX_NESTING_DEPTH) in both directions, as in
//! BSON.
//!
//! Encoding is compact and deterministic. Decoding also accepts the relaxed
//! forms `$numberInt`, finite `$numberDouble`, and `$date` given as an
//! integer or an RFC 3339 string.

mod de;
mod ser;

pub use de::{
    decode_array, decode_binary, decode_bool, decode_datetime, decode_decimal128, decode_double,
    decode_int32, decode_int64, decode_object_id, decode_regex, decode_string, decode_timestamp,
    document_from_str, from_str,
};
pub use ser::{document_to_string, to_string};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Document, Value};

    #[test]
    fn test_key_order_roundtrip() {
        let doc = Document::from_pairs([("b", 1i32), ("a", 2i32), ("c", 3i32)]).unwrap();
        let text = document_to_string(&doc).unwrap();
        assert_eq!(text, r#"{"b":1,"a":2,"c":3}"#);

        let back = document_from_str(&text).unwrap();
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);
        assert_eq!(back, doc);
    }

    #[test]
    fn test_int64_extremes() {
        for n in [i64::MIN, i64::MAX, 0, -1] {
            let text = to_string(&Value::Int64(n)).unwrap();
            assert_eq!(from_str(&text).unwrap(), Value::Int64(n));
        }
    }

    #[test]
    fn test_nan_roundtrip() {
        let text = to_string(&Value::Double(f64::NAN)).unwrap();
        assert_eq!(text, r#"{"$numberDouble":"NaN"}"#);
        match from_str(&text).unwrap() {
            Value::Double(f) => assert!(f.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reencoding_is_stable() {
        let text = r#"{ "x" : { "$numberInt" : "7" }, "y": [1.5, {"$date": 0}] }"#;
        let once = to_string(&from_str(text).unwrap()).unwrap();
        let twice = to_string(&from_str(&once).unwrap()).unwrap();
        assert_eq!(once, r#"{"x":7,"y":[1.5,{"$date":{"$numberLong":"0"}}]}"#);
        assert_eq!(once, twice);
    }
}
