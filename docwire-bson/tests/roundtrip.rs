//! Property tests for the BSON and extended JSON codecs.
//!
//! Generated documents cover every value type, nesting up to a few levels,
//! and the awkward corners of the number types: NaN, signed zero, the int64
//! extremes, and subnormal doubles.
use docwire_bson::{
    extjson, from_slice, read_document, to_vec, Array, Binary, BsonError, DateTime, Decimal128,
    Document, ObjectId, Regex, Timestamp, Value,
};
use proptest::collection::vec;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Keys never start with `$`, so no generated document reads as a wrapper.
fn arb_key() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_]{0,7}"
}

fn arb_decimal() -> impl Strategy<Value = Decimal128> {
    prop_oneof![
        (any::<bool>(), any::<u64>(), -6176i64..=6111).prop_map(|(neg, coefficient, exp)| {
            let sign = if neg { "-" } else { "" };
            format!("{}{}E{}", sign, coefficient, exp)
                .parse()
                .expect("coefficient and exponent are in range")
        }),
        Just(Decimal128::nan()),
        Just(Decimal128::infinity(true)),
        // Arbitrary wire bytes, mostly non-canonical.
        any::<[u8; 16]>().prop_map(Decimal128::from_bytes),
    ]
}

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<f64>().prop_map(Value::Double),
        Just(Value::Double(-0.0)),
        Just(Value::Double(f64::NAN)),
        any::<String>().prop_map(Value::String),
        (any::<u8>(), vec(any::<u8>(), 0..24))
            .prop_map(|(subtype, bytes)| Value::Binary(Binary::new(subtype, bytes))),
        any::<[u8; 12]>().prop_map(|b| Value::ObjectId(ObjectId::from_bytes(b))),
        any::<bool>().prop_map(Value::Boolean),
        any::<i64>().prop_map(|ms| Value::DateTime(DateTime::from_millis(ms))),
        Just(Value::Null),
        ("[a-z.*+^$]{0,10}", "[imsux]{0,4}")
            .prop_map(|(p, o)| Value::RegularExpression(Regex::new(p, o))),
        any::<i32>().prop_map(Value::Int32),
        any::<(u32, u32)>().prop_map(|(t, i)| Value::Timestamp(Timestamp::new(t, i))),
        any::<i64>().prop_map(Value::Int64),
        prop_oneof![Just(i64::MIN), Just(i64::MAX)].prop_map(Value::Int64),
        arb_decimal().prop_map(Value::Decimal128),
    ]
}

fn document_from(pairs: Vec<(String, Value)>) -> Document {
    let mut doc = Document::new();
    for (key, value) in pairs {
        doc.set(key, value);
    }
    doc
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            vec(inner.clone(), 0..6).prop_map(|items| Value::Array(Array::from(items))),
            vec((arb_key(), inner), 0..6).prop_map(|pairs| Value::Document(document_from(pairs))),
        ]
    })
}

fn arb_document() -> impl Strategy<Value = Document> {
    vec((arb_key(), arb_value()), 0..8).prop_map(document_from)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn bson_roundtrip(doc in arb_document()) {
        let bytes = to_vec(&doc).unwrap();
        prop_assert_eq!(bytes.len(), doc.encoded_len().unwrap());
        prop_assert_eq!(from_slice(&bytes).unwrap(), doc);
    }

    #[test]
    fn extjson_roundtrip(doc in arb_document()) {
        let text = extjson::document_to_string(&doc).unwrap();
        let back = extjson::document_from_str(&text).unwrap();
        prop_assert_eq!(&back, &doc);
        // Canonical output is stable under re-encoding.
        prop_assert_eq!(extjson::document_to_string(&back).unwrap(), text);
    }

    #[test]
    fn every_truncation_is_typed(doc in arb_document()) {
        let bytes = to_vec(&doc).unwrap();
        for len in 0..bytes.len() {
            let truncated = from_slice(&bytes[..len]);
            prop_assert!(
                matches!(truncated, Err(BsonError::TruncatedInput { .. })),
                "prefix {} gave {:?}",
                len,
                truncated
            );
        }
    }

    #[test]
    fn garbage_never_panics(bytes in vec(any::<u8>(), 0..64)) {
        let _ = from_slice(&bytes);
        let mut buf = &bytes[..];
        let _ = read_document(&mut buf);
    }

    #[test]
    fn corrupted_bytes_never_panic(doc in arb_document(), index in any::<usize>(), byte in any::<u8>()) {
        let mut bytes = to_vec(&doc).unwrap();
        let index = index % bytes.len();
        bytes[index] = byte;
        let _ = from_slice(&bytes);
    }
}

// ============================================================================
// Fixed scenarios
// ============================================================================

#[test]
fn key_order_survives_both_codecs() {
    let doc = Document::from_pairs([("b", 1i32), ("a", 2i32), ("c", 3i32)]).unwrap();

    let via_bson = from_slice(&to_vec(&doc).unwrap()).unwrap();
    assert_eq!(via_bson.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);

    let via_json =
        extjson::document_from_str(&extjson::document_to_string(&doc).unwrap()).unwrap();
    assert_eq!(via_json.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);
}

#[test]
fn int64_min_and_nan_through_extjson() {
    let doc = Document::from_pairs([
        ("min", Value::Int64(i64::MIN)),
        ("nan", Value::Double(f64::NAN)),
    ])
    .unwrap();
    let back = extjson::document_from_str(&extjson::document_to_string(&doc).unwrap()).unwrap();
    assert_eq!(back.get("min"), Some(&Value::Int64(-9_223_372_036_854_775_808)));
    assert!(back.get_f64("nan").unwrap().is_nan());
}

#[test]
fn values_cross_both_codecs() {
    let doc = Document::from_pairs([
        ("_id", Value::ObjectId(ObjectId::from_bytes([0; 12]))),
        ("ok", Value::Double(1.0)),
    ])
    .unwrap();
    let text = extjson::document_to_string(&from_slice(&to_vec(&doc).unwrap()).unwrap()).unwrap();
    assert_eq!(text, r#"{"_id":{"$oid":"000000000000000000000000"},"ok":1.0}"#);
}
