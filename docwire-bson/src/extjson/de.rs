use crate::array::Array;
use crate::decimal128::Decimal128;
use crate::document::Document;
use crate::error::ExtJsonError;
use crate::oid::ObjectId;
use crate::types::{Binary, DateTime, Regex, Timestamp};
use crate::value::{ElementType, Value};
use crate::MAX_NESTING_DEPTH;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use std::fmt;

/// Parsed JSON that keeps object key order and repeated keys, so both can
/// be checked when converting to a [`Value`].
enum Json {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Array(Vec<Json>),
    Object(Vec<(String, Json)>),
}

impl Json {
    fn kind(&self) -> &'static str {
        match self {
            Json::Null => "null",
            Json::Bool(_) => "boolean",
            Json::Int(_) | Json::UInt(_) => "integer",
            Json::Float(_) => "number",
            Json::Str(_) => "string",
            Json::Array(_) => "array",
            Json::Object(_) => "object",
        }
    }
}

struct JsonVisitor;

impl<'de> Visitor<'de> for JsonVisitor {
    type Value = Json;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Json, E> {
        Ok(Json::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Json, E> {
        Ok(Json::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Json, E> {
        Ok(Json::UInt(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Json, E> {
        Ok(Json::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Json, E> {
        Ok(Json::Str(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Json, E> {
        Ok(Json::Str(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Json, E> {
        Ok(Json::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Json, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Json::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Json, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(entry) = map.next_entry::<String, Json>()? {
            entries.push(entry);
        }
        Ok(Json::Object(entries))
    }
}

impl<'de> Deserialize<'de> for Json {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(JsonVisitor)
    }
}

/// Decodes any extended JSON value. The bare `null` literal decodes to
/// [`Value::Null`].
pub fn from_str(text: &str) -> Result<Value, ExtJsonError> {
    let json: Json = serde_json::from_str(text)?;
    into_value(json, 0)
}

/// Decodes a top-level document.
pub fn document_from_str(text: &str) -> Result<Document, ExtJsonError> {
    match decode_typed(text, ElementType::EmbeddedDocument)? {
        Value::Document(doc) => Ok(doc),
        other => Err(ExtJsonError::TypeMismatch {
            expected: ElementType::EmbeddedDocument,
            found: other.element_type(),
        }),
    }
}

/// Shared entry for the per-type decoders, which never accept `null`.
fn decode_typed(text: &str, expected: ElementType) -> Result<Value, ExtJsonError> {
    let json: Json = serde_json::from_str(text)?;
    if let Json::Null = json {
        return Err(ExtJsonError::NullInput(expected));
    }
    into_value(json, 0)
}

macro_rules! typed_decoders {
    ($($(#[$meta:meta])* $name:ident -> $out:ty, $ty:ident { $($pat:pat => $value:expr),+ $(,)? })*) => {
        $(
            $(#[$meta])*
            pub fn $name(text: &str) -> Result<$out, ExtJsonError> {
                match decode_typed(text, ElementType::$ty)? {
                    $($pat => Ok($value),)+
                    other => Err(ExtJsonError::TypeMismatch {
                        expected: ElementType::$ty,
                        found: other.element_type(),
                    }),
                }
            }
        )*
    };
}

typed_decoders! {
    /// Decodes a double. Int32 input widens exactly.
    decode_double -> f64, Double {
        Value::Double(f) => f,
        Value::Int32(i) => f64::from(i),
    }
    decode_string -> String, String { Value::String(s) => s }
    decode_array -> Array, Array { Value::Array(array) => array }
    decode_binary -> Binary, Binary { Value::Binary(bin) => bin }
    decode_object_id -> ObjectId, ObjectId { Value::ObjectId(oid) => oid }
    decode_bool -> bool, Boolean { Value::Boolean(b) => b }
    decode_datetime -> DateTime, DateTime { Value::DateTime(dt) => dt }
    decode_regex -> Regex, RegularExpression { Value::RegularExpression(re) => re }
    decode_int32 -> i32, Int32 { Value::Int32(i) => i }
    decode_timestamp -> Timestamp, Timestamp { Value::Timestamp(ts) => ts }
    /// Decodes an int64. Int32 input widens.
    decode_int64 -> i64, Int64 {
        Value::Int64(i) => i,
        Value::Int32(i) => i64::from(i),
    }
    decode_decimal128 -> Decimal128, Decimal128 { Value::Decimal128(d) => d }
}

/// `depth` counts container nesting the same way the BSON codec does, so
/// text too deep to encode as BSON is rejected here as well.
fn into_value(json: Json, depth: usize) -> Result<Value, ExtJsonError> {
    let value = match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(b),
        Json::Int(i) => integer(i),
        Json::UInt(u) => match i64::try_from(u) {
            Ok(i) => integer(i),
            Err(_) => Value::Double(u as f64),
        },
        Json::Float(f) => Value::Double(f),
        Json::Str(s) => Value::String(s),
        Json::Array(items) => {
            check_depth(depth)?;
            Value::Array(
                items
                    .into_iter()
                    .map(|item| into_value(item, depth + 1))
                    .collect::<Result<Array, _>>()?,
            )
        }
        Json::Object(mut entries) => {
            if entries.len() == 1 && entries[0].0.starts_with('$') {
                if let Some((key, body)) = entries.pop() {
                    return wrapper(key, body);
                }
            }
            check_depth(depth)?;
            let mut doc = Document::with_capacity(entries.len());
            for (key, value) in entries {
                if doc.contains_key(&key) {
                    return Err(ExtJsonError::DuplicateKey(key));
                }
                let value = into_value(value, depth + 1)?;
                doc.set(key, value);
            }
            Value::Document(doc)
        }
    };
    Ok(value)
}

fn check_depth(depth: usize) -> Result<(), ExtJsonError> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(ExtJsonError::NestingTooDeep {
            max: MAX_NESTING_DEPTH,
        });
    }
    Ok(())
}

fn integer(i: i64) -> Value {
    match i32::try_from(i) {
        Ok(small) => Value::Int32(small),
        Err(_) => Value::Int64(i),
    }
}

fn wrapper(key: String, body: Json) -> Result<Value, ExtJsonError> {
    let value = match key.as_str() {
        "$oid" => {
            let hex = string("$oid", body)?;
            let oid = ObjectId::parse_str(&hex)
                .map_err(|e| ExtJsonError::malformed("$oid", e.to_string()))?;
            Value::ObjectId(oid)
        }
        "$numberInt" => {
            let text = string("$numberInt", body)?;
            Value::Int32(
                text.parse()
                    .map_err(|_| ExtJsonError::malformed("$numberInt", text))?,
            )
        }
        "$numberLong" => Value::Int64(number_long("$numberLong", body)?),
        "$numberDouble" => Value::Double(number_double(body)?),
        "$numberDecimal" => {
            let text = string("$numberDecimal", body)?;
            let d = text
                .parse::<Decimal128>()
                .map_err(|e| ExtJsonError::malformed("$numberDecimal", e.to_string()))?;
            Value::Decimal128(d)
        }
        "$numberDecimalBytes" => {
            let text = string("$numberDecimalBytes", body)?;
            let mut bytes = [0u8; 16];
            hex::decode_to_slice(&text, &mut bytes).map_err(|e| {
                ExtJsonError::malformed("$numberDecimalBytes", format!("{:?}: {}", text, e))
            })?;
            Value::Decimal128(Decimal128::from_bytes(bytes))
        }
        "$binary" => {
            let [base64, sub_type] = fields("$binary", body, ["base64", "subType"])?;
            let bytes = STANDARD
                .decode(string("$binary", base64)?)
                .map_err(|e| ExtJsonError::malformed("$binary", e.to_string()))?;
            let sub_type = string("$binary", sub_type)?;
            if sub_type.is_empty() || sub_type.len() > 2 {
                return Err(ExtJsonError::malformed(
                    "$binary",
                    format!("subType {:?} is not one or two hex digits", sub_type),
                ));
            }
            let subtype = u8::from_str_radix(&sub_type, 16).map_err(|_| {
                ExtJsonError::malformed("$binary", format!("subType {:?} is not hex", sub_type))
            })?;
            Value::Binary(Binary::new(subtype, bytes))
        }
        "$date" => Value::DateTime(date(body)?),
        "$regularExpression" => {
            let [pattern, options] =
                fields("$regularExpression", body, ["pattern", "options"])?;
            Value::RegularExpression(Regex::new(
                string("$regularExpression", pattern)?,
                string("$regularExpression", options)?,
            ))
        }
        "$timestamp" => {
            let [t, i] = fields("$timestamp", body, ["t", "i"])?;
            Value::Timestamp(Timestamp::new(
                uint32("$timestamp", t)?,
                uint32("$timestamp", i)?,
            ))
        }
        _ => return Err(ExtJsonError::UnknownWrapper(key)),
    };
    Ok(value)
}

fn string(wrapper: &'static str, json: Json) -> Result<String, ExtJsonError> {
    match json {
        Json::Str(s) => Ok(s),
        other => Err(ExtJsonError::malformed(
            wrapper,
            format!("expected a string, found {}", other.kind()),
        )),
    }
}

fn uint32(wrapper: &'static str, json: Json) -> Result<u32, ExtJsonError> {
    let n = match json {
        Json::Int(i) => u32::try_from(i).ok(),
        Json::UInt(u) => u32::try_from(u).ok(),
        ref other => {
            return Err(ExtJsonError::malformed(
                wrapper,
                format!("expected an integer, found {}", other.kind()),
            ))
        }
    };
    n.ok_or_else(|| ExtJsonError::malformed(wrapper, "integer out of uint32 range"))
}

fn number_long(wrapper: &'static str, json: Json) -> Result<i64, ExtJsonError> {
    let text = string(wrapper, json)?;
    text.parse()
        .map_err(|_| ExtJsonError::malformed(wrapper, format!("{:?} is not an int64", text)))
}

fn number_double(json: Json) -> Result<f64, ExtJsonError> {
    let text = string("$numberDouble", json)?;
    match text.as_str() {
        "NaN" => return Ok(f64::NAN),
        "Infinity" => return Ok(f64::INFINITY),
        "-Infinity" => return Ok(f64::NEG_INFINITY),
        _ => {}
    }
    // Rust also parses "inf" and "nan"; only the spellings above are valid.
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(f),
        _ => Err(ExtJsonError::malformed(
            "$numberDouble",
            format!("{:?} is not a double", text),
        )),
    }
}

fn date(json: Json) -> Result<DateTime, ExtJsonError> {
    match json {
        Json::Object(_) => {
            let [millis] = fields("$date", json, ["$numberLong"])?;
            Ok(DateTime::from_millis(number_long("$date", millis)?))
        }
        Json::Int(i) => Ok(DateTime::from_millis(i)),
        Json::UInt(u) => i64::try_from(u)
            .map(DateTime::from_millis)
            .map_err(|_| ExtJsonError::malformed("$date", "milliseconds out of int64 range")),
        Json::Str(s) => chrono::DateTime::parse_from_rfc3339(&s)
            .map(|dt| DateTime::from_millis(dt.timestamp_millis()))
            .map_err(|e| ExtJsonError::malformed("$date", format!("{:?}: {}", s, e))),
        other => Err(ExtJsonError::malformed(
            "$date",
            format!("unexpected {}", other.kind()),
        )),
    }
}

/// Destructures a wrapper body that must hold exactly the named fields, in
/// any order.
fn fields<const N: usize>(
    wrapper: &'static str,
    json: Json,
    names: [&str; N],
) -> Result<[Json; N], ExtJsonError> {
    let entries = match json {
        Json::Object(entries) => entries,
        other => {
            return Err(ExtJsonError::malformed(
                wrapper,
                format!("expected an object, found {}", other.kind()),
            ))
        }
    };

    let mut slots: [Option<Json>; N] = std::array::from_fn(|_| None);
    for (key, value) in entries {
        let index = names
            .iter()
            .position(|name| *name == key)
            .ok_or_else(|| ExtJsonError::malformed(wrapper, format!("unexpected field {:?}", key)))?;
        if slots[index].is_some() {
            return Err(ExtJsonError::DuplicateKey(key));
        }
        slots[index] = Some(value);
    }

    if let Some(missing) = slots.iter().position(Option::is_none) {
        return Err(ExtJsonError::malformed(
            wrapper,
            format!("missing field {:?}", names[missing]),
        ));
    }
    Ok(slots.map(|slot| slot.unwrap_or(Json::Null)))
}
