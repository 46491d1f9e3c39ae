use crate::document::Document;
use crate::error::ExtJsonError;
use crate::types::{Binary, Regex};
use crate::value::Value;
use crate::MAX_NESTING_DEPTH;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Encodes a value as compact canonical extended JSON.
///
/// Fails with [`ExtJsonError::ReservedKey`] for a document whose only key
/// starts with `$`, since its text would decode as a type wrapper, and with
/// [`ExtJsonError::NestingTooDeep`] past the depth the BSON codec accepts.
pub fn to_string(value: &Value) -> Result<String, ExtJsonError> {
    check_value(value, 0)?;
    Ok(serde_json::to_string(&Ext(value))?)
}

/// Encodes a document as compact canonical extended JSON.
pub fn document_to_string(doc: &Document) -> Result<String, ExtJsonError> {
    check_document(doc, 0)?;
    Ok(serde_json::to_string(&ExtDocument(doc))?)
}

fn check_document(doc: &Document, depth: usize) -> Result<(), ExtJsonError> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(ExtJsonError::NestingTooDeep {
            max: MAX_NESTING_DEPTH,
        });
    }
    if let (1, Some((key, _))) = (doc.len(), doc.first()) {
        if key.starts_with('$') {
            return Err(ExtJsonError::ReservedKey(key.to_string()));
        }
    }
    doc.values().try_for_each(|v| check_value(v, depth + 1))
}

/// `depth` is the nesting level a container found in `value` would occupy,
/// counted the same way as BSON encoding counts it.
fn check_value(value: &Value, depth: usize) -> Result<(), ExtJsonError> {
    match value {
        Value::Document(doc) => check_document(doc, depth),
        Value::Array(array) => {
            if depth >= MAX_NESTING_DEPTH {
                return Err(ExtJsonError::NestingTooDeep {
                    max: MAX_NESTING_DEPTH,
                });
            }
            array.iter().try_for_each(|v| check_value(v, depth + 1))
        }
        _ => Ok(()),
    }
}

struct Ext<'a>(&'a Value);

struct ExtDocument<'a>(&'a Document);

#[derive(Serialize)]
struct NumberLong {
    #[serde(rename = "$numberLong")]
    value: String,
}

#[derive(Serialize)]
struct BinaryBody {
    base64: String,
    #[serde(rename = "subType")]
    sub_type: String,
}

impl From<&Binary> for BinaryBody {
    fn from(bin: &Binary) -> Self {
        Self {
            base64: STANDARD.encode(&bin.bytes),
            sub_type: format!("{:02x}", bin.subtype),
        }
    }
}

#[derive(Serialize)]
struct RegexBody<'a> {
    pattern: &'a str,
    options: &'a str,
}

impl<'a> From<&'a Regex> for RegexBody<'a> {
    fn from(re: &'a Regex) -> Self {
        Self {
            pattern: &re.pattern,
            options: &re.options,
        }
    }
}

#[derive(Serialize)]
struct TimestampBody {
    t: u32,
    i: u32,
}

fn wrap<S, T>(serializer: S, key: &str, body: &T) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + ?Sized,
{
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(key, body)?;
    map.end()
}

fn special_double(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

impl Serialize for Ext<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Double(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Double(f) => wrap(serializer, "$numberDouble", special_double(*f)),
            Value::String(s) => serializer.serialize_str(s),
            Value::Document(doc) => ExtDocument(doc).serialize(serializer),
            Value::Array(array) => serializer.collect_seq(array.iter().map(Ext)),
            Value::Binary(bin) => wrap(serializer, "$binary", &BinaryBody::from(bin)),
            Value::ObjectId(oid) => wrap(serializer, "$oid", &oid.to_hex()),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::DateTime(dt) => wrap(
                serializer,
                "$date",
                &NumberLong {
                    value: dt.timestamp_millis().to_string(),
                },
            ),
            Value::Null => serializer.serialize_unit(),
            Value::RegularExpression(re) => {
                wrap(serializer, "$regularExpression", &RegexBody::from(re))
            }
            Value::Int32(i) => serializer.serialize_i32(*i),
            Value::Timestamp(ts) => wrap(
                serializer,
                "$timestamp",
                &TimestampBody {
                    t: ts.time,
                    i: ts.increment,
                },
            ),
            Value::Int64(i) => wrap(serializer, "$numberLong", &i.to_string()),
            Value::Decimal128(d) if d.is_canonical() => {
                wrap(serializer, "$numberDecimal", &d.to_string())
            }
            // The decimal string would drop a NaN payload or an
            // out-of-range coefficient; carry the wire bytes instead.
            Value::Decimal128(d) => wrap(
                serializer,
                "$numberDecimalBytes",
                &hex::encode(d.bytes()),
            ),
        }
    }
}

impl Serialize for ExtDocument<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0.iter() {
            map.serialize_entry(key, &Ext(value))?;
        }
        map.end()
    }
}
