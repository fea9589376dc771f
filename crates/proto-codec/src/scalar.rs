//! Coercion of JSON scalars into typed protobuf values.
//!
//! The verifier and the encoder both go through [`coerce`], so a value the
//! verifier accepts is exactly a value the encoder can write.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use proto_types::{ProtoSchema, ProtoType};
use serde_json::Value;

/// A JSON scalar converted to the representation its protobuf kind needs.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Scalar<'a> {
    Double(f64),
    Float(f32),
    /// Any integer kind; the range has already been checked
    Integer(i128),
    Bool(bool),
    String(&'a str),
    Bytes(Vec<u8>),
    Enum(i32),
}

/// Why a value could not be coerced: what was expected and what was found.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Mismatch {
    pub expected: String,
    pub actual: String,
}

impl Mismatch {
    fn new(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Short description of a JSON value's kind, used in mismatch reports.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Coerce a scalar JSON value to `proto_type`.
///
/// Message and map types are not scalars and always report a mismatch here;
/// callers handle them structurally.
pub(crate) fn coerce<'a>(
    schema: &ProtoSchema,
    proto_type: &ProtoType,
    value: &'a Value,
) -> Result<Scalar<'a>, Mismatch> {
    match proto_type {
        ProtoType::String => match value {
            Value::String(s) => Ok(Scalar::String(s)),
            other => Err(Mismatch::new("string", kind_of(other))),
        },
        ProtoType::Bool => match value {
            Value::Bool(b) => Ok(Scalar::Bool(*b)),
            other => Err(Mismatch::new("bool", kind_of(other))),
        },
        ProtoType::Bytes => match value {
            Value::String(s) => decode_base64(s)
                .map(Scalar::Bytes)
                .ok_or_else(|| Mismatch::new("base64 bytes", "non-base64 string")),
            other => Err(Mismatch::new("base64 bytes", kind_of(other))),
        },
        ProtoType::Double => coerce_float(value, "double").map(Scalar::Double),
        ProtoType::Float => {
            let v = coerce_float(value, "float")?;
            if v.abs() > f32::MAX as f64 {
                return Err(Mismatch::new("float", format!("out-of-range number {v}")));
            }
            Ok(Scalar::Float(v as f32))
        }
        ProtoType::Enum(enum_name) => coerce_enum(schema, enum_name, value).map(Scalar::Enum),
        t if t.is_integer() => coerce_integer(t, value).map(Scalar::Integer),
        other => Err(Mismatch::new(other.type_name(), kind_of(value))),
    }
}

/// Coerce a JSON object key to a map key of `key_type`.
pub(crate) fn coerce_map_key<'a>(
    key_type: &ProtoType,
    key: &'a str,
) -> Result<Scalar<'a>, Mismatch> {
    match key_type {
        ProtoType::String => Ok(Scalar::String(key)),
        ProtoType::Bool => match key {
            "true" => Ok(Scalar::Bool(true)),
            "false" => Ok(Scalar::Bool(false)),
            _ => Err(Mismatch::new("bool map key", format!("\"{key}\""))),
        },
        t if t.is_integer() => {
            let expected = format!("{t} map key");
            let parsed = parse_decimal(key)
                .ok_or_else(|| Mismatch::new(&expected, format!("\"{key}\"")))?;
            check_range(t, parsed)
                .map(Scalar::Integer)
                .map_err(|m| Mismatch::new(expected, m.actual))
        }
        other => Err(Mismatch::new(
            "valid map key type",
            format!("{} key for \"{key}\"", other.type_name()),
        )),
    }
}

fn coerce_float(value: &Value, expected: &str) -> Result<f64, Mismatch> {
    let v = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| Mismatch::new(expected, "unrepresentable number"))?,
        other => return Err(Mismatch::new(expected, kind_of(other))),
    };
    if !v.is_finite() {
        return Err(Mismatch::new(
            format!("finite {expected}"),
            "non-finite number",
        ));
    }
    Ok(v)
}

fn coerce_integer(proto_type: &ProtoType, value: &Value) -> Result<i128, Mismatch> {
    let expected = proto_type.type_name();
    let parsed: i128 = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i as i128
            } else if let Some(u) = n.as_u64() {
                u as i128
            } else {
                let f = n
                    .as_f64()
                    .ok_or_else(|| Mismatch::new(&expected, "unrepresentable number"))?;
                float_to_integer(f).ok_or_else(|| Mismatch::new(&expected, format!("number {f}")))?
            }
        }
        other => return Err(Mismatch::new(expected, kind_of(other))),
    };
    check_range(proto_type, parsed)
}

fn check_range(proto_type: &ProtoType, parsed: i128) -> Result<i128, Mismatch> {
    let expected = proto_type.type_name();
    match proto_type.integer_range() {
        Some((min, max)) if parsed < min || parsed > max => Err(Mismatch::new(
            expected,
            format!("out-of-range integer {parsed}"),
        )),
        _ => Ok(parsed),
    }
}

/// Plain decimal text: an optional `-` followed by ASCII digits.
fn parse_decimal(text: &str) -> Option<i128> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Integral floats (e.g. `16700.0`) are accepted for integer kinds.
fn float_to_integer(f: f64) -> Option<i128> {
    // 2^64 bounds every integer kind; the range check narrows it further
    const LIMIT: f64 = 18_446_744_073_709_551_616.0;
    if f.is_finite() && f.fract() == 0.0 && f.abs() <= LIMIT {
        Some(f as i128)
    } else {
        None
    }
}

fn coerce_enum(schema: &ProtoSchema, enum_name: &str, value: &Value) -> Result<i32, Mismatch> {
    let expected = format!("enum {enum_name}");
    match value {
        Value::String(s) => {
            let descriptor = schema
                .get_enum(enum_name)
                .ok_or_else(|| Mismatch::new(&expected, "undeclared enum type"))?;
            descriptor
                .number_of(s)
                .ok_or_else(|| Mismatch::new(&expected, format!("unknown value \"{s}\"")))
        }
        Value::Number(_) => coerce_integer(&ProtoType::Int32, value)
            .map(|i| i as i32)
            .map_err(|m| Mismatch::new(expected, m.actual)),
        other => Err(Mismatch::new(expected, kind_of(other))),
    }
}

fn decode_base64(s: &str) -> Option<Vec<u8>> {
    STANDARD
        .decode(s)
        .or_else(|_| URL_SAFE.decode(s))
        .or_else(|_| STANDARD_NO_PAD.decode(s))
        .or_else(|_| URL_SAFE_NO_PAD.decode(s))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proto_types::ProtoEnumDescriptor;
    use serde_json::json;

    fn schema_with_enum() -> ProtoSchema {
        ProtoSchema::new(
            vec![],
            vec![ProtoEnumDescriptor::new(
                "Status",
                vec![("UNKNOWN".to_string(), 0), ("ACTIVE".to_string(), 1)],
            )],
        )
    }

    #[test]
    fn test_coerce_strings_and_bools() {
        let schema = ProtoSchema::default();
        let value = json!("abc");
        assert_eq!(
            coerce(&schema, &ProtoType::String, &value),
            Ok(Scalar::String("abc"))
        );

        let err = coerce(&schema, &ProtoType::String, &json!(123)).unwrap_err();
        assert_eq!(err.expected, "string");
        assert_eq!(err.actual, "number");

        assert_eq!(
            coerce(&schema, &ProtoType::Bool, &json!(true)),
            Ok(Scalar::Bool(true))
        );
        assert!(coerce(&schema, &ProtoType::Bool, &json!("true")).is_err());
    }

    #[test]
    fn test_coerce_integers() {
        let schema = ProtoSchema::default();
        assert_eq!(
            coerce(&schema, &ProtoType::Int64, &json!(16700)),
            Ok(Scalar::Integer(16700))
        );
        assert_eq!(
            coerce(&schema, &ProtoType::Int64, &json!(16700.0)),
            Ok(Scalar::Integer(16700))
        );
        assert_eq!(
            coerce(&schema, &ProtoType::Uint64, &json!(u64::MAX)),
            Ok(Scalar::Integer(u64::MAX as i128))
        );

        let err = coerce(&schema, &ProtoType::Int64, &json!(1.5)).unwrap_err();
        assert_eq!(err.expected, "int64");

        // Numeric text is a string, not a number
        for text in ["-42", "1e3", "  42 "] {
            let err = coerce(&schema, &ProtoType::Int64, &json!(text)).unwrap_err();
            assert_eq!(err.expected, "int64");
            assert_eq!(err.actual, "string");
        }

        let err = coerce(&schema, &ProtoType::Uint32, &json!(-1)).unwrap_err();
        assert_eq!(err.actual, "out-of-range integer -1");

        let err = coerce(&schema, &ProtoType::Int32, &json!(3_000_000_000u64)).unwrap_err();
        assert!(err.actual.starts_with("out-of-range"));
    }

    #[test]
    fn test_coerce_floats() {
        let schema = ProtoSchema::default();
        assert_eq!(
            coerce(&schema, &ProtoType::Double, &json!(22.5)),
            Ok(Scalar::Double(22.5))
        );
        assert_eq!(
            coerce(&schema, &ProtoType::Double, &json!(7)),
            Ok(Scalar::Double(7.0))
        );

        for text in ["22.5", "NaN", "warm"] {
            let err = coerce(&schema, &ProtoType::Double, &json!(text)).unwrap_err();
            assert_eq!(err.expected, "double");
            assert_eq!(err.actual, "string");
        }
        assert!(coerce(&schema, &ProtoType::Float, &json!("1.25")).is_err());

        assert!(coerce(&schema, &ProtoType::Float, &json!(1e300)).is_err());
    }

    #[test]
    fn test_coerce_bytes() {
        let schema = ProtoSchema::default();
        assert_eq!(
            coerce(&schema, &ProtoType::Bytes, &json!("aGVsbG8=")),
            Ok(Scalar::Bytes(b"hello".to_vec()))
        );
        assert_eq!(
            coerce(&schema, &ProtoType::Bytes, &json!("aGVsbG8")),
            Ok(Scalar::Bytes(b"hello".to_vec()))
        );
        assert!(coerce(&schema, &ProtoType::Bytes, &json!("!!!")).is_err());
    }

    #[test]
    fn test_coerce_enums() {
        let schema = schema_with_enum();
        let status = ProtoType::Enum("Status".to_string());
        assert_eq!(
            coerce(&schema, &status, &json!("ACTIVE")),
            Ok(Scalar::Enum(1))
        );
        assert_eq!(coerce(&schema, &status, &json!(5)), Ok(Scalar::Enum(5)));

        let err = coerce(&schema, &status, &json!("PAUSED")).unwrap_err();
        assert_eq!(err.expected, "enum Status");
        assert_eq!(err.actual, "unknown value \"PAUSED\"");
    }

    #[test]
    fn test_coerce_map_keys() {
        assert_eq!(
            coerce_map_key(&ProtoType::Int32, "12"),
            Ok(Scalar::Integer(12))
        );
        assert_eq!(
            coerce_map_key(&ProtoType::Bool, "false"),
            Ok(Scalar::Bool(false))
        );
        assert_eq!(
            coerce_map_key(&ProtoType::Sint64, "-7"),
            Ok(Scalar::Integer(-7))
        );
        assert!(coerce_map_key(&ProtoType::Uint32, "x").is_err());
    }

    #[test]
    fn test_integer_map_keys_must_be_plain_decimal() {
        for key in ["1e3", " 42", "42 ", "+1", "12.0", "-", ""] {
            let err = coerce_map_key(&ProtoType::Int32, key).unwrap_err();
            assert_eq!(err.expected, "int32 map key");
            assert_eq!(err.actual, format!("\"{key}\""));
        }

        let err = coerce_map_key(&ProtoType::Uint32, "-1").unwrap_err();
        assert_eq!(err.expected, "uint32 map key");
        assert_eq!(err.actual, "out-of-range integer -1");
    }
}
