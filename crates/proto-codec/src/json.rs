//! Renders decoded messages as JSON values.
//!
//! Output follows proto3 presence rules: fields appear in declaration order,
//! absent fields and implicit defaults are left out, and so are empty
//! repeated and map fields.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use proto_types::{ProtoFieldValue, ProtoMessage, ProtoMessageDescriptor, ProtoSchema, ProtoType};
use serde_json::{Map, Number, Value};

/// Convert a decoded message to a JSON object.
pub fn to_json(schema: &ProtoSchema, message: &ProtoMessage) -> Result<Value> {
    let descriptor = schema
        .get_message(&message.message_type)
        .ok_or_else(|| Error::MessageTypeNotFound(message.message_type.clone()))?;
    render_message(schema, descriptor, message)
}

fn render_message(
    schema: &ProtoSchema,
    descriptor: &ProtoMessageDescriptor,
    message: &ProtoMessage,
) -> Result<Value> {
    let mut object = Map::new();

    for field in descriptor.fields_in_order() {
        let Some(value) = message.fields.get(&field.name) else {
            continue;
        };

        let rendered = match (&field.field_type, value) {
            (ProtoType::Map { key, value: value_type }, ProtoFieldValue::Map(entries)) => {
                if entries.is_empty() {
                    continue;
                }
                let mut map = Map::new();
                // Duplicate keys keep the last entry, in first-seen position
                for (entry_key, entry_value) in entries {
                    map.insert(
                        render_map_key(key, entry_key),
                        render_value(schema, value_type, entry_value)?,
                    );
                }
                Value::Object(map)
            }
            (field_type, ProtoFieldValue::Repeated(values)) => {
                if values.is_empty() {
                    continue;
                }
                Value::Array(
                    values
                        .iter()
                        .map(|v| render_value(schema, field_type, v))
                        .collect::<Result<Vec<_>>>()?,
                )
            }
            (field_type, value) => {
                if !field.explicit_presence && value.is_default() {
                    continue;
                }
                render_value(schema, field_type, value)?
            }
        };

        object.insert(field.name.clone(), rendered);
    }

    Ok(Value::Object(object))
}

fn render_value(schema: &ProtoSchema, proto_type: &ProtoType, value: &ProtoFieldValue) -> Result<Value> {
    let rendered = match value {
        ProtoFieldValue::Double(v) => render_float(*v),
        // Shortest f32 text keeps 0.1f32 from printing as 0.10000000149011612
        ProtoFieldValue::Float(v) => render_float(v.to_string().parse::<f64>().unwrap_or(*v as f64)),
        ProtoFieldValue::Int32(v) => Value::from(*v),
        ProtoFieldValue::Int64(v) => Value::from(*v),
        ProtoFieldValue::Uint32(v) => Value::from(*v),
        ProtoFieldValue::Uint64(v) => Value::from(*v),
        ProtoFieldValue::Bool(v) => Value::Bool(*v),
        ProtoFieldValue::String(v) => Value::String(v.clone()),
        ProtoFieldValue::Bytes(v) => Value::String(STANDARD.encode(v)),
        ProtoFieldValue::Enum(number) => {
            let name = match proto_type {
                ProtoType::Enum(enum_name) => schema
                    .get_enum(enum_name)
                    .and_then(|e| e.name_of(*number)),
                _ => None,
            };
            match name {
                Some(name) => Value::String(name.to_string()),
                None => Value::from(*number),
            }
        }
        ProtoFieldValue::Message(nested) => {
            let descriptor = schema
                .get_message(&nested.message_type)
                .ok_or_else(|| Error::MessageTypeNotFound(nested.message_type.clone()))?;
            render_message(schema, descriptor, nested)?
        }
        ProtoFieldValue::Repeated(values) => Value::Array(
            values
                .iter()
                .map(|v| render_value(schema, proto_type, v))
                .collect::<Result<Vec<_>>>()?,
        ),
        ProtoFieldValue::Map(_) => {
            return Err(Error::ProtobufDecode(format!(
                "Unexpected map value for {proto_type}"
            )))
        }
    };
    Ok(rendered)
}

fn render_float(v: f64) -> Value {
    match Number::from_f64(v) {
        Some(n) => Value::Number(n),
        None if v.is_nan() => Value::String("NaN".to_string()),
        None if v > 0.0 => Value::String("Infinity".to_string()),
        None => Value::String("-Infinity".to_string()),
    }
}

fn render_map_key(key_type: &ProtoType, key: &ProtoFieldValue) -> String {
    match key {
        ProtoFieldValue::String(s) => s.clone(),
        ProtoFieldValue::Bool(b) => b.to_string(),
        ProtoFieldValue::Int32(v) => v.to_string(),
        ProtoFieldValue::Int64(v) => v.to_string(),
        ProtoFieldValue::Uint32(v) => v.to_string(),
        ProtoFieldValue::Uint64(v) => v.to_string(),
        other => format!("{other:?} ({key_type})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::from_string;
    use serde_json::json;

    const SCHEMA: &str = r#"
        syntax = "proto3";
        package iot;

        enum Unit {
            CELSIUS = 0;
            FAHRENHEIT = 1;
        }

        message Location {
            double lat = 1;
            double lng = 2;
        }

        message SensorReading {
            string deviceId = 1;
            string sensorType = 2;
            double value = 3;
            int64 timestamp = 4;
            repeated string tags = 5;
            Location location = 6;
            Unit unit = 7;
            map<int32, string> labels = 8;
            bytes payload = 9;
            optional bool calibrated = 10;
            float ratio = 11;
        }
    "#;

    fn reading(fields: Vec<(&str, ProtoFieldValue)>) -> ProtoMessage {
        let mut message = ProtoMessage::new("iot.SensorReading");
        for (name, value) in fields {
            message.fields.insert(name.to_string(), value);
        }
        message
    }

    #[test]
    fn test_renders_in_declaration_order() {
        let schema = from_string(SCHEMA).expect("Failed to parse proto");
        let message = reading(vec![
            ("timestamp", ProtoFieldValue::Int64(16700)),
            ("value", ProtoFieldValue::Double(22.5)),
            ("deviceId", ProtoFieldValue::String("123456".to_string())),
            ("sensorType", ProtoFieldValue::String("Temperature".to_string())),
        ]);

        let value = to_json(&schema, &message).unwrap();
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"deviceId":"123456","sensorType":"Temperature","value":22.5,"timestamp":16700}"#
        );
    }

    #[test]
    fn test_omits_defaults_but_keeps_explicit_presence() {
        let schema = from_string(SCHEMA).expect("Failed to parse proto");
        let message = reading(vec![
            ("deviceId", ProtoFieldValue::String(String::new())),
            ("timestamp", ProtoFieldValue::Int64(0)),
            ("tags", ProtoFieldValue::Repeated(vec![])),
            ("calibrated", ProtoFieldValue::Bool(false)),
            ("location", ProtoFieldValue::Message(Box::new(ProtoMessage::new("iot.Location")))),
        ]);

        let value = to_json(&schema, &message).unwrap();
        assert_eq!(value, json!({"location": {}, "calibrated": false}));
    }

    #[test]
    fn test_renders_enums_bytes_and_maps() {
        let schema = from_string(SCHEMA).expect("Failed to parse proto");
        let message = reading(vec![
            ("unit", ProtoFieldValue::Enum(1)),
            ("payload", ProtoFieldValue::Bytes(b"hello".to_vec())),
            (
                "labels",
                ProtoFieldValue::Map(vec![
                    (ProtoFieldValue::Int32(1), ProtoFieldValue::String("a".to_string())),
                    (ProtoFieldValue::Int32(2), ProtoFieldValue::String("b".to_string())),
                    (ProtoFieldValue::Int32(1), ProtoFieldValue::String("c".to_string())),
                ]),
            ),
        ]);

        let value = to_json(&schema, &message).unwrap();
        assert_eq!(
            value,
            json!({
                "unit": "FAHRENHEIT",
                "labels": {"1": "c", "2": "b"},
                "payload": "aGVsbG8="
            })
        );

        // Open enums keep numbers without a declared name
        let message = reading(vec![("unit", ProtoFieldValue::Enum(9))]);
        assert_eq!(to_json(&schema, &message).unwrap(), json!({"unit": 9}));
    }

    #[test]
    fn test_renders_floats() {
        let schema = from_string(SCHEMA).expect("Failed to parse proto");
        let message = reading(vec![
            ("value", ProtoFieldValue::Double(f64::NAN)),
            ("ratio", ProtoFieldValue::Float(0.1)),
        ]);
        assert_eq!(
            to_json(&schema, &message).unwrap(),
            json!({"value": "NaN", "ratio": 0.1})
        );

        let message = reading(vec![("value", ProtoFieldValue::Double(f64::NEG_INFINITY))]);
        assert_eq!(
            to_json(&schema, &message).unwrap(),
            json!({"value": "-Infinity"})
        );
    }
}
