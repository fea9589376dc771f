//! Protobuf encoder for verified JSON values.
//!
//! The encoding follows proto3 wire format:
//! - Each field is encoded as (tag, value) pairs
//! - Tag = (field_number << 3) | wire_type
//! - Wire types: 0=varint, 1=64-bit, 2=length-delimited, 5=32-bit
//!
//! Values are expected to have passed the verifier; anything the verifier
//! would have rejected surfaces here as `Error::ProtobufEncode`.

use crate::error::{Error, Result};
use crate::scalar::{coerce, coerce_map_key, Scalar};
use proto_types::{ProtoFieldDescriptor, ProtoMessageDescriptor, ProtoSchema, ProtoType};
use protobuf::CodedOutputStream;
use serde_json::{Map, Value};

/// Writes JSON values as protobuf wire bytes.
pub struct Encoder<'a> {
    schema: &'a ProtoSchema,
}

impl<'a> Encoder<'a> {
    pub fn new(schema: &'a ProtoSchema) -> Self {
        Self { schema }
    }

    /// Encode `value` as a message of type `descriptor`.
    pub fn encode(&self, descriptor: &ProtoMessageDescriptor, value: &Value) -> Result<Vec<u8>> {
        match value {
            Value::Object(object) => self.encode_message(descriptor, object),
            _ => Err(Error::ProtobufEncode(format!(
                "{} must be encoded from a JSON object",
                descriptor.name
            ))),
        }
    }

    fn encode_message(
        &self,
        descriptor: &ProtoMessageDescriptor,
        object: &Map<String, Value>,
    ) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        {
            let mut stream = CodedOutputStream::vec(&mut buffer);

            // Wire order is ascending field number, independent of key order
            for field in descriptor.fields_by_number() {
                if let Some(value) = field_value(object, field) {
                    self.encode_field(&mut stream, field, value)?;
                }
            }

            stream
                .flush()
                .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
        }

        Ok(buffer)
    }

    fn encode_field(
        &self,
        stream: &mut CodedOutputStream,
        field: &ProtoFieldDescriptor,
        value: &Value,
    ) -> Result<()> {
        if let ProtoType::Map { key, value: value_type } = &field.field_type {
            let entries = value.as_object().ok_or_else(|| {
                Error::ProtobufEncode(format!("map field {} must be an object", field.name))
            })?;
            for (entry_key, entry_value) in entries {
                let entry = self.encode_map_entry(key, value_type, entry_key, entry_value)?;
                stream
                    .write_bytes(field.number, &entry)
                    .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
            }
            return Ok(());
        }

        if field.is_repeated() {
            let items = value.as_array().ok_or_else(|| {
                Error::ProtobufEncode(format!("repeated field {} must be an array", field.name))
            })?;

            if field.packed {
                if items.is_empty() {
                    return Ok(());
                }
                // Packed: one length-delimited run of untagged values
                let mut payload = Vec::new();
                {
                    let mut packed = CodedOutputStream::vec(&mut payload);
                    for item in items {
                        let scalar = self.coerce(&field.field_type, item)?;
                        write_untagged(&mut packed, &field.field_type, &scalar)?;
                    }
                    packed
                        .flush()
                        .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
                }
                stream
                    .write_bytes(field.number, &payload)
                    .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
            } else {
                for item in items {
                    self.encode_single(stream, field.number, &field.field_type, item)?;
                }
            }
            return Ok(());
        }

        if let ProtoType::Message(_) = field.field_type {
            return self.encode_single(stream, field.number, &field.field_type, value);
        }

        let scalar = self.coerce(&field.field_type, value)?;
        // proto3 implicit presence: default values are not written
        if !field.explicit_presence && is_default(&scalar) {
            return Ok(());
        }
        write_scalar(stream, field.number, &field.field_type, &scalar)
    }

    fn encode_single(
        &self,
        stream: &mut CodedOutputStream,
        field_number: u32,
        proto_type: &ProtoType,
        value: &Value,
    ) -> Result<()> {
        match proto_type {
            ProtoType::Message(type_name) => {
                let nested = self
                    .schema
                    .get_message(type_name)
                    .ok_or_else(|| Error::MessageTypeNotFound(type_name.clone()))?;
                let bytes = self.encode(nested, value)?;
                stream
                    .write_bytes(field_number, &bytes)
                    .map_err(|e| Error::ProtobufEncode(e.to_string()))
            }
            scalar_type => {
                let scalar = self.coerce(scalar_type, value)?;
                write_scalar(stream, field_number, scalar_type, &scalar)
            }
        }
    }

    /// Map entries are nested messages with key = 1 and value = 2.
    fn encode_map_entry(
        &self,
        key_type: &ProtoType,
        value_type: &ProtoType,
        key: &str,
        value: &Value,
    ) -> Result<Vec<u8>> {
        let key_scalar = coerce_map_key(key_type, key)
            .map_err(|m| Error::ProtobufEncode(format!("map key \"{key}\": {}", m.actual)))?;

        let mut entry = Vec::new();
        {
            let mut stream = CodedOutputStream::vec(&mut entry);
            write_scalar(&mut stream, 1, key_type, &key_scalar)?;
            self.encode_single(&mut stream, 2, value_type, value)?;
            stream
                .flush()
                .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
        }
        Ok(entry)
    }

    fn coerce<'v>(&self, proto_type: &ProtoType, value: &'v Value) -> Result<Scalar<'v>> {
        coerce(self.schema, proto_type, value).map_err(|m| {
            Error::ProtobufEncode(format!("expected {}, got {}", m.expected, m.actual))
        })
    }
}

/// The present, non-null value for `field`.
fn field_value<'v>(object: &'v Map<String, Value>, field: &ProtoFieldDescriptor) -> Option<&'v Value> {
    object.get(&field.name).filter(|v| !v.is_null())
}

fn is_default(scalar: &Scalar) -> bool {
    match scalar {
        Scalar::Double(v) => *v == 0.0 && !v.is_sign_negative(),
        Scalar::Float(v) => *v == 0.0 && !v.is_sign_negative(),
        Scalar::Integer(v) => *v == 0,
        Scalar::Bool(v) => !*v,
        Scalar::String(v) => v.is_empty(),
        Scalar::Bytes(v) => v.is_empty(),
        Scalar::Enum(v) => *v == 0,
    }
}

fn write_scalar(
    stream: &mut CodedOutputStream,
    field_number: u32,
    proto_type: &ProtoType,
    scalar: &Scalar,
) -> Result<()> {
    match scalar {
        Scalar::String(s) => stream
            .write_string(field_number, s)
            .map_err(|e| Error::ProtobufEncode(e.to_string())),
        Scalar::Bytes(b) => stream
            .write_bytes(field_number, b)
            .map_err(|e| Error::ProtobufEncode(e.to_string())),
        _ => {
            stream
                .write_raw_varint32(proto_type.wire_type().tag(field_number))
                .map_err(|e| Error::ProtobufEncode(e.to_string()))?;
            write_untagged(stream, proto_type, scalar)
        }
    }
}

/// Write a varint or fixed-width value without its tag.
fn write_untagged(stream: &mut CodedOutputStream, proto_type: &ProtoType, scalar: &Scalar) -> Result<()> {
    let written = match (proto_type, scalar) {
        (ProtoType::Double, Scalar::Double(v)) => stream.write_double_no_tag(*v),
        (ProtoType::Float, Scalar::Float(v)) => stream.write_float_no_tag(*v),
        (ProtoType::Bool, Scalar::Bool(v)) => stream.write_bool_no_tag(*v),
        // Enums share int32's sign-extended varint encoding
        (ProtoType::Enum(_), Scalar::Enum(v)) => stream.write_int32_no_tag(*v),
        (ProtoType::Int32, Scalar::Integer(v)) => stream.write_int32_no_tag(*v as i32),
        (ProtoType::Int64, Scalar::Integer(v)) => stream.write_int64_no_tag(*v as i64),
        (ProtoType::Uint32, Scalar::Integer(v)) => stream.write_uint32_no_tag(*v as u32),
        (ProtoType::Uint64, Scalar::Integer(v)) => stream.write_uint64_no_tag(*v as u64),
        (ProtoType::Sint32, Scalar::Integer(v)) => stream.write_sint32_no_tag(*v as i32),
        (ProtoType::Sint64, Scalar::Integer(v)) => stream.write_sint64_no_tag(*v as i64),
        (ProtoType::Fixed32, Scalar::Integer(v)) => stream.write_fixed32_no_tag(*v as u32),
        (ProtoType::Fixed64, Scalar::Integer(v)) => stream.write_fixed64_no_tag(*v as u64),
        (ProtoType::Sfixed32, Scalar::Integer(v)) => stream.write_sfixed32_no_tag(*v as i32),
        (ProtoType::Sfixed64, Scalar::Integer(v)) => stream.write_sfixed64_no_tag(*v as i64),
        (proto_type, scalar) => {
            return Err(Error::ProtobufEncode(format!(
                "cannot write {scalar:?} as {proto_type}"
            )))
        }
    };
    written.map_err(|e| Error::ProtobufEncode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{from_string, resolve};
    use protobuf::CodedInputStream;
    use serde_json::json;

    fn encode(proto: &str, message: &str, value: Value) -> Result<Vec<u8>> {
        let schema = from_string(proto).expect("Failed to parse proto");
        let descriptor = resolve(&schema, message).unwrap();
        Encoder::new(&schema).encode(descriptor, &value)
    }

    const READING: &str = r#"
        syntax = "proto3";

        message SensorReading {
            string deviceId = 1;
            string sensorType = 2;
            double value = 3;
            int64 timestamp = 4;
        }
    "#;

    #[test]
    fn test_encode_sensor_reading_bytes() {
        let encoded = encode(
            READING,
            "SensorReading",
            json!({
                "deviceId": "123456",
                "sensorType": "Temperature",
                "value": 22.5,
                "timestamp": 16700
            }),
        )
        .unwrap();

        let mut expected = vec![0x0a, 0x06];
        expected.extend_from_slice(b"123456");
        expected.extend_from_slice(&[0x12, 0x0b]);
        expected.extend_from_slice(b"Temperature");
        expected.push(0x19);
        expected.extend_from_slice(&22.5f64.to_le_bytes());
        // 16700 = 0xBC 0x82 0x01 as a varint
        expected.extend_from_slice(&[0x20, 0xbc, 0x82, 0x01]);

        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_encode_orders_by_field_number() {
        let forward = encode(
            READING,
            "SensorReading",
            json!({"deviceId": "a", "timestamp": 1}),
        )
        .unwrap();
        let reversed = encode(
            READING,
            "SensorReading",
            json!({"timestamp": 1, "deviceId": "a"}),
        )
        .unwrap();
        assert_eq!(forward, reversed);
        assert_eq!(forward, vec![0x0a, 0x01, b'a', 0x20, 0x01]);
    }

    #[test]
    fn test_encode_skips_defaults_and_nulls() {
        let encoded = encode(
            READING,
            "SensorReading",
            json!({"deviceId": "", "value": 0.0, "timestamp": 0, "sensorType": null}),
        )
        .unwrap();
        assert!(encoded.is_empty());
    }

    #[test]
    fn test_encode_explicit_presence_keeps_defaults() {
        let proto = r#"
            syntax = "proto3";
            message Flags {
                optional bool enabled = 1;
                bool implicit = 2;
            }
        "#;
        let encoded = encode(proto, "Flags", json!({"enabled": false, "implicit": false})).unwrap();
        assert_eq!(encoded, vec![0x08, 0x00]);
    }

    #[test]
    fn test_encode_packed_and_unpacked_repeated() {
        let proto = r#"
            syntax = "proto3";
            message Series {
                repeated int32 samples = 1;
                repeated int32 legacy = 2 [packed = false];
                repeated string labels = 3;
            }
        "#;
        let encoded = encode(
            proto,
            "Series",
            json!({"samples": [1, 2, 300], "legacy": [5, 6], "labels": ["x", "y"]}),
        )
        .unwrap();

        assert_eq!(
            encoded,
            vec![
                0x0a, 0x04, 0x01, 0x02, 0xac, 0x02, // packed samples
                0x10, 0x05, 0x10, 0x06, // unpacked legacy
                0x1a, 0x01, b'x', 0x1a, 0x01, b'y', // labels
            ]
        );

        let empty = encode(proto, "Series", json!({"samples": []})).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_encode_nested_message() {
        let proto = r#"
            syntax = "proto3";
            message Point {
                int32 x = 1;
                int32 y = 2;
            }
            message Shape {
                Point origin = 1;
                Point corner = 2;
            }
        "#;
        let encoded = encode(
            proto,
            "Shape",
            json!({"origin": {"x": 1, "y": 2}, "corner": {}}),
        )
        .unwrap();
        assert_eq!(encoded, vec![0x0a, 0x04, 0x08, 0x01, 0x10, 0x02, 0x12, 0x00]);
    }

    #[test]
    fn test_encode_zigzag_and_fixed() {
        let proto = r#"
            syntax = "proto3";
            message Mixed {
                sint32 delta = 1;
                fixed32 checksum = 2;
                sfixed64 offset = 3;
                float ratio = 4;
            }
        "#;
        let encoded = encode(
            proto,
            "Mixed",
            json!({"delta": -2, "checksum": 1, "offset": -1, "ratio": 1.5}),
        )
        .unwrap();

        let mut stream = CodedInputStream::from_bytes(&encoded);
        assert_eq!(stream.read_raw_varint32().unwrap(), 0x08);
        assert_eq!(stream.read_sint32().unwrap(), -2);
        assert_eq!(stream.read_raw_varint32().unwrap(), 0x15);
        assert_eq!(stream.read_fixed32().unwrap(), 1);
        assert_eq!(stream.read_raw_varint32().unwrap(), 0x19);
        assert_eq!(stream.read_sfixed64().unwrap(), -1);
        assert_eq!(stream.read_raw_varint32().unwrap(), 0x25);
        assert_eq!(stream.read_float().unwrap(), 1.5);
        assert!(stream.eof().unwrap());
    }

    #[test]
    fn test_encode_map_and_enum() {
        let proto = r#"
            syntax = "proto3";
            enum Level {
                LOW = 0;
                HIGH = 1;
            }
            message Alarm {
                Level level = 1;
                map<string, int32> counts = 2;
            }
        "#;
        let encoded = encode(
            proto,
            "Alarm",
            json!({"level": "HIGH", "counts": {"a": 3}}),
        )
        .unwrap();
        assert_eq!(
            encoded,
            vec![0x08, 0x01, 0x12, 0x05, 0x0a, 0x01, b'a', 0x10, 0x03]
        );
    }

    #[test]
    fn test_encode_guards_unverified_values() {
        let result = encode(READING, "SensorReading", json!({"deviceId": 123}));
        assert!(matches!(result, Err(Error::ProtobufEncode(_))));

        let result = encode(READING, "SensorReading", json!("not an object"));
        assert!(matches!(result, Err(Error::ProtobufEncode(_))));
    }
}
