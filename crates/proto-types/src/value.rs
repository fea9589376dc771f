//! Decoded protobuf values.
//!
//! These types are the runtime representation of a message after the wire
//! bytes have been read but before it is rendered as JSON.

use crate::schema::ProtoSchema;
use std::collections::HashMap;

/// Represents a field value in a decoded protobuf message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtoFieldValue {
    Double(f64),
    Float(f32),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    /// Enum number, which may not name a declared value (proto3 enums are open)
    Enum(i32),
    Message(Box<ProtoMessage>),
    Repeated(Vec<ProtoFieldValue>),
    /// Map entries in wire order; a later duplicate key replaces an earlier one
    Map(Vec<(ProtoFieldValue, ProtoFieldValue)>),
}

impl ProtoFieldValue {
    /// Whether this is the proto3 implicit default for its kind.
    ///
    /// Messages are never defaults: a present message field is rendered even
    /// when all of its own fields are absent.
    pub fn is_default(&self) -> bool {
        match self {
            ProtoFieldValue::Double(v) => *v == 0.0 && !v.is_sign_negative(),
            ProtoFieldValue::Float(v) => *v == 0.0 && !v.is_sign_negative(),
            ProtoFieldValue::Int32(v) => *v == 0,
            ProtoFieldValue::Int64(v) => *v == 0,
            ProtoFieldValue::Uint32(v) => *v == 0,
            ProtoFieldValue::Uint64(v) => *v == 0,
            ProtoFieldValue::Bool(v) => !*v,
            ProtoFieldValue::String(v) => v.is_empty(),
            ProtoFieldValue::Bytes(v) => v.is_empty(),
            ProtoFieldValue::Enum(v) => *v == 0,
            ProtoFieldValue::Message(_) => false,
            ProtoFieldValue::Repeated(values) => values.is_empty(),
            ProtoFieldValue::Map(entries) => entries.is_empty(),
        }
    }
}

/// Represents a decoded protobuf message.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtoMessage {
    /// Message type name (e.g., "mypackage.MyMessage")
    pub message_type: String,
    /// Decoded field values by field name
    pub fields: HashMap<String, ProtoFieldValue>,
}

impl ProtoMessage {
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            fields: HashMap::new(),
        }
    }

    /// Merge another instance of the same message type into this one.
    ///
    /// Scalars: last value wins. Embedded messages: recursive merge.
    /// Repeated and map fields: append. A field that belongs to a oneof
    /// clears the other members of that oneof, looked up in `schema`.
    pub fn merge_from(&mut self, other: ProtoMessage, schema: &ProtoSchema) {
        let descriptor = schema.get_message(&self.message_type);

        for (name, incoming) in other.fields {
            if let Some(descriptor) = descriptor {
                for sibling in descriptor.oneof_siblings(&name) {
                    self.fields.remove(&sibling.name);
                }
            }

            let Some(existing) = self.fields.get_mut(&name) else {
                self.fields.insert(name, incoming);
                continue;
            };
            match (existing, incoming) {
                (ProtoFieldValue::Message(existing), ProtoFieldValue::Message(incoming)) => {
                    existing.merge_from(*incoming, schema);
                }
                (ProtoFieldValue::Repeated(existing), ProtoFieldValue::Repeated(incoming)) => {
                    existing.extend(incoming);
                }
                (ProtoFieldValue::Map(existing), ProtoFieldValue::Map(incoming)) => {
                    existing.extend(incoming);
                }
                (existing, incoming) => *existing = incoming,
            }
        }
    }
}
