//! Protobuf schema descriptors.
//!
//! Descriptors are built once when a `.proto` source is loaded and never
//! mutated afterwards. Field lookups by declared name and by number go
//! through fixed maps built in [`ProtoMessageDescriptor::new`].

use std::collections::HashMap;
use tracing::debug;

/// Protobuf field type enumeration.
///
/// Represents all protobuf scalar kinds plus the composite kinds the codec
/// understands. Message and enum variants carry the fully qualified type name
/// without a leading dot (e.g. "sensors.v1.Reading").
#[derive(Debug, Clone, PartialEq)]
pub enum ProtoType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Message(String),
    Enum(String),
    Map {
        key: Box<ProtoType>,
        value: Box<ProtoType>,
    },
}

impl std::fmt::Display for ProtoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

impl ProtoType {
    /// Get the human-readable type name.
    pub fn type_name(&self) -> String {
        match self {
            ProtoType::Double => "double".to_string(),
            ProtoType::Float => "float".to_string(),
            ProtoType::Int32 => "int32".to_string(),
            ProtoType::Int64 => "int64".to_string(),
            ProtoType::Uint32 => "uint32".to_string(),
            ProtoType::Uint64 => "uint64".to_string(),
            ProtoType::Sint32 => "sint32".to_string(),
            ProtoType::Sint64 => "sint64".to_string(),
            ProtoType::Fixed32 => "fixed32".to_string(),
            ProtoType::Fixed64 => "fixed64".to_string(),
            ProtoType::Sfixed32 => "sfixed32".to_string(),
            ProtoType::Sfixed64 => "sfixed64".to_string(),
            ProtoType::Bool => "bool".to_string(),
            ProtoType::String => "string".to_string(),
            ProtoType::Bytes => "bytes".to_string(),
            ProtoType::Message(name) => format!("message:{name}"),
            ProtoType::Enum(name) => format!("enum:{name}"),
            ProtoType::Map { key, value } => {
                format!("map<{}, {}>", key.type_name(), value.type_name())
            }
        }
    }

    /// Wire type used for a single, unpacked value of this type.
    pub fn wire_type(&self) -> WireType {
        match self {
            ProtoType::Int32
            | ProtoType::Int64
            | ProtoType::Uint32
            | ProtoType::Uint64
            | ProtoType::Sint32
            | ProtoType::Sint64
            | ProtoType::Bool
            | ProtoType::Enum(_) => WireType::Varint,
            ProtoType::Double | ProtoType::Fixed64 | ProtoType::Sfixed64 => WireType::Fixed64,
            ProtoType::Float | ProtoType::Fixed32 | ProtoType::Sfixed32 => WireType::Fixed32,
            ProtoType::String | ProtoType::Bytes | ProtoType::Message(_) | ProtoType::Map { .. } => {
                WireType::LengthDelimited
            }
        }
    }

    /// Whether repeated values of this type may use packed encoding.
    pub fn is_packable(&self) -> bool {
        matches!(
            self.wire_type(),
            WireType::Varint | WireType::Fixed64 | WireType::Fixed32
        )
    }

    /// Whether this is one of the integer kinds.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ProtoType::Int32
                | ProtoType::Int64
                | ProtoType::Uint32
                | ProtoType::Uint64
                | ProtoType::Sint32
                | ProtoType::Sint64
                | ProtoType::Fixed32
                | ProtoType::Fixed64
                | ProtoType::Sfixed32
                | ProtoType::Sfixed64
        )
    }

    /// Inclusive value range of an integer kind.
    pub fn integer_range(&self) -> Option<(i128, i128)> {
        match self {
            ProtoType::Int32 | ProtoType::Sint32 | ProtoType::Sfixed32 => {
                Some((i32::MIN as i128, i32::MAX as i128))
            }
            ProtoType::Int64 | ProtoType::Sint64 | ProtoType::Sfixed64 => {
                Some((i64::MIN as i128, i64::MAX as i128))
            }
            ProtoType::Uint32 | ProtoType::Fixed32 => Some((0, u32::MAX as i128)),
            ProtoType::Uint64 | ProtoType::Fixed64 => Some((0, u64::MAX as i128)),
            _ => None,
        }
    }
}

/// Protobuf wire types.
///
/// Tag = (field_number << 3) | wire_type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl WireType {
    /// Split a raw tag into its field number and wire type.
    ///
    /// Returns `None` for the undefined wire types 6 and 7.
    pub fn from_tag(tag: u32) -> Option<(u32, WireType)> {
        let wire_type = match tag & 0x7 {
            0 => WireType::Varint,
            1 => WireType::Fixed64,
            2 => WireType::LengthDelimited,
            3 => WireType::StartGroup,
            4 => WireType::EndGroup,
            5 => WireType::Fixed32,
            _ => return None,
        };
        Some((tag >> 3, wire_type))
    }

    /// Build the raw tag for a field number.
    pub fn tag(self, field_number: u32) -> u32 {
        (field_number << 3) | self as u32
    }
}

/// Whether a field holds one value or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Singular,
    Repeated,
}

/// Describes a single field in a protobuf message.
#[derive(Debug, Clone)]
pub struct ProtoFieldDescriptor {
    /// Field name as declared in the .proto source
    pub name: String,
    /// Field number (tag)
    pub number: u32,
    /// Field type
    pub field_type: ProtoType,
    /// Singular or repeated (map fields are repeated)
    pub cardinality: Cardinality,
    /// Whether repeated values are written as one packed run
    pub packed: bool,
    /// proto2 `required`
    pub required: bool,
    /// Whether a default value is still written and rendered when present
    ///
    /// True for proto3 `optional`, proto2 optional, oneof members and
    /// message-typed fields.
    pub explicit_presence: bool,
    /// Name of the enclosing oneof, if any
    pub oneof: Option<String>,
}

impl ProtoFieldDescriptor {
    /// Whether the field is repeated (including map fields)
    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    /// Whether the field is a map field
    pub fn is_map(&self) -> bool {
        matches!(self.field_type, ProtoType::Map { .. })
    }
}

/// Describes a protobuf message type (schema).
#[derive(Debug, Clone)]
pub struct ProtoMessageDescriptor {
    /// Fully qualified message name (e.g., "mypackage.MyMessage")
    pub name: String,
    /// Map of field names to their descriptors
    pub fields: HashMap<String, ProtoFieldDescriptor>,
    /// Ordered list of field names (preserves proto definition order)
    pub field_order: Vec<String>,
    by_number: HashMap<u32, String>,
}

impl ProtoMessageDescriptor {
    /// Build a descriptor from fields in declaration order.
    pub fn new(name: impl Into<String>, fields: Vec<ProtoFieldDescriptor>) -> Self {
        let mut by_name = HashMap::with_capacity(fields.len());
        let mut field_order = Vec::with_capacity(fields.len());
        let mut by_number = HashMap::with_capacity(fields.len());

        for field in fields {
            field_order.push(field.name.clone());
            by_number.insert(field.number, field.name.clone());
            by_name.insert(field.name.clone(), field);
        }

        Self {
            name: name.into(),
            fields: by_name,
            field_order,
            by_number,
        }
    }

    /// Get a field descriptor by its declared name.
    pub fn get_field(&self, name: &str) -> Option<&ProtoFieldDescriptor> {
        self.fields.get(name)
    }

    /// Get a field descriptor by field number.
    pub fn field_by_number(&self, number: u32) -> Option<&ProtoFieldDescriptor> {
        self.by_number
            .get(&number)
            .and_then(|name| self.fields.get(name))
    }

    /// List all field names in definition order.
    pub fn list_fields(&self) -> &[String] {
        &self.field_order
    }

    /// Field descriptors in definition order.
    pub fn fields_in_order(&self) -> impl Iterator<Item = &ProtoFieldDescriptor> {
        self.field_order
            .iter()
            .filter_map(move |name| self.fields.get(name))
    }

    /// The other members of the oneof `field_name` belongs to.
    ///
    /// Empty when the field is not part of a oneof.
    pub fn oneof_siblings<'a>(
        &'a self,
        field_name: &'a str,
    ) -> impl Iterator<Item = &'a ProtoFieldDescriptor> + 'a {
        let oneof = self.get_field(field_name).and_then(|f| f.oneof.as_deref());
        self.fields_in_order().filter(move |f| {
            oneof.is_some() && f.oneof.as_deref() == oneof && f.name != field_name
        })
    }

    /// Field descriptors in ascending field-number order (wire order).
    pub fn fields_by_number(&self) -> Vec<&ProtoFieldDescriptor> {
        let mut fields: Vec<_> = self.fields.values().collect();
        fields.sort_by_key(|f| f.number);
        fields
    }

    /// The short (unqualified) message name.
    pub fn simple_name(&self) -> &str {
        simple_name(&self.name)
    }
}

/// Describes a protobuf enum type.
#[derive(Debug, Clone)]
pub struct ProtoEnumDescriptor {
    /// Fully qualified enum name
    pub name: String,
    /// Value names and numbers in definition order
    pub values: Vec<(String, i32)>,
    by_name: HashMap<String, i32>,
    by_number: HashMap<i32, String>,
}

impl ProtoEnumDescriptor {
    pub fn new(name: impl Into<String>, values: Vec<(String, i32)>) -> Self {
        let mut by_name = HashMap::with_capacity(values.len());
        let mut by_number = HashMap::with_capacity(values.len());
        for (value_name, number) in &values {
            by_name.insert(value_name.clone(), *number);
            // With allow_alias the first declared name is canonical
            by_number.entry(*number).or_insert_with(|| value_name.clone());
        }
        Self {
            name: name.into(),
            values,
            by_name,
            by_number,
        }
    }

    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.by_number.get(&number).map(String::as_str)
    }
}

/// Represents a parsed protobuf schema containing multiple message types.
///
/// Immutable once built; share it across threads behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ProtoSchema {
    /// Map of fully qualified message names to their descriptors
    pub messages: HashMap<String, ProtoMessageDescriptor>,
    /// Map of fully qualified enum names to their descriptors
    pub enums: HashMap<String, ProtoEnumDescriptor>,
    /// Simple name to fully qualified name, only for unambiguous simple names
    simple_names: HashMap<String, String>,
}

impl ProtoSchema {
    pub fn new(messages: Vec<ProtoMessageDescriptor>, enums: Vec<ProtoEnumDescriptor>) -> Self {
        let mut simple_counts: HashMap<String, Vec<String>> = HashMap::new();
        for message in &messages {
            simple_counts
                .entry(message.simple_name().to_string())
                .or_default()
                .push(message.name.clone());
        }

        let mut simple_names = HashMap::new();
        for (simple, mut full_names) in simple_counts {
            if full_names.len() == 1 {
                if let Some(full) = full_names.pop() {
                    simple_names.insert(simple, full);
                }
            } else {
                debug!(
                    "Simple message name '{}' is ambiguous ({} candidates), only qualified lookups will match",
                    simple,
                    full_names.len()
                );
            }
        }

        Self {
            messages: messages.into_iter().map(|m| (m.name.clone(), m)).collect(),
            enums: enums.into_iter().map(|e| (e.name.clone(), e)).collect(),
            simple_names,
        }
    }

    /// Get a message descriptor by name.
    ///
    /// Accepts a fully qualified name with or without a leading dot, or a
    /// simple name when it is unambiguous within the schema.
    pub fn get_message(&self, name: &str) -> Option<&ProtoMessageDescriptor> {
        let name = name.strip_prefix('.').unwrap_or(name);
        self.messages.get(name).or_else(|| {
            self.simple_names
                .get(name)
                .and_then(|full| self.messages.get(full))
        })
    }

    /// Get an enum descriptor by fully qualified name.
    pub fn get_enum(&self, name: &str) -> Option<&ProtoEnumDescriptor> {
        let name = name.strip_prefix('.').unwrap_or(name);
        self.enums.get(name)
    }

    /// List all message type names in the schema.
    pub fn list_messages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.messages.keys().cloned().collect();
        names.sort();
        names
    }
}

fn simple_name(full: &str) -> &str {
    full.rsplit('.').next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, number: u32, field_type: ProtoType) -> ProtoFieldDescriptor {
        ProtoFieldDescriptor {
            name: name.to_string(),
            number,
            field_type,
            cardinality: Cardinality::Singular,
            packed: false,
            required: false,
            explicit_presence: false,
            oneof: None,
        }
    }

    #[test]
    fn test_proto_type_display() {
        assert_eq!(ProtoType::String.to_string(), "string");
        assert_eq!(ProtoType::Int64.to_string(), "int64");
        assert_eq!(ProtoType::Bool.to_string(), "bool");
        assert_eq!(
            ProtoType::Message("geo.Point".to_string()).to_string(),
            "message:geo.Point"
        );
        assert_eq!(
            ProtoType::Enum("Status".to_string()).to_string(),
            "enum:Status"
        );
        assert_eq!(
            ProtoType::Map {
                key: Box::new(ProtoType::String),
                value: Box::new(ProtoType::Int32),
            }
            .to_string(),
            "map<string, int32>"
        );
    }

    #[test]
    fn test_wire_types() {
        assert_eq!(ProtoType::Int64.wire_type(), WireType::Varint);
        assert_eq!(ProtoType::Sint32.wire_type(), WireType::Varint);
        assert_eq!(ProtoType::Double.wire_type(), WireType::Fixed64);
        assert_eq!(ProtoType::Sfixed32.wire_type(), WireType::Fixed32);
        assert_eq!(ProtoType::String.wire_type(), WireType::LengthDelimited);
        assert_eq!(
            ProtoType::Message("A".to_string()).wire_type(),
            WireType::LengthDelimited
        );

        assert!(ProtoType::Bool.is_packable());
        assert!(ProtoType::Enum("E".to_string()).is_packable());
        assert!(!ProtoType::String.is_packable());
        assert!(!ProtoType::Bytes.is_packable());
    }

    #[test]
    fn test_wire_type_from_tag() {
        assert_eq!(WireType::from_tag(0x08), Some((1, WireType::Varint)));
        assert_eq!(WireType::from_tag(0x1a), Some((3, WireType::LengthDelimited)));
        assert_eq!(WireType::from_tag(0x21), Some((4, WireType::Fixed64)));
        assert_eq!(WireType::from_tag(0x0e), None);
        assert_eq!(WireType::LengthDelimited.tag(2), 0x12);
    }

    #[test]
    fn test_integer_ranges() {
        assert_eq!(
            ProtoType::Uint32.integer_range(),
            Some((0, u32::MAX as i128))
        );
        assert_eq!(
            ProtoType::Sfixed64.integer_range(),
            Some((i64::MIN as i128, i64::MAX as i128))
        );
        assert_eq!(ProtoType::Double.integer_range(), None);
    }

    #[test]
    fn test_message_field_lookups() {
        let device_id = field("device_id", 1, ProtoType::String);
        let descriptor = ProtoMessageDescriptor::new(
            "iot.Reading",
            vec![
                field("value", 3, ProtoType::Double),
                device_id,
                field("timestamp", 2, ProtoType::Int64),
            ],
        );

        assert_eq!(descriptor.simple_name(), "Reading");
        assert_eq!(descriptor.get_field("device_id").unwrap().number, 1);
        // Only declared names resolve
        assert!(descriptor.get_field("deviceId").is_none());
        assert!(descriptor.get_field("missing").is_none());
        assert_eq!(descriptor.field_by_number(2).unwrap().name, "timestamp");
        assert!(descriptor.field_by_number(9).is_none());

        assert_eq!(descriptor.list_fields(), &["value", "device_id", "timestamp"]);
        let wire_order: Vec<u32> = descriptor
            .fields_by_number()
            .iter()
            .map(|f| f.number)
            .collect();
        assert_eq!(wire_order, vec![1, 2, 3]);
    }

    #[test]
    fn test_oneof_siblings() {
        let mut gateway = field("gateway", 1, ProtoType::String);
        gateway.oneof = Some("source".to_string());
        let mut channel = field("channel", 2, ProtoType::Uint32);
        channel.oneof = Some("source".to_string());
        let descriptor = ProtoMessageDescriptor::new(
            "Uplink",
            vec![gateway, channel, field("rssi", 3, ProtoType::Int32)],
        );

        let siblings: Vec<&str> = descriptor
            .oneof_siblings("gateway")
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(siblings, vec!["channel"]);
        assert_eq!(descriptor.oneof_siblings("rssi").count(), 0);
        assert_eq!(descriptor.oneof_siblings("missing").count(), 0);
    }

    #[test]
    fn test_enum_aliases() {
        let status = ProtoEnumDescriptor::new(
            "Status",
            vec![
                ("UNKNOWN".to_string(), 0),
                ("STARTED".to_string(), 1),
                ("RUNNING".to_string(), 1),
            ],
        );
        assert_eq!(status.number_of("RUNNING"), Some(1));
        assert_eq!(status.name_of(1), Some("STARTED"));
        assert_eq!(status.name_of(7), None);
    }

    #[test]
    fn test_schema_lookup_by_simple_and_qualified_name() {
        let schema = ProtoSchema::new(
            vec![
                ProtoMessageDescriptor::new("a.v1.Event", vec![]),
                ProtoMessageDescriptor::new("b.v1.Event", vec![]),
                ProtoMessageDescriptor::new("a.v1.Sensor", vec![]),
            ],
            vec![],
        );

        assert!(schema.get_message("a.v1.Event").is_some());
        assert!(schema.get_message(".b.v1.Event").is_some());
        assert_eq!(schema.get_message("Sensor").unwrap().name, "a.v1.Sensor");
        // Ambiguous simple names only resolve when qualified
        assert!(schema.get_message("Event").is_none());
        assert_eq!(
            schema.list_messages(),
            vec!["a.v1.Event", "a.v1.Sensor", "b.v1.Event"]
        );
    }
}
