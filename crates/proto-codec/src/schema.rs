//! Schema registry: parses `.proto` sources into [`ProtoSchema`] handles.
//!
//! Parsing is done at runtime with `protobuf-parse` (pure Rust parser, no
//! `protoc` needed). The resulting handle is immutable and can be shared
//! across threads.

use crate::error::{Error, Result};
use proto_types::{
    Cardinality, ProtoEnumDescriptor, ProtoFieldDescriptor, ProtoMessageDescriptor, ProtoSchema,
    ProtoType,
};
use protobuf::descriptor::field_descriptor_proto::{Label, Type};
use protobuf::descriptor::{DescriptorProto, EnumDescriptorProto, FieldDescriptorProto};
use protobuf_parse::Parser;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared, immutable reference to a loaded schema.
pub type SchemaHandle = Arc<ProtoSchema>;

/// Parse a .proto file and create a schema handle.
pub fn load<P: AsRef<Path>>(path: P) -> Result<SchemaHandle> {
    let p = std::fs::canonicalize(path.as_ref())
        .map_err(|e| Error::SchemaLoad(format!("{}: {e}", path.as_ref().display())))?;

    let mut parser = Parser::new();
    parser.input(&p);

    // Sibling imports resolve against the schema's own directory
    if let Some(parent) = p.parent() {
        parser.include(parent);
    }

    let parsed = parser
        .parse_and_typecheck()
        .map_err(|e| Error::SchemaLoad(format!("{}: {e:#}", p.display())))?;

    let mut builder = SchemaBuilder::default();
    for file_descriptor in &parsed.file_descriptors {
        let proto3 = file_descriptor.syntax.as_deref() == Some("proto3");
        let package = file_descriptor.package.clone().unwrap_or_default();

        for enum_type in &file_descriptor.enum_type {
            builder.add_enum(&package, enum_type);
        }
        for message in &file_descriptor.message_type {
            builder.add_message(&package, message, proto3)?;
        }
    }

    let schema = builder.build();
    info!(
        "Loaded protobuf schema {} with {} message types and {} enums",
        p.display(),
        schema.messages.len(),
        schema.enums.len()
    );
    Ok(Arc::new(schema))
}

/// Parse a .proto file content from string
pub fn from_string(content: &str) -> Result<SchemaHandle> {
    use std::io::Write;

    // Write content to a temporary file
    let mut temp_file = tempfile::Builder::new()
        .suffix(".proto")
        .tempfile()
        .map_err(|e| Error::SchemaLoad(format!("Failed to create temp file: {e}")))?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| Error::SchemaLoad(format!("Failed to write temp file: {e}")))?;

    load(temp_file.path())
}

/// Look up a message type by name.
pub fn resolve<'a>(schema: &'a ProtoSchema, type_name: &str) -> Result<&'a ProtoMessageDescriptor> {
    schema
        .get_message(type_name)
        .ok_or_else(|| Error::MessageTypeNotFound(type_name.to_string()))
}

#[derive(Default)]
struct SchemaBuilder {
    messages: Vec<ProtoMessageDescriptor>,
    enums: Vec<ProtoEnumDescriptor>,
}

impl SchemaBuilder {
    fn add_enum(&mut self, scope: &str, enum_type: &EnumDescriptorProto) {
        let name = qualify(scope, enum_type.name());
        let values = enum_type
            .value
            .iter()
            .map(|v| (v.name().to_string(), v.number()))
            .collect();
        self.enums.push(ProtoEnumDescriptor::new(name, values));
    }

    fn add_message(&mut self, scope: &str, message: &DescriptorProto, proto3: bool) -> Result<()> {
        let message_name = qualify(scope, message.name());

        // Map entry types are synthesized by the parser; they become
        // ProtoType::Map on the owning field instead of standalone messages
        let mut map_entries = HashMap::new();
        for nested in &message.nested_type {
            let is_map_entry = nested
                .options
                .as_ref()
                .and_then(|o| o.map_entry)
                .unwrap_or(false);
            if is_map_entry {
                map_entries.insert(qualify(&message_name, nested.name()), map_entry_type(nested)?);
            } else {
                self.add_message(&message_name, nested, proto3)?;
            }
        }
        for enum_type in &message.enum_type {
            self.add_enum(&message_name, enum_type);
        }

        let mut fields = Vec::with_capacity(message.field.len());
        for field in &message.field {
            let field_name = field.name().to_string();
            if field_name.is_empty() {
                continue;
            }

            let mut field_type = parse_field_type(field)?;
            if let ProtoType::Message(type_name) = &field_type {
                if let Some(map_type) = map_entries.get(type_name) {
                    field_type = map_type.clone();
                }
            }

            let repeated = field.label == Some(Label::LABEL_REPEATED.into());
            let required = field.label == Some(Label::LABEL_REQUIRED.into());
            let proto3_optional = field.proto3_optional.unwrap_or(false);

            // proto3 `optional` is modelled as a synthetic oneof; only real
            // oneofs are exposed
            let oneof = match field.oneof_index {
                Some(index) if !proto3_optional => message
                    .oneof_decl
                    .get(index as usize)
                    .map(|o| o.name().to_string()),
                _ => None,
            };

            let explicit_presence = !repeated
                && (proto3_optional
                    || oneof.is_some()
                    || matches!(field_type, ProtoType::Message(_))
                    || !proto3);

            let packed = repeated
                && field_type.is_packable()
                && field
                    .options
                    .as_ref()
                    .and_then(|o| o.packed)
                    .unwrap_or(proto3);

            fields.push(ProtoFieldDescriptor {
                name: field_name,
                number: field.number() as u32,
                field_type,
                cardinality: if repeated {
                    Cardinality::Repeated
                } else {
                    Cardinality::Singular
                },
                packed,
                required,
                explicit_presence,
                oneof,
            });
        }

        debug!(
            "Registered message type {} with {} fields",
            message_name,
            fields.len()
        );
        self.messages
            .push(ProtoMessageDescriptor::new(message_name, fields));
        Ok(())
    }

    fn build(self) -> ProtoSchema {
        ProtoSchema::new(self.messages, self.enums)
    }
}

fn map_entry_type(entry: &DescriptorProto) -> Result<ProtoType> {
    let mut key = None;
    let mut value = None;
    for field in &entry.field {
        match field.number() {
            1 => key = Some(parse_field_type(field)?),
            2 => value = Some(parse_field_type(field)?),
            _ => {}
        }
    }
    match (key, value) {
        (Some(key), Some(value)) => Ok(ProtoType::Map {
            key: Box::new(key),
            value: Box::new(value),
        }),
        _ => Err(Error::SchemaLoad(format!(
            "Map entry {} is missing its key or value field",
            entry.name()
        ))),
    }
}

fn parse_field_type(field: &FieldDescriptorProto) -> Result<ProtoType> {
    let field_type_enum_or_unknown = field
        .type_
        .ok_or_else(|| Error::SchemaLoad(format!("Field {} missing type", field.name())))?;

    // Convert EnumOrUnknown to the enum value
    let field_type_enum = field_type_enum_or_unknown.enum_value_or_default();

    Ok(match field_type_enum {
        Type::TYPE_DOUBLE => ProtoType::Double,
        Type::TYPE_FLOAT => ProtoType::Float,
        Type::TYPE_INT64 => ProtoType::Int64,
        Type::TYPE_UINT64 => ProtoType::Uint64,
        Type::TYPE_INT32 => ProtoType::Int32,
        Type::TYPE_FIXED64 => ProtoType::Fixed64,
        Type::TYPE_FIXED32 => ProtoType::Fixed32,
        Type::TYPE_BOOL => ProtoType::Bool,
        Type::TYPE_STRING => ProtoType::String,
        Type::TYPE_MESSAGE => ProtoType::Message(referenced_type(field)),
        Type::TYPE_BYTES => ProtoType::Bytes,
        Type::TYPE_UINT32 => ProtoType::Uint32,
        Type::TYPE_ENUM => ProtoType::Enum(referenced_type(field)),
        Type::TYPE_SFIXED32 => ProtoType::Sfixed32,
        Type::TYPE_SFIXED64 => ProtoType::Sfixed64,
        Type::TYPE_SINT32 => ProtoType::Sint32,
        Type::TYPE_SINT64 => ProtoType::Sint64,
        Type::TYPE_GROUP => {
            return Err(Error::SchemaLoad(
                "TYPE_GROUP is Proto2 syntax only and deprecated hence not supported".to_string(),
            ))
        }
    })
}

/// Type-checked references are fully qualified with a leading dot.
fn referenced_type(field: &FieldDescriptorProto) -> String {
    let type_name = field.type_name();
    type_name.strip_prefix('.').unwrap_or(type_name).to_string()
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}
