//! Protobuf decoder implementation.
//!
//! Decodes binary protobuf data into [`ProtoMessage`] using a parsed schema.
//! Decoding is forward compatible: unknown field numbers, and known numbers
//! carrying a wire type the schema does not expect, are skipped rather than
//! rejected.

use crate::error::{Error, Result};
use proto_types::{
    ProtoFieldDescriptor, ProtoFieldValue, ProtoMessage, ProtoMessageDescriptor, ProtoSchema,
    ProtoType, WireType,
};
use protobuf::CodedInputStream;
use tracing::debug;

/// Nesting limit for embedded messages, matching the protobuf default.
const MAX_DEPTH: usize = 100;

/// Runtime protobuf decoder.
pub struct ProtoDecoder<'a> {
    schema: &'a ProtoSchema,
}

impl<'a> ProtoDecoder<'a> {
    /// Create a new decoder from a schema.
    pub fn new(schema: &'a ProtoSchema) -> Self {
        Self { schema }
    }

    /// Decode a protobuf message from bytes.
    pub fn decode(&self, descriptor: &ProtoMessageDescriptor, data: &[u8]) -> Result<ProtoMessage> {
        let mut stream = CodedInputStream::from_bytes(data);
        self.decode_message(descriptor, &mut stream, 0)
    }

    fn decode_message(
        &self,
        descriptor: &ProtoMessageDescriptor,
        stream: &mut CodedInputStream,
        depth: usize,
    ) -> Result<ProtoMessage> {
        if depth > MAX_DEPTH {
            return Err(Error::ProtobufDecode(format!(
                "Message nesting exceeds {MAX_DEPTH} levels in {}",
                descriptor.name
            )));
        }

        let mut message = ProtoMessage::new(descriptor.name.clone());

        loop {
            if stream
                .eof()
                .map_err(|e| Error::ProtobufDecode(e.to_string()))?
            {
                break;
            }

            let (field_number, wire_type) = read_tag(stream)?;

            // Find the field descriptor by number
            let Some(field_desc) = descriptor.field_by_number(field_number) else {
                debug!(
                    "Skipping unknown field number {} in message {}",
                    field_number, descriptor.name
                );
                skip_value(stream, wire_type)?;
                continue;
            };

            let packed_run = field_desc.is_repeated()
                && field_desc.field_type.is_packable()
                && wire_type == WireType::LengthDelimited;
            if wire_type != field_desc.field_type.wire_type() && !packed_run {
                debug!(
                    "Skipping field {} ({}) in message {}: wire type {:?} does not match {}",
                    field_desc.name, field_number, descriptor.name, wire_type, field_desc.field_type
                );
                skip_value(stream, wire_type)?;
                continue;
            }

            self.decode_field(&mut message, descriptor, field_desc, stream, packed_run, depth)?;
        }

        Ok(message)
    }

    fn decode_field(
        &self,
        message: &mut ProtoMessage,
        descriptor: &ProtoMessageDescriptor,
        field_desc: &ProtoFieldDescriptor,
        stream: &mut CodedInputStream,
        packed_run: bool,
        depth: usize,
    ) -> Result<()> {
        if let ProtoType::Map { key, value } = &field_desc.field_type {
            let entry = self.decode_map_entry(key, value, stream, depth)?;
            let existing = message
                .fields
                .entry(field_desc.name.clone())
                .or_insert_with(|| ProtoFieldValue::Map(Vec::new()));
            if let ProtoFieldValue::Map(entries) = existing {
                entries.push(entry);
            }
            return Ok(());
        }

        if field_desc.is_repeated() {
            let existing = message
                .fields
                .entry(field_desc.name.clone())
                .or_insert_with(|| ProtoFieldValue::Repeated(Vec::new()));
            if let ProtoFieldValue::Repeated(values) = existing {
                if packed_run {
                    let payload = stream
                        .read_bytes()
                        .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                    let mut packed = CodedInputStream::from_bytes(&payload);
                    while !packed
                        .eof()
                        .map_err(|e| Error::ProtobufDecode(e.to_string()))?
                    {
                        values.push(self.decode_value(&field_desc.field_type, &mut packed, depth)?);
                    }
                } else {
                    values.push(self.decode_value(&field_desc.field_type, stream, depth)?);
                }
            }
            return Ok(());
        }

        let value = self.decode_value(&field_desc.field_type, stream, depth)?;

        // Setting one member of a oneof clears the others
        for sibling in descriptor.oneof_siblings(&field_desc.name) {
            message.fields.remove(&sibling.name);
        }

        // A repeated occurrence of a singular message field is merged
        if let ProtoFieldValue::Message(incoming) = value {
            match message.fields.get_mut(&field_desc.name) {
                Some(ProtoFieldValue::Message(existing)) => {
                    existing.merge_from(*incoming, self.schema)
                }
                _ => {
                    message
                        .fields
                        .insert(field_desc.name.clone(), ProtoFieldValue::Message(incoming));
                }
            }
        } else {
            message.fields.insert(field_desc.name.clone(), value);
        }
        Ok(())
    }

    fn decode_value(
        &self,
        proto_type: &ProtoType,
        stream: &mut CodedInputStream,
        depth: usize,
    ) -> Result<ProtoFieldValue> {
        match proto_type {
            ProtoType::Double => {
                let v = stream
                    .read_double()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Double(v))
            }
            ProtoType::Float => {
                let v = stream
                    .read_float()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Float(v))
            }
            ProtoType::Int32 => {
                let v = stream
                    .read_int32()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Int32(v))
            }
            ProtoType::Sint32 => {
                let v = stream
                    .read_sint32()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Int32(v))
            }
            ProtoType::Sfixed32 => {
                let v = stream
                    .read_sfixed32()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Int32(v))
            }
            ProtoType::Int64 => {
                let v = stream
                    .read_int64()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Int64(v))
            }
            ProtoType::Sint64 => {
                let v = stream
                    .read_sint64()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Int64(v))
            }
            ProtoType::Sfixed64 => {
                let v = stream
                    .read_sfixed64()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Int64(v))
            }
            ProtoType::Uint32 => {
                let v = stream
                    .read_uint32()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Uint32(v))
            }
            ProtoType::Fixed32 => {
                let v = stream
                    .read_fixed32()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Uint32(v))
            }
            ProtoType::Uint64 => {
                let v = stream
                    .read_uint64()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Uint64(v))
            }
            ProtoType::Fixed64 => {
                let v = stream
                    .read_fixed64()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Uint64(v))
            }
            ProtoType::Bool => {
                let v = stream
                    .read_bool()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Bool(v))
            }
            ProtoType::String => {
                let v = stream
                    .read_string()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::String(v))
            }
            ProtoType::Bytes => {
                let v = stream
                    .read_bytes()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Bytes(v))
            }
            ProtoType::Enum(_) => {
                let v = stream
                    .read_int32()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                Ok(ProtoFieldValue::Enum(v))
            }
            ProtoType::Message(type_name) => {
                let nested_descriptor = self
                    .schema
                    .get_message(type_name)
                    .ok_or_else(|| Error::MessageTypeNotFound(type_name.to_string()))?;

                // Reading the payload up front turns a short buffer into an error
                // instead of a silently truncated sub-message
                let payload = stream
                    .read_bytes()
                    .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
                let mut nested_stream = CodedInputStream::from_bytes(&payload);
                let nested_message =
                    self.decode_message(nested_descriptor, &mut nested_stream, depth + 1)?;

                Ok(ProtoFieldValue::Message(Box::new(nested_message)))
            }
            ProtoType::Map { .. } => Err(Error::ProtobufDecode(format!(
                "Map type {proto_type} cannot be decoded as a single value"
            ))),
        }
    }

    /// Map entries are nested messages with key = 1 and value = 2; a missing
    /// key or value takes its type's default.
    fn decode_map_entry(
        &self,
        key_type: &ProtoType,
        value_type: &ProtoType,
        stream: &mut CodedInputStream,
        depth: usize,
    ) -> Result<(ProtoFieldValue, ProtoFieldValue)> {
        let payload = stream
            .read_bytes()
            .map_err(|e| Error::ProtobufDecode(e.to_string()))?;
        let mut entry = CodedInputStream::from_bytes(&payload);

        let mut key = None;
        let mut value = None;
        while !entry
            .eof()
            .map_err(|e| Error::ProtobufDecode(e.to_string()))?
        {
            let (field_number, wire_type) = read_tag(&mut entry)?;
            match field_number {
                1 if wire_type == key_type.wire_type() => {
                    key = Some(self.decode_value(key_type, &mut entry, depth + 1)?);
                }
                2 if wire_type == value_type.wire_type() => {
                    value = Some(self.decode_value(value_type, &mut entry, depth + 1)?);
                }
                _ => skip_value(&mut entry, wire_type)?,
            }
        }

        Ok((
            key.unwrap_or_else(|| default_value(key_type)),
            value.unwrap_or_else(|| default_value(value_type)),
        ))
    }
}

/// Read a tag and split it into field number and wire type.
fn read_tag(stream: &mut CodedInputStream) -> Result<(u32, WireType)> {
    let tag = stream
        .read_raw_varint32()
        .map_err(|e| Error::ProtobufDecode(e.to_string()))?;

    let (field_number, wire_type) = WireType::from_tag(tag).ok_or_else(|| {
        Error::ProtobufDecode(format!(
            "Invalid wire type {} for field number {}",
            tag & 0x7,
            tag >> 3
        ))
    })?;

    if field_number == 0 {
        return Err(Error::ProtobufDecode("Invalid field number 0".to_string()));
    }
    if matches!(wire_type, WireType::StartGroup | WireType::EndGroup) {
        return Err(Error::ProtobufDecode(format!(
            "Group wire type is not supported (field number {field_number})"
        )));
    }

    Ok((field_number, wire_type))
}

fn skip_value(stream: &mut CodedInputStream, wire_type: WireType) -> Result<()> {
    match wire_type {
        WireType::Varint => stream.read_raw_varint64().map(|_| ()),
        WireType::Fixed64 => stream.read_raw_little_endian64().map(|_| ()),
        WireType::Fixed32 => stream.read_raw_little_endian32().map(|_| ()),
        WireType::LengthDelimited => stream.read_bytes().map(|_| ()),
        WireType::StartGroup | WireType::EndGroup => {
            return Err(Error::ProtobufDecode(
                "Group wire type is not supported".to_string(),
            ))
        }
    }
    .map_err(|e| Error::ProtobufDecode(e.to_string()))
}

fn default_value(proto_type: &ProtoType) -> ProtoFieldValue {
    match proto_type {
        ProtoType::Double => ProtoFieldValue::Double(0.0),
        ProtoType::Float => ProtoFieldValue::Float(0.0),
        ProtoType::Int32 | ProtoType::Sint32 | ProtoType::Sfixed32 => ProtoFieldValue::Int32(0),
        ProtoType::Int64 | ProtoType::Sint64 | ProtoType::Sfixed64 => ProtoFieldValue::Int64(0),
        ProtoType::Uint32 | ProtoType::Fixed32 => ProtoFieldValue::Uint32(0),
        ProtoType::Uint64 | ProtoType::Fixed64 => ProtoFieldValue::Uint64(0),
        ProtoType::Bool => ProtoFieldValue::Bool(false),
        ProtoType::String => ProtoFieldValue::String(String::new()),
        ProtoType::Bytes => ProtoFieldValue::Bytes(Vec::new()),
        ProtoType::Enum(_) => ProtoFieldValue::Enum(0),
        ProtoType::Message(name) => ProtoFieldValue::Message(Box::new(ProtoMessage::new(name))),
        ProtoType::Map { .. } => ProtoFieldValue::Map(Vec::new()),
    }
}
