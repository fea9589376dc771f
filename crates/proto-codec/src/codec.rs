//! The public encode/decode facade.
//!
//! A [`Codec`] pairs a loaded schema with a verification policy. Every call
//! either returns its full result or exactly one classified [`CodecError`].

use crate::classify::{classify, CodecError, Operation};
use crate::decoder::ProtoDecoder;
use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::json::to_json;
use crate::scalar::kind_of;
use crate::schema::{self, resolve, SchemaHandle};
use crate::verifier::{Verifier, VerifyPolicy};
use bytes::Bytes;
use proto_types::ProtoSchema;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Immutable protobuf wire-format bytes.
pub type WireBuffer = Bytes;

/// JSON input to encode, as text or as UTF-8 bytes.
#[derive(Debug, Clone, Copy)]
pub enum EncodeInput<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
}

impl<'a> From<&'a str> for EncodeInput<'a> {
    fn from(text: &'a str) -> Self {
        EncodeInput::Text(text)
    }
}

impl<'a> From<&'a [u8]> for EncodeInput<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        EncodeInput::Bytes(bytes)
    }
}

/// Result of a decode: canonical JSON text, or that same text as bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedOutput {
    Text(String),
    Raw(Vec<u8>),
}

impl DecodedOutput {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            DecodedOutput::Text(text) => text.as_bytes(),
            DecodedOutput::Raw(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            DecodedOutput::Text(text) => text.into_bytes(),
            DecodedOutput::Raw(bytes) => bytes,
        }
    }
}

/// Schema-verified conversion between JSON and protobuf wire format.
///
/// Cloning is cheap; clones share the same schema.
#[derive(Debug, Clone)]
pub struct Codec {
    schema: SchemaHandle,
    policy: VerifyPolicy,
}

impl Codec {
    pub fn new(schema: SchemaHandle) -> Self {
        Self {
            schema,
            policy: VerifyPolicy::default(),
        }
    }

    pub fn with_policy(schema: SchemaHandle, policy: VerifyPolicy) -> Self {
        Self { schema, policy }
    }

    /// Load the schema at `path` and build a codec with the default policy.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(schema::load(path)?))
    }

    pub fn schema(&self) -> &ProtoSchema {
        &self.schema
    }

    pub fn policy(&self) -> VerifyPolicy {
        self.policy
    }

    /// Parse `input` as a JSON object, verify it and encode it as `type_name`.
    pub fn encode(
        &self,
        input: EncodeInput<'_>,
        type_name: &str,
    ) -> std::result::Result<WireBuffer, CodecError> {
        normalize(input)
            .and_then(|value| self.encode_checked(&value, type_name))
            .map_err(|e| classify(Operation::Serialize, e))
    }

    /// Verify and encode an already-parsed JSON value.
    pub fn encode_value(
        &self,
        value: &Value,
        type_name: &str,
    ) -> std::result::Result<WireBuffer, CodecError> {
        self.encode_checked(value, type_name)
            .map_err(|e| classify(Operation::Serialize, e))
    }

    /// Decode `data` as `type_name` and return the verified JSON value.
    pub fn decode_value(
        &self,
        data: &[u8],
        type_name: &str,
    ) -> std::result::Result<Value, CodecError> {
        self.decode_checked(data, type_name)
            .map_err(|e| classify(Operation::Deserialize, e))
    }

    /// Decode `data` as `type_name` and render it as canonical JSON text.
    ///
    /// With `raw_output` the JSON text is returned as bytes; it is never
    /// re-encoded to protobuf.
    pub fn decode(
        &self,
        data: &[u8],
        type_name: &str,
        raw_output: bool,
    ) -> std::result::Result<DecodedOutput, CodecError> {
        let text = self
            .decode_checked(data, type_name)
            .and_then(|value| {
                serde_json::to_string(&value).map_err(|e| Error::ProtobufDecode(e.to_string()))
            })
            .map_err(|e| classify(Operation::Deserialize, e))?;

        Ok(if raw_output {
            DecodedOutput::Raw(text.into_bytes())
        } else {
            DecodedOutput::Text(text)
        })
    }

    fn encode_checked(&self, value: &Value, type_name: &str) -> Result<WireBuffer> {
        let descriptor = resolve(&self.schema, type_name)?;
        Verifier::new(&self.schema, self.policy).verify(descriptor, value)?;

        let encoded = Encoder::new(&self.schema).encode(descriptor, value)?;
        debug!("Encoded {} into {} bytes", descriptor.name, encoded.len());
        Ok(Bytes::from(encoded))
    }

    fn decode_checked(&self, data: &[u8], type_name: &str) -> Result<Value> {
        let descriptor = resolve(&self.schema, type_name)?;
        let message = ProtoDecoder::new(&self.schema).decode(descriptor, data)?;
        debug!(
            "Decoded {} bytes into {} with {} fields",
            data.len(),
            descriptor.name,
            message.fields.len()
        );

        let value = to_json(&self.schema, &message)?;
        Verifier::new(&self.schema, self.policy).verify(descriptor, &value)?;
        Ok(value)
    }
}

/// Turn encode input into a JSON object value.
fn normalize(input: EncodeInput<'_>) -> Result<Value> {
    let text = match input {
        EncodeInput::Text(text) => text,
        EncodeInput::Bytes(bytes) => std::str::from_utf8(bytes)
            .map_err(|e| Error::InputFormat(format!("input is not valid UTF-8: {e}")))?,
    };

    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::InputFormat(format!("input is not valid JSON: {e}")))?;

    if !value.is_object() {
        return Err(Error::InputFormat(format!(
            "expected a JSON object, got {}",
            kind_of(&value)
        )));
    }
    Ok(value)
}

/// Encode JSON `input` as `type_name` using the schema at `schema_path`.
///
/// The schema is loaded on every call; hold a [`Codec`] to reuse it.
pub fn serialize_to_buffer<'a>(
    input: impl Into<EncodeInput<'a>>,
    schema_path: impl AsRef<Path>,
    type_name: &str,
) -> std::result::Result<WireBuffer, CodecError> {
    let codec = Codec::from_file(schema_path).map_err(|e| classify(Operation::Serialize, e))?;
    codec.encode(input.into(), type_name)
}

/// Decode protobuf `input` as `type_name` using the schema at `schema_path`.
pub fn deserialize_from_buffer(
    input: &[u8],
    schema_path: impl AsRef<Path>,
    type_name: &str,
    raw_output: bool,
) -> std::result::Result<DecodedOutput, CodecError> {
    let codec = Codec::from_file(schema_path).map_err(|e| classify(Operation::Deserialize, e))?;
    codec.decode(input, type_name, raw_output)
}
