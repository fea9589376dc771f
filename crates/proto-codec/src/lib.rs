//! Schema-verified conversion between JSON values and protobuf wire format.
//!
//! Features:
//!
//! - Runtime Protobuf Support: Parse `.proto` files at runtime, no code generation
//! - Verification: Values are checked against the schema before encoding and after decoding
//! - Forward Compatibility: Unknown wire fields are skipped on decode
//! - Classified Errors: Every failure carries one of four stable message prefixes
//!
//! # Example
//!
//! ```ignore
//! use proto_codec::{Codec, DecodedOutput};
//!
//! let codec = Codec::from_file("schemas/iot.proto")?;
//! let buffer = codec.encode(r#"{"deviceId":"123456"}"#.into(), "SensorReading")?;
//! let json = codec.decode(&buffer, "SensorReading", false)?;
//! ```

/// Maps failures onto the four public error categories
pub mod classify;

/// High-level API: the [`Codec`] facade and the one-shot entry points
///
/// Ties schema lookup, verification, the wire codec and error
/// classification together.
pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod json;
pub(crate) mod scalar;
pub mod schema;
pub mod verifier;

// Re-export main types for easy access
pub use classify::{classify, CodecError, ErrorCategory, ErrorKind, Operation};
pub use codec::{
    deserialize_from_buffer, serialize_to_buffer, Codec, DecodedOutput, EncodeInput, WireBuffer,
};
pub use decoder::ProtoDecoder;
pub use encoder::Encoder;
pub use error::{Error, Result, VerificationError};
pub use schema::SchemaHandle;
pub use verifier::{Verifier, VerifyPolicy};
