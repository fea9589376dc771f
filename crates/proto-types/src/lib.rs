//! Protobuf schema and value types for proto-codec.
//!
//! This crate holds the data model shared by the schema parser, the verifier
//! and the wire codec in `proto-codec`.
//!
//! # Architecture
//!
//! ```text
//! .proto source → ProtoSchema (ProtoMessageDescriptor, ProtoEnumDescriptor)
//! wire bytes    → ProtoMessage (ProtoFieldValue) → JSON value
//! ```
//!
//! # Modules
//!
//! - [`schema`] - Descriptors built once when a schema is loaded
//! - [`value`] - Runtime representation of decoded protobuf messages

pub mod schema;
pub mod value;

// Re-export main types for convenient access
pub use schema::{
    Cardinality, ProtoEnumDescriptor, ProtoFieldDescriptor, ProtoMessageDescriptor, ProtoSchema,
    ProtoType, WireType,
};
pub use value::{ProtoFieldValue, ProtoMessage};
