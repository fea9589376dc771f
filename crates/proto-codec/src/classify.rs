//! Maps low-level failures onto the four public error categories.
//!
//! Callers that need to branch on a failure should match on
//! [`CodecError::kind`]; the message prefixes exist for hosts and tools that
//! only see the rendered text.

use crate::error::Error;
use thiserror::Error;

/// Which public operation produced the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Serialize,
    Deserialize,
}

/// The taxonomy entry a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SchemaLoad,
    TypeNotFound,
    InputFormat,
    Verification,
    Encode,
    Decode,
}

/// Public failure category, identified by a fixed message prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    MessageSerialization,
    BufferSerialization,
    MessageDeserialization,
    BufferDeserialization,
}

impl ErrorCategory {
    pub fn prefix(&self) -> &'static str {
        match self {
            ErrorCategory::MessageSerialization => "Message serialization error",
            ErrorCategory::BufferSerialization => "Unable to serialize message to protobuf buffer",
            ErrorCategory::MessageDeserialization => "Message deserialization error",
            ErrorCategory::BufferDeserialization => {
                "Unable to deserialize protobuf encoded buffer"
            }
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A classified failure from `encode` or `decode`.
#[derive(Error, Debug)]
#[error("{}: {}", .category.prefix(), .source)]
pub struct CodecError {
    pub kind: ErrorKind,
    pub category: ErrorCategory,
    #[source]
    pub source: Error,
}

impl CodecError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }
}

/// Classify an error raised while performing `operation`.
pub fn classify(operation: Operation, error: Error) -> CodecError {
    let kind = match &error {
        Error::SchemaLoad(_) => ErrorKind::SchemaLoad,
        Error::MessageTypeNotFound(_) => ErrorKind::TypeNotFound,
        Error::InputFormat(_) => ErrorKind::InputFormat,
        Error::Verification(_) => ErrorKind::Verification,
        Error::ProtobufEncode(_) => ErrorKind::Encode,
        Error::ProtobufDecode(_) => ErrorKind::Decode,
    };

    let category = match (operation, kind) {
        (Operation::Serialize, ErrorKind::Encode) => ErrorCategory::BufferSerialization,
        (Operation::Serialize, _) => ErrorCategory::MessageSerialization,
        (Operation::Deserialize, ErrorKind::Decode) => ErrorCategory::BufferDeserialization,
        (Operation::Deserialize, _) => ErrorCategory::MessageDeserialization,
    };

    CodecError {
        kind,
        category,
        source: error,
    }
}
