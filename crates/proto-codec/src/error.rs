use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Schema load error: {0}")]
    SchemaLoad(String),

    #[error("Message type not found: {0}")]
    MessageTypeNotFound(String),

    #[error("Invalid input: {0}")]
    InputFormat(String),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("Protobuf encode error: {0}")]
    ProtobufEncode(String),

    #[error("Protobuf decode error: {0}")]
    ProtobufDecode(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The first field-level mismatch found while verifying a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}expected {}, got {}", location(.path), .expected, .actual)]
pub struct VerificationError {
    /// Dotted path to the offending field; empty for the message itself
    pub path: String,
    /// What the schema requires at this path
    pub expected: String,
    /// What the value actually holds
    pub actual: String,
}

impl VerificationError {
    pub fn new(
        path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

fn location(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{path}: ")
    }
}
