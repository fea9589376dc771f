//! proto-codec command-line host
//!
//! Shared options and I/O helpers for the `proto-codec` binary. The codec
//! itself lives in the `proto_codec` crate; this crate only turns command-line
//! options into a [`Codec`] and moves bytes between files and stdio.
//!
//! # CLI Usage
//!
//! ```bash
//! # Encode a JSON object into protobuf wire bytes
//! proto-codec encode --schema iot.proto --message-type SensorReading \
//!   --input reading.json --output reading.bin
//!
//! # Decode wire bytes back into canonical JSON text
//! proto-codec decode --schema iot.proto --message-type SensorReading --input reading.bin
//!
//! # List the message types a schema declares
//! proto-codec types --schema iot.proto
//! ```

use anyhow::Context;
use clap::Parser;
use proto_codec::{classify, Codec, CodecError, Operation, VerifyPolicy};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Clone, Debug)]
pub struct SchemaOpts {
    /// Path to the .proto schema file
    #[arg(long, value_name = "PATH", env = "PROTO_CODEC_SCHEMA")]
    pub schema: PathBuf,
}

#[derive(Parser, Clone, Debug)]
pub struct CodecOpts {
    #[command(flatten)]
    pub schema_opts: SchemaOpts,

    /// Message type to encode or decode (fully qualified, or an unambiguous simple name)
    #[arg(long, env = "PROTO_CODEC_MESSAGE_TYPE")]
    pub message_type: String,

    /// Ignore JSON keys that name no field instead of rejecting them
    #[arg(long)]
    pub allow_unknown_fields: bool,
}

impl CodecOpts {
    pub fn policy(&self) -> VerifyPolicy {
        VerifyPolicy {
            reject_unknown_fields: !self.allow_unknown_fields,
        }
    }

    /// Load the schema and build a codec. A load failure is classified for
    /// `operation` so it carries the same prefix as the call that needed it.
    pub fn build_codec(&self, operation: Operation) -> Result<Codec, CodecError> {
        let schema = proto_codec::schema::load(&self.schema_opts.schema)
            .map_err(|e| classify(operation, e))?;
        Ok(Codec::with_policy(schema, self.policy()))
    }
}

/// Read all input from `path`, or from stdin when no path is given.
pub fn read_input(path: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("Failed to read input from {path:?}"))
        }
        None => {
            let mut buffer = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buffer)
                .context("Failed to read input from stdin")?;
            Ok(buffer)
        }
    }
}

/// Write `bytes` to `path`, or to stdout when no path is given.
pub fn write_output(path: Option<&Path>, bytes: &[u8]) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, bytes).with_context(|| format!("Failed to write output to {path:?}"))
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(bytes)
                .and_then(|_| stdout.flush())
                .context("Failed to write output to stdout")
        }
    }
}
