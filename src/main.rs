//! Command-line interface for proto-codec
//!
//! # Usage Examples
//!
//! ## Encode
//! ```bash
//! echo '{"deviceId":"123456","value":22.5}' | proto-codec encode \
//!   --schema iot.proto --message-type SensorReading > reading.bin
//! ```
//!
//! ## Decode
//! ```bash
//! proto-codec decode --schema iot.proto --message-type SensorReading \
//!   --input reading.bin
//! ```
//!
//! `PROTO_CODEC_SCHEMA` and `PROTO_CODEC_MESSAGE_TYPE` can stand in for the
//! flags. Set `RUST_LOG=debug` to see skipped fields and buffer sizes.

use anyhow::Context;
use clap::{Parser, Subcommand};
use proto_codec::{DecodedOutput, EncodeInput, Operation};
use proto_codec_cli::{read_input, write_output, CodecOpts, SchemaOpts};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "proto-codec")]
#[command(about = "Convert JSON to protobuf wire format and back, verified against a .proto schema")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a JSON object into protobuf wire bytes
    Encode {
        #[command(flatten)]
        codec: CodecOpts,

        /// JSON input file (default: stdin)
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,

        /// Output file for the wire bytes (default: stdout)
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Decode protobuf wire bytes into canonical JSON text
    Decode {
        #[command(flatten)]
        codec: CodecOpts,

        /// Wire-format input file (default: stdin)
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,

        /// Output file for the JSON text (default: stdout)
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Emit the JSON text as raw bytes without a trailing newline
        #[arg(long)]
        raw: bool,
    },

    /// List the message types declared in a schema
    Types {
        #[command(flatten)]
        schema_opts: SchemaOpts,
    },
}

fn main() -> anyhow::Result<()> {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Encode {
            codec,
            input,
            output,
        } => {
            let data = read_input(input.as_deref())?;
            let buffer = codec
                .build_codec(Operation::Serialize)?
                .encode(EncodeInput::Bytes(&data), &codec.message_type)?;

            tracing::info!(
                "Encoded {} as {} ({} bytes)",
                input
                    .as_deref()
                    .map_or_else(|| "stdin".to_string(), |p| p.display().to_string()),
                codec.message_type,
                buffer.len()
            );
            write_output(output.as_deref(), &buffer)?;
        }
        Commands::Decode {
            codec,
            input,
            output,
            raw,
        } => {
            let data = read_input(input.as_deref())?;
            let decoded = codec
                .build_codec(Operation::Deserialize)?
                .decode(&data, &codec.message_type, raw)?;

            let bytes = match decoded {
                DecodedOutput::Text(mut text) => {
                    text.push('\n');
                    text.into_bytes()
                }
                DecodedOutput::Raw(bytes) => bytes,
            };
            write_output(output.as_deref(), &bytes)?;
        }
        Commands::Types { schema_opts } => {
            let schema = proto_codec::schema::load(&schema_opts.schema)
                .with_context(|| format!("Failed to load schema from {:?}", schema_opts.schema))?;
            let mut listing = schema.list_messages().join("\n");
            listing.push('\n');
            write_output(None, listing.as_bytes())?;
        }
    }

    Ok(())
}
