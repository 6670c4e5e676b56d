use clap::{Args, Subcommand};
use std::path::PathBuf;

use macrodyne_frame::ProtocolVersion;
use macrodyne_parser::{ParserConfig, DEFAULT_READ_CHUNK};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod status;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a captured byte stream and print its frames.
    Decode(DecodeArgs),
    /// Show the parser settings and the configuration they resolve to.
    Status(StatusArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Status(args) => status::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Settings shared by commands that build a parser.
#[derive(Args, Debug)]
pub struct ParserArgs {
    /// INI descriptor used to synthesize the device configuration.
    #[arg(long, value_name = "FILE")]
    pub descriptor: Option<PathBuf>,
    /// Descriptor section describing the device.
    #[arg(long, value_name = "LABEL", default_value = "")]
    pub device_label: String,
    /// Protocol variant: 1690M or 1690G.
    #[arg(long, value_name = "VERSION", default_value = "1690M")]
    pub protocol: ProtocolVersion,
}

impl ParserArgs {
    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            protocol_version: self.protocol,
            descriptor_path: self.descriptor.clone(),
            device_label: self.device_label.clone(),
            ..ParserConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file to decode, or `-` for stdin.
    pub input: PathBuf,
    #[command(flatten)]
    pub settings: ParserArgs,
    /// Bytes handed to the parser per write.
    #[arg(long, default_value_t = DEFAULT_READ_CHUNK)]
    pub chunk_size: usize,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub settings: ParserArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
