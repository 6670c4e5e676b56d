mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "macrodyne", version, about = "Macrodyne phasor stream decoder")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). MACRODYNE_LOG overrides it with a filter directive.
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use macrodyne_frame::ProtocolVersion;

    #[test]
    fn parses_decode_subcommand() {
        let cli = Cli::try_parse_from([
            "macrodyne",
            "decode",
            "capture.bin",
            "--descriptor",
            "/etc/macrodyne/units.ini",
            "--device-label",
            "SHELBY",
            "--protocol",
            "1690G",
            "--chunk-size",
            "64",
            "--count",
            "3",
        ])
        .expect("decode args should parse");

        let Command::Decode(args) = cli.command else {
            panic!("expected decode subcommand");
        };
        assert_eq!(args.settings.protocol, ProtocolVersion::G);
        assert_eq!(args.settings.device_label, "SHELBY");
        assert_eq!(args.chunk_size, 64);
        assert_eq!(args.count, Some(3));
    }

    #[test]
    fn rejects_unknown_protocol() {
        let err = Cli::try_parse_from(["macrodyne", "decode", "-", "--protocol", "1690X"])
            .expect_err("unknown protocol should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn global_format_after_subcommand() {
        let cli = Cli::try_parse_from(["macrodyne", "status", "--format", "json"])
            .expect("status args should parse");
        assert!(matches!(cli.command, Command::Status(_)));
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
    }
}
