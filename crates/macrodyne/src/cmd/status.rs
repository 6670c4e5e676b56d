use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use macrodyne_parser::FrameParser;
use serde::Serialize;

use crate::cmd::StatusArgs;
use crate::exit::{parser_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct ConfigurationSummary {
    id_code: u16,
    station_name: String,
    phasors: usize,
    digitals: usize,
    nominal_frequency: u8,
}

#[derive(Serialize)]
struct StatusOutput {
    schema_id: &'static str,
    protocol_version: String,
    descriptor_path: Option<String>,
    device_label: String,
    hot_reload: bool,
    configuration: Option<ConfigurationSummary>,
}

pub fn run(args: StatusArgs, format: OutputFormat) -> CliResult<i32> {
    let parser = FrameParser::with_config(args.settings.parser_config());
    if parser.descriptor_path().is_some() && parser.configuration().is_none() {
        parser
            .refresh_configuration()
            .map_err(|err| parser_error("descriptor load failed", err))?;
    }

    let output = StatusOutput {
        schema_id: "https://schemas.3leaps.dev/macrodyne/cli/v1/status.schema.json",
        protocol_version: parser.protocol_version().to_string(),
        descriptor_path: parser
            .descriptor_path()
            .map(|path| path.display().to_string()),
        device_label: parser.device_label().to_string(),
        hot_reload: parser.hot_reload(),
        configuration: parser
            .configuration()
            .map(|configuration| ConfigurationSummary {
                id_code: configuration.id_code,
                station_name: configuration.station_name.clone(),
                phasors: configuration.phasors.len(),
                digitals: configuration.digitals.len(),
                nominal_frequency: configuration.frequency.nominal.hz(),
            }),
    };

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&output).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table => print_table(&output),
        OutputFormat::Pretty | OutputFormat::Raw => print!("{}", parser.status()),
    }
    Ok(SUCCESS)
}

fn print_table(output: &StatusOutput) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["SETTING", "VALUE"])
        .add_row(vec!["Protocol version", output.protocol_version.as_str()])
        .add_row(vec![
            "Descriptor file",
            output.descriptor_path.as_deref().unwrap_or("(none)"),
        ])
        .add_row(vec!["Device label", output.device_label.as_str()])
        .add_row(vec![
            "Auto-reload",
            if output.hot_reload { "enabled" } else { "disabled" },
        ]);
    if let Some(configuration) = &output.configuration {
        table
            .add_row(vec![
                "Station".to_string(),
                format!("{} ({})", configuration.station_name, configuration.id_code),
            ])
            .add_row(vec![
                "Channels".to_string(),
                format!(
                    "{} phasors, {} digitals, {} Hz",
                    configuration.phasors,
                    configuration.digitals,
                    configuration.nominal_frequency
                ),
            ]);
    }
    println!("{table}");
}
