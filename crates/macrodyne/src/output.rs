use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use macrodyne_config::ConfigurationFrame;
use macrodyne_parser::{DataFrame, DecodedFrame};
use serde::Serialize;

pub const FRAME_SCHEMA_ID: &str =
    "https://schemas.3leaps.dev/macrodyne/cli/v1/decoded-frame.schema.json";

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    schema_id: &'a str,
    #[serde(flatten)]
    frame: &'a DecodedFrame,
}

/// Print one decoded frame. Raw output is handled by [`print_raw`].
pub fn print_frame(frame: &DecodedFrame, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", frame_json(frame)),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "ID", "STATION", "SUMMARY"])
                .add_row(vec![
                    frame.frame_type().name().to_string(),
                    frame.id_code().to_string(),
                    station_name(frame),
                    summary(frame),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "kind={} id={} station={} {}",
                frame.frame_type(),
                frame.id_code(),
                station_name(frame),
                summary(frame)
            );
        }
        OutputFormat::Raw => {}
    }
}

pub fn frame_json(frame: &DecodedFrame) -> String {
    let out = FrameOutput {
        schema_id: FRAME_SCHEMA_ID,
        frame,
    };
    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn station_name(frame: &DecodedFrame) -> String {
    match frame {
        DecodedFrame::Data(data) => data.station_name.clone(),
        DecodedFrame::Header(header) => header.station_name(),
        DecodedFrame::Configuration(configuration) => configuration.station_name.clone(),
    }
}

pub fn summary(frame: &DecodedFrame) -> String {
    match frame {
        DecodedFrame::Data(data) => data_summary(data),
        DecodedFrame::Header(header) => format!("description={:?}", header.unit_description),
        DecodedFrame::Configuration(configuration) => configuration_summary(configuration),
    }
}

fn data_summary(frame: &DataFrame) -> String {
    let cell = &frame.cell;
    let nominal = frame.configuration.frequency.nominal;
    let phasors: Vec<String> = cell
        .phasors
        .iter()
        .map(|phasor| format!("{:.1}@{:.2}", phasor.magnitude(), phasor.angle()))
        .collect();
    let digitals: Vec<String> = cell
        .digitals
        .iter()
        .map(|word| format!("0x{word:04X}"))
        .collect();

    let mut out = String::new();
    if let Some(ts) = cell.timestamp {
        out.push_str(&format!("t={}.{:03} ", ts.seconds, ts.milliseconds));
    }
    if let Some(counter) = cell.sample_counter {
        out.push_str(&format!("sample={counter} "));
    }
    out.push_str(&format!(
        "freq={:.3}Hz dfdt={} phasors=[{}] digitals=[{}]",
        cell.frequency(nominal),
        cell.dfdt,
        phasors.join(", "),
        digitals.join(", ")
    ));
    out
}

fn configuration_summary(configuration: &ConfigurationFrame) -> String {
    let kinds: String = configuration
        .phasors
        .iter()
        .map(|phasor| char::from(phasor.kind.code()))
        .collect();
    format!(
        "format=0x{:02X} nominal={}Hz phasors={} [{}] digitals={}",
        configuration.format.bits(),
        configuration.frequency.nominal.hz(),
        configuration.phasors.len(),
        kinds,
        configuration.digitals.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use macrodyne_config::{HeaderFrame, PhasorDefinition, PhasorKind};
    use macrodyne_frame::ProtocolVersion;

    #[test]
    fn frame_json_carries_schema_and_kind() {
        let frame = DecodedFrame::Header(Arc::new(HeaderFrame {
            id_code: 1690,
            unit_description: "SHELBY".to_string(),
            version: ProtocolVersion::M,
        }));
        let json: serde_json::Value =
            serde_json::from_str(&frame_json(&frame)).expect("frame output should be json");
        assert_eq!(json["schema_id"], FRAME_SCHEMA_ID);
        assert_eq!(json["kind"], "header");
        assert_eq!(json["frame"]["id_code"], 1690);
    }

    #[test]
    fn configuration_summary_lists_phasor_kinds() {
        let mut configuration = ConfigurationFrame::new(7, "NORTH");
        configuration.phasors = vec![
            PhasorDefinition::new("VA", PhasorKind::Voltage),
            PhasorDefinition::new("IA", PhasorKind::Current),
        ];
        let text = summary(&DecodedFrame::Configuration(Arc::new(configuration)));
        assert!(text.contains("phasors=2 [VI]"));
        assert!(text.contains("nominal=60Hz"));
    }
}
