//! Decode a recorded Macrodyne byte stream and print every frame.
//!
//! Run with:
//!   cargo run --example decode-capture -- capture.bin [units.ini LABEL]

use std::fs::File;

use macrodyne::{DecodedFrame, FrameParser, ParserConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let capture = args.next().ok_or("usage: decode-capture <capture> [descriptor label]")?;
    let descriptor = args.next().map(Into::into);
    let device_label = args.next().unwrap_or_default();

    let mut parser = FrameParser::with_config(ParserConfig {
        descriptor_path: descriptor,
        device_label,
        ..ParserConfig::default()
    });
    let frames = parser.subscribe_frames();
    let errors = parser.subscribe_errors();
    parser.start();

    let total = parser.read_from(File::open(&capture)?, 512)?;
    parser.stop();

    for frame in frames.try_iter() {
        match frame {
            DecodedFrame::Data(data) => eprintln!(
                "DATA {} status=0x{:02X} freq_dev={}mHz phasors={}",
                data.station_name,
                data.cell.status,
                data.cell.frequency_deviation,
                data.cell.phasors.len()
            ),
            DecodedFrame::Header(header) => {
                eprintln!("HEADER {} {:?}", header.id_code, header.unit_description)
            }
            DecodedFrame::Configuration(configuration) => eprintln!(
                "CONFIGURATION {} phasors={}",
                configuration.station_name,
                configuration.phasors.len()
            ),
        }
    }
    for error in errors.try_iter() {
        eprintln!("rejected: {error}");
    }
    eprintln!("{total} bytes read from {capture}");
    Ok(())
}
