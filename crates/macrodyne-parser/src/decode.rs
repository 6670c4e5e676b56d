//! Frame body decoders.
//!
//! Bodies are only handed to a decoder once the header parser has seen the
//! complete frame image, so length checks here are about the declared layout,
//! never about missing bytes in the buffer.

use std::fmt;
use std::sync::Arc;

use macrodyne_config::{
    ConfigurationFrame, DigitalDefinition, HeaderFrame, NominalFrequency, OnlineDataFormat,
    PhasorDefinition, PhasorKind, DEFAULT_ID_CODE,
};
use macrodyne_frame::{verify_checksum, FrameType, ProtocolVersion, COMMON_HEADER_SIZE};
use serde::Serialize;

use crate::error::{ParserError, Result};
use crate::header::{DecodeState, ParsedHeader};

/// Timestamp carried by data frames when the format enables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timestamp {
    pub seconds: u32,
    pub milliseconds: u16,
}

/// Rectangular phasor value in raw device units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhasorValue {
    pub real: i16,
    pub imaginary: i16,
}

impl PhasorValue {
    pub fn magnitude(&self) -> f64 {
        f64::from(self.real).hypot(f64::from(self.imaginary))
    }

    /// Angle in degrees.
    pub fn angle(&self) -> f64 {
        f64::from(self.imaginary)
            .atan2(f64::from(self.real))
            .to_degrees()
    }
}

/// Measurements of the single device described by a data frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataCell {
    pub status: u8,
    pub sample_counter: Option<u16>,
    pub timestamp: Option<Timestamp>,
    pub phasors: Vec<PhasorValue>,
    /// Deviation from nominal frequency in mHz.
    pub frequency_deviation: i16,
    /// Rate of change of frequency in centi-Hz/s.
    pub dfdt: i16,
    pub digitals: Vec<u16>,
}

impl DataCell {
    /// Absolute frequency in Hz for the given nominal frequency.
    pub fn frequency(&self, nominal: NominalFrequency) -> f64 {
        f64::from(nominal.hz()) + f64::from(self.frequency_deviation) / 1000.0
    }
}

/// Decoded data frame.
#[derive(Debug, Clone, Serialize)]
pub struct DataFrame {
    pub id_code: u16,
    pub station_name: String,
    pub version: ProtocolVersion,
    pub cell: DataCell,
    /// Configuration snapshot the frame was decoded against.
    #[serde(skip)]
    pub configuration: Arc<ConfigurationFrame>,
}

/// A decoded frame of one of the three supported kinds.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "frame", rename_all = "snake_case")]
pub enum DecodedFrame {
    Data(Arc<DataFrame>),
    Header(Arc<HeaderFrame>),
    Configuration(Arc<ConfigurationFrame>),
}

impl DecodedFrame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            DecodedFrame::Data(_) => FrameType::Data,
            DecodedFrame::Header(_) => FrameType::Header,
            DecodedFrame::Configuration(_) => FrameType::Configuration,
        }
    }

    pub fn id_code(&self) -> u16 {
        match self {
            DecodedFrame::Data(frame) => frame.id_code,
            DecodedFrame::Header(frame) => frame.id_code,
            DecodedFrame::Configuration(frame) => frame.id_code,
        }
    }
}

/// Builds cells out of frame bodies.
///
/// The default [`MacrodyneCells`] follows the device layout; alternate
/// implementations can apply scaling or vendor extensions.
pub trait CellDecoder: Send + Sync + fmt::Debug {
    /// Decode the body of a data frame.
    fn data_cell(
        &self,
        configuration: &ConfigurationFrame,
        version: ProtocolVersion,
        body: &[u8],
    ) -> Result<DataCell>;

    /// Decode the body of a configuration frame.
    fn configuration(
        &self,
        header_frame: Option<&Arc<HeaderFrame>>,
        version: ProtocolVersion,
        body: &[u8],
    ) -> Result<ConfigurationFrame>;
}

/// Device body layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct MacrodyneCells;

struct Fields<'a> {
    body: &'a [u8],
    offset: usize,
    frame_type: FrameType,
}

impl<'a> Fields<'a> {
    fn new(frame_type: FrameType, body: &'a [u8]) -> Self {
        Self {
            body,
            offset: 0,
            frame_type,
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.offset + N;
        let bytes = self
            .body
            .get(self.offset..end)
            .ok_or(ParserError::Truncated {
                frame_type: self.frame_type,
                needed: end,
                available: self.body.len(),
            })?;
        self.offset = end;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.body[self.offset.min(self.body.len())..];
        self.offset = self.body.len();
        rest
    }
}

impl CellDecoder for MacrodyneCells {
    fn data_cell(
        &self,
        configuration: &ConfigurationFrame,
        version: ProtocolVersion,
        body: &[u8],
    ) -> Result<DataCell> {
        let mut fields = Fields::new(FrameType::Data, body);
        let status = fields.u8()?;
        let sample_counter = if version.has_sample_counter() {
            Some(fields.u16()?)
        } else {
            None
        };
        let timestamp = if configuration.format.contains(OnlineDataFormat::TIMESTAMP) {
            Some(Timestamp {
                seconds: fields.u32()?,
                milliseconds: fields.u16()?,
            })
        } else {
            None
        };

        let mut phasors = Vec::with_capacity(configuration.phasors.len());
        for _ in &configuration.phasors {
            phasors.push(PhasorValue {
                real: fields.i16()?,
                imaginary: fields.i16()?,
            });
        }

        let frequency_deviation = fields.i16()?;
        let dfdt = fields.i16()?;

        let mut digitals = Vec::with_capacity(configuration.format.digital_words());
        for _ in 0..configuration.format.digital_words() {
            digitals.push(fields.u16()?);
        }

        Ok(DataCell {
            status,
            sample_counter,
            timestamp,
            phasors,
            frequency_deviation,
            dfdt,
            digitals,
        })
    }

    fn configuration(
        &self,
        header_frame: Option<&Arc<HeaderFrame>>,
        version: ProtocolVersion,
        body: &[u8],
    ) -> Result<ConfigurationFrame> {
        let frame_type = FrameType::Configuration;
        let mut fields = Fields::new(frame_type, body);
        let format = OnlineDataFormat::from_bits(fields.u8()?);
        let phasor_count = usize::from(fields.u8()?);
        let hz = fields.u8()?;
        let nominal = NominalFrequency::from_hz(hz).ok_or_else(|| ParserError::InvalidBody {
            frame_type,
            message: format!("nominal frequency {hz} Hz"),
        })?;

        let kinds = fields.rest();
        if kinds.len() != phasor_count {
            return Err(ParserError::LengthMismatch {
                frame_type,
                declared: body.len(),
                expected: 3 + phasor_count,
            });
        }

        let (id_code, station_name) = match header_frame {
            Some(header) => (header.id_code, header.station_name()),
            None => (DEFAULT_ID_CODE, format!("Unit {DEFAULT_ID_CODE}")),
        };
        let mut frame = ConfigurationFrame::new(id_code, &station_name);
        frame.version = version;
        frame.format = format;
        frame.frequency.nominal = nominal;
        frame.header_frame = header_frame.cloned();

        for (index, code) in kinds.iter().enumerate() {
            let kind = PhasorKind::from_code(*code).ok_or_else(|| ParserError::InvalidBody {
                frame_type,
                message: format!("phasor {} has unknown type 0x{code:02X}", index + 1),
            })?;
            let prefix = match kind {
                PhasorKind::Voltage => "V",
                PhasorKind::Current => "I",
            };
            frame
                .phasors
                .push(PhasorDefinition::new(format!("{prefix}{}", index + 1), kind));
        }
        frame.digitals = (1..=format.digital_words())
            .map(|n| DigitalDefinition::new(format!("Digital {n}")))
            .collect();

        Ok(frame)
    }
}

fn header_body(version: ProtocolVersion, body: &[u8]) -> Result<HeaderFrame> {
    let mut fields = Fields::new(FrameType::Header, body);
    let id_code = fields.u16()?;
    let description = fields.rest();
    let unit_description = String::from_utf8_lossy(description)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string();
    Ok(HeaderFrame {
        id_code,
        unit_description,
        version,
    })
}

/// Verify and decode a complete frame image.
pub fn decode_frame(parsed: &ParsedHeader, image: &[u8]) -> Result<DecodedFrame> {
    verify_checksum(image)?;
    let common = parsed.common;
    let body = &image[COMMON_HEADER_SIZE..COMMON_HEADER_SIZE + common.data_length];

    match &parsed.state {
        DecodeState::Header { data_length } => {
            let header = header_body(common.version, &body[..*data_length])?;
            Ok(DecodedFrame::Header(Arc::new(header)))
        }
        DecodeState::Configuration {
            header_frame,
            cells,
        } => {
            let frame = cells.configuration(header_frame.as_ref(), common.version, body)?;
            Ok(DecodedFrame::Configuration(Arc::new(frame)))
        }
        DecodeState::Data {
            configuration,
            cells,
        } => {
            let configuration = configuration
                .as_ref()
                .ok_or(ParserError::MissingConfiguration)?;
            let expected = configuration.data_frame_length(common.version);
            if body.len() != expected {
                return Err(ParserError::LengthMismatch {
                    frame_type: FrameType::Data,
                    declared: body.len(),
                    expected,
                });
            }
            let cell = cells.data_cell(configuration, common.version, body)?;
            Ok(DecodedFrame::Data(Arc::new(DataFrame {
                id_code: configuration.id_code,
                station_name: configuration.station_name.clone(),
                version: common.version,
                cell,
                configuration: Arc::clone(configuration),
            })))
        }
    }
}
