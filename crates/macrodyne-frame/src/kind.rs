//! Frame-start markers, frame type ids and protocol variants.
//!
//! A frame type id is the marker byte followed by the frame code, read as a
//! big-endian `u16`. Only three ids are defined; everything else is rejected
//! by the header parser.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Leading byte of every data frame. Also the value the device stuffs.
pub const DATA_MARKER: u8 = 0xAA;

/// Leading byte of every command-response frame (header and configuration).
pub const COMMAND_MARKER: u8 = 0xBB;

/// Frame code following the data marker.
pub const DATA_FRAME_CODE: u8 = 0x00;

/// Command-response code of the unit ID buffer (header frame).
pub const HEADER_FRAME_CODE: u8 = 0x48;

/// Command-response code of the online data format (configuration frame).
pub const CONFIGURATION_FRAME_CODE: u8 = 0x24;

/// The three frame kinds a Macrodyne device emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    /// Measurement data, laid out according to the active configuration.
    Data,
    /// Unit ID buffer carrying the device id code and description.
    Header,
    /// Online data format describing which channels the data frames carry.
    Configuration,
}

impl FrameType {
    /// Every supported frame type.
    pub const ALL: [FrameType; 3] = [FrameType::Data, FrameType::Header, FrameType::Configuration];

    /// Resolve a frame type from its wire id.
    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    /// Wire id: marker in the high byte, frame code in the low byte.
    pub fn id(self) -> u16 {
        u16::from_be_bytes([self.marker(), self.code()])
    }

    /// Marker byte that starts frames of this type.
    pub fn marker(self) -> u8 {
        match self {
            FrameType::Data => DATA_MARKER,
            FrameType::Header | FrameType::Configuration => COMMAND_MARKER,
        }
    }

    /// Frame code that follows the marker.
    pub fn code(self) -> u8 {
        match self {
            FrameType::Data => DATA_FRAME_CODE,
            FrameType::Header => HEADER_FRAME_CODE,
            FrameType::Configuration => CONFIGURATION_FRAME_CODE,
        }
    }

    /// Short upper-case name used in logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Header => "HEADER",
            FrameType::Configuration => "CONFIGURATION",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns a human-readable name for a raw frame type id.
pub fn frame_type_name(id: u16) -> &'static str {
    match FrameType::from_id(id) {
        Some(kind) => kind.name(),
        None if is_marker((id >> 8) as u8) => "UNSUPPORTED",
        None => "UNKNOWN",
    }
}

/// Returns true if `byte` may begin a frame.
pub fn is_marker(byte: u8) -> bool {
    byte == DATA_MARKER || byte == COMMAND_MARKER
}

/// Macrodyne 1690 protocol variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// 1690M.
    #[default]
    M,
    /// 1690G. Data frames carry a sample counter after the status byte.
    G,
}

impl ProtocolVersion {
    /// Decode the version byte of a common header.
    pub fn from_byte(byte: u8) -> Result<Self, FrameError> {
        match byte {
            0x01 => Ok(ProtocolVersion::M),
            0x02 => Ok(ProtocolVersion::G),
            other => Err(FrameError::UnknownVersion(other)),
        }
    }

    /// Encode the version byte of a common header.
    pub fn to_byte(self) -> u8 {
        match self {
            ProtocolVersion::M => 0x01,
            ProtocolVersion::G => 0x02,
        }
    }

    /// Whether data frames of this variant carry a sample counter.
    pub fn has_sample_counter(self) -> bool {
        matches!(self, ProtocolVersion::G)
    }
}

impl FromStr for ProtocolVersion {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "M" | "1690M" => Ok(ProtocolVersion::M),
            "G" | "1690G" => Ok(ProtocolVersion::G),
            _ => Err(FrameError::UnknownVersionName(s.to_string())),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::M => f.write_str("1690M"),
            ProtocolVersion::G => f.write_str("1690G"),
        }
    }
}
