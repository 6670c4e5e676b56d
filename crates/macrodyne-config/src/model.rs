//! Configuration and header frame model.
//!
//! A Macrodyne configuration describes exactly one device: its id code, an
//! eight character station name and the phasor, frequency and digital
//! channels carried by data frames.

use std::fmt;
use std::ops::BitOr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use macrodyne_frame::ProtocolVersion;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::DescriptorSection;
use crate::error::{ConfigError, Result};

/// Device identifier used when a configuration is synthesized from a descriptor.
pub const DEFAULT_ID_CODE: u16 = 1690;

/// Station names are limited to eight characters by the protocol.
pub const MAX_STATION_NAME_CHARS: usize = 8;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Truncate a station name to the protocol field width.
pub fn truncate_station_name(name: &str) -> String {
    name.chars().take(MAX_STATION_NAME_CHARS).collect()
}

/// Online data format flags of a configuration frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OnlineDataFormat(u8);

impl OnlineDataFormat {
    /// Data frames carry a seconds + milliseconds timestamp.
    pub const TIMESTAMP: Self = Self(0x01);
    /// Data frames carry the first digital word.
    pub const DIGITAL_1: Self = Self(0x02);
    /// Data frames carry the second digital word.
    pub const DIGITAL_2: Self = Self(0x04);
    /// Flags used for configurations synthesized from a descriptor file.
    ///
    /// Always one digital word, whatever `DigitalCount` the descriptor
    /// declares; data frames are sized from these flags.
    pub const DEFAULT: Self = Self(0x01 | 0x02);

    const KNOWN_BITS: u8 = 0x07;

    /// Build flags from a raw byte, ignoring undefined bits.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::KNOWN_BITS)
    }

    /// Flags carrying a timestamp and enough digital words for `digitals` channels.
    pub fn for_digital_count(digitals: usize) -> Self {
        let mut flags = Self::TIMESTAMP;
        if digitals >= 1 {
            flags = flags | Self::DIGITAL_1;
        }
        if digitals >= 2 {
            flags = flags | Self::DIGITAL_2;
        }
        flags
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Number of 16-bit digital words per data frame.
    pub fn digital_words(self) -> usize {
        usize::from(self.contains(Self::DIGITAL_1)) + usize::from(self.contains(Self::DIGITAL_2))
    }
}

impl BitOr for OnlineDataFormat {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Whether a phasor measures voltage or current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PhasorKind {
    #[default]
    Voltage,
    Current,
}

impl PhasorKind {
    /// Decode the one-byte kind used in configuration frames.
    pub fn from_code(code: u8) -> Option<Self> {
        match code.to_ascii_uppercase() {
            b'V' => Some(PhasorKind::Voltage),
            b'I' => Some(PhasorKind::Current),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            PhasorKind::Voltage => b'V',
            PhasorKind::Current => b'I',
        }
    }
}

impl FromStr for PhasorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v" | "voltage" => Ok(PhasorKind::Voltage),
            "i" | "current" => Ok(PhasorKind::Current),
            other => Err(format!("unknown phasor type {other:?}")),
        }
    }
}

impl fmt::Display for PhasorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhasorKind::Voltage => f.write_str("V"),
            PhasorKind::Current => f.write_str("I"),
        }
    }
}

/// Nominal system frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NominalFrequency {
    Hz50,
    #[default]
    Hz60,
}

impl NominalFrequency {
    pub fn from_hz(hz: u8) -> Option<Self> {
        match hz {
            50 => Some(NominalFrequency::Hz50),
            60 => Some(NominalFrequency::Hz60),
            _ => None,
        }
    }

    pub fn hz(self) -> u8 {
        match self {
            NominalFrequency::Hz50 => 50,
            NominalFrequency::Hz60 => 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasorDefinition {
    pub label: String,
    pub kind: PhasorKind,
}

impl PhasorDefinition {
    pub fn new(label: impl Into<String>, kind: PhasorKind) -> Self {
        Self {
            label: label.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyDefinition {
    pub label: String,
    pub nominal: NominalFrequency,
}

impl Default for FrequencyDefinition {
    fn default() -> Self {
        Self {
            label: "Frequency".to_string(),
            nominal: NominalFrequency::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalDefinition {
    pub label: String,
}

impl DigitalDefinition {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// Unit ID buffer reported by the device.
///
/// Configuration frames do not carry the id code or station description, so
/// the most recent header frame is kept and linked into decoded configurations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderFrame {
    pub id_code: u16,
    pub unit_description: String,
    pub version: ProtocolVersion,
}

impl HeaderFrame {
    /// Station name derived from the unit description.
    pub fn station_name(&self) -> String {
        let name = self.unit_description.trim();
        if name.is_empty() {
            truncate_station_name(&format!("Unit {}", self.id_code))
        } else {
            truncate_station_name(name)
        }
    }
}

/// Configuration of a single Macrodyne device.
///
/// Clones share the instance id; a refresh from the descriptor keeps it, a
/// newly built configuration gets a fresh one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationFrame {
    pub id_code: u16,
    pub station_name: String,
    pub format: OnlineDataFormat,
    pub version: ProtocolVersion,
    pub phasors: Vec<PhasorDefinition>,
    pub frequency: FrequencyDefinition,
    pub digitals: Vec<DigitalDefinition>,
    pub descriptor_path: Option<PathBuf>,
    pub device_label: String,
    #[serde(skip)]
    pub header_frame: Option<Arc<HeaderFrame>>,
    #[serde(skip)]
    instance: u64,
}

impl ConfigurationFrame {
    /// Create an empty configuration with the given identity.
    pub fn new(id_code: u16, station_name: &str) -> Self {
        Self {
            id_code,
            station_name: truncate_station_name(station_name),
            format: OnlineDataFormat::DEFAULT,
            version: ProtocolVersion::default(),
            phasors: Vec::new(),
            frequency: FrequencyDefinition::default(),
            digitals: Vec::new(),
            descriptor_path: None,
            device_label: String::new(),
            header_frame: None,
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Synthesize a default configuration from a descriptor section.
    pub fn from_descriptor(
        section: &DescriptorSection,
        path: &Path,
        device_label: &str,
        version: ProtocolVersion,
    ) -> Self {
        let mut frame = Self::new(section.id_code.unwrap_or(DEFAULT_ID_CODE), "");
        frame.version = version;
        frame.apply_descriptor(section, path, device_label);
        frame
    }

    /// Copy of this configuration with fields replaced from a descriptor section.
    ///
    /// Instance identity and the header frame link are kept.
    pub fn refreshed_from(
        &self,
        section: &DescriptorSection,
        path: &Path,
        device_label: &str,
    ) -> Self {
        let mut frame = self.clone();
        frame.apply_descriptor(section, path, device_label);
        frame
    }

    fn apply_descriptor(&mut self, section: &DescriptorSection, path: &Path, device_label: &str) {
        if let Some(id_code) = section.id_code {
            self.id_code = id_code;
        }
        match section.station_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => self.station_name = truncate_station_name(name),
            _ if self.station_name.is_empty() => {
                self.station_name = truncate_station_name(&format!("Unit {}", self.id_code));
            }
            _ => {}
        }
        self.phasors = section.phasors.clone();
        if let Some(label) = &section.frequency_label {
            self.frequency.label = label.clone();
        }
        if let Some(nominal) = section.nominal_frequency {
            self.frequency.nominal = nominal;
        }
        self.digitals = section.digitals.clone();
        if self.digitals.len() != self.format.digital_words() {
            debug!(
                declared = self.digitals.len(),
                words = self.format.digital_words(),
                "descriptor digital count differs from the data format"
            );
        }
        self.descriptor_path = Some(path.to_path_buf());
        self.device_label = device_label.to_string();
    }

    /// Identity shared by this configuration and its refreshed copies.
    pub fn instance_id(&self) -> u64 {
        self.instance
    }

    /// Body length of a data frame described by this configuration.
    pub fn data_frame_length(&self, version: ProtocolVersion) -> usize {
        let mut length = 1; // status
        if version.has_sample_counter() {
            length += 2;
        }
        if self.format.contains(OnlineDataFormat::TIMESTAMP) {
            length += 6;
        }
        length += 4 * self.phasors.len();
        length += 4; // frequency deviation + df/dt
        length + 2 * self.format.digital_words()
    }

    /// Check that the configuration fits the protocol field widths.
    pub fn validate(&self) -> Result<()> {
        if self.station_name.chars().count() > MAX_STATION_NAME_CHARS {
            return Err(ConfigError::Invalid(format!(
                "station name {:?} exceeds {MAX_STATION_NAME_CHARS} characters",
                self.station_name
            )));
        }
        if self.phasors.len() > u8::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "{} phasors exceed the protocol limit of {}",
                self.phasors.len(),
                u8::MAX
            )));
        }
        Ok(())
    }
}
