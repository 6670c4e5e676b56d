//! Configurations that originate from another protocol family.
//!
//! A foreign configuration may describe any number of devices with their own
//! channel metadata (scaling, digital masks). Macrodyne frames describe
//! exactly one device, so derivation keeps only what the first device carries
//! and only the label and kind of each channel.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{
    truncate_station_name, ConfigurationFrame, DigitalDefinition, FrequencyDefinition,
    OnlineDataFormat, PhasorDefinition, PhasorKind,
};

/// Phasor channel of a foreign device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignPhasor {
    pub label: String,
    pub kind: PhasorKind,
    /// Conversion factor used by the foreign protocol; not carried over.
    pub scale_factor: f64,
}

/// Digital channel of a foreign device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignDigital {
    pub label: String,
    pub normal_status: u16,
    pub valid_inputs: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignDevice {
    pub station_name: String,
    pub id_code: u16,
    pub phasors: Vec<ForeignPhasor>,
    pub frequency: FrequencyDefinition,
    pub digitals: Vec<ForeignDigital>,
}

/// Multi-device configuration of another protocol family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignConfiguration {
    pub id_code: u16,
    pub devices: Vec<ForeignDevice>,
}

/// Either shape of configuration accepted by the cache.
#[derive(Debug, Clone)]
pub enum AnyConfiguration {
    Native(ConfigurationFrame),
    Foreign(ForeignConfiguration),
}

impl From<ConfigurationFrame> for AnyConfiguration {
    fn from(frame: ConfigurationFrame) -> Self {
        AnyConfiguration::Native(frame)
    }
}

impl From<ForeignConfiguration> for AnyConfiguration {
    fn from(frame: ForeignConfiguration) -> Self {
        AnyConfiguration::Foreign(frame)
    }
}

impl AnyConfiguration {
    /// Convert into the native shape, deriving when necessary.
    pub fn into_native(self) -> ConfigurationFrame {
        match self {
            AnyConfiguration::Native(frame) => frame,
            AnyConfiguration::Foreign(foreign) => derive_configuration(&foreign),
        }
    }
}

/// Derive a native configuration from a foreign one.
pub fn derive_configuration(foreign: &ForeignConfiguration) -> ConfigurationFrame {
    let first = foreign.devices.first();
    let name = match first.map(|device| device.station_name.trim()) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("Unit {}", foreign.id_code),
    };

    let mut frame = ConfigurationFrame::new(foreign.id_code, &truncate_station_name(&name));
    if let Some(device) = first {
        frame.phasors = device
            .phasors
            .iter()
            .map(|phasor| PhasorDefinition::new(phasor.label.clone(), phasor.kind))
            .collect();
        frame.frequency = device.frequency.clone();
        frame.digitals = device
            .digitals
            .iter()
            .map(|digital| DigitalDefinition::new(digital.label.clone()))
            .collect();
        frame.format = OnlineDataFormat::for_digital_count(frame.digitals.len());
    }

    if foreign.devices.len() > 1 {
        debug!(
            ignored = foreign.devices.len() - 1,
            "foreign configuration carries more than one device; keeping the first"
        );
    }
    frame
}
