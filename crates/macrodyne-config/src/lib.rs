//! Device configuration for Macrodyne phasor streams.
//!
//! A parser works against exactly one configuration at a time. It can be
//! supplied directly, decoded from the stream, derived from a configuration
//! of another protocol family, or synthesized from an INI-style descriptor
//! file, which can also be watched and reloaded while the parser runs.

pub mod cache;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod foreign;
pub mod model;
pub mod watch;

pub use cache::{ConfigurationCache, DescriptorSettings, ReloadObserver};
pub use config::CacheConfig;
pub use descriptor::DescriptorSection;
pub use error::{ConfigError, Result};
pub use foreign::{
    derive_configuration, AnyConfiguration, ForeignConfiguration, ForeignDevice, ForeignDigital,
    ForeignPhasor,
};
pub use model::{
    truncate_station_name, ConfigurationFrame, DigitalDefinition, FrequencyDefinition,
    HeaderFrame, NominalFrequency, OnlineDataFormat, PhasorDefinition, PhasorKind,
    DEFAULT_ID_CODE, MAX_STATION_NAME_CHARS,
};
pub use watch::FileWatch;
