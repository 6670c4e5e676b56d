use std::path::PathBuf;

/// Errors that can occur while building or reloading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The descriptor file could not be read.
    #[error("failed to read descriptor {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The descriptor file exceeds the configured size limit.
    #[error("descriptor file too large ({size} bytes, max {max}): {path}")]
    TooLarge {
        path: PathBuf,
        size: u64,
        max: usize,
    },

    /// The device section is missing from the descriptor.
    #[error("device section [{0}] not found in descriptor")]
    SectionNotFound(String),

    /// A line of the device section could not be interpreted.
    #[error("invalid descriptor entry at line {line}: {message}")]
    InvalidEntry { line: usize, message: String },

    /// A declared channel entry is absent.
    #[error("missing descriptor entry {0}")]
    MissingEntry(String),

    /// A reload was requested without a descriptor path.
    #[error("no descriptor file configured")]
    NoDescriptor,

    /// The configuration cannot be represented in a Macrodyne frame.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The descriptor watch thread could not be started.
    #[error("failed to start descriptor watch: {0}")]
    Watch(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
