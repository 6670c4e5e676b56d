use macrodyne_frame::{FrameType, ProtocolVersion};

/// Errors that can occur while parsing a Macrodyne stream.
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    /// Wire-level error (marker, header, checksum).
    #[error("frame error: {0}")]
    Frame(#[from] macrodyne_frame::FrameError),

    /// Configuration or descriptor error.
    #[error("configuration error: {0}")]
    Config(#[from] macrodyne_config::ConfigError),

    /// `write` was called before `start` or after `stop`.
    #[error("parser is not started")]
    NotStarted,

    /// The frame type is valid on the wire but not accepted by this parser.
    #[error("frame type {name} (0x{id:04X}) is not accepted")]
    UnsupportedFrameType { id: u16, name: &'static str },

    /// The frame carries a different protocol variant than configured.
    #[error("frame is {received}, parser is configured for {configured}")]
    VersionMismatch {
        configured: ProtocolVersion,
        received: ProtocolVersion,
    },

    /// A data frame arrived before any configuration was known.
    #[error("no configuration available to decode data frame")]
    MissingConfiguration,

    /// The declared body length disagrees with the expected layout.
    #[error("{frame_type} frame body is {declared} bytes, expected {expected}")]
    LengthMismatch {
        frame_type: FrameType,
        declared: usize,
        expected: usize,
    },

    /// The frame body is shorter than its fixed fields.
    #[error("{frame_type} frame body truncated: need {needed} bytes, have {available}")]
    Truncated {
        frame_type: FrameType,
        needed: usize,
        available: usize,
    },

    /// A body field holds a value the protocol does not define.
    #[error("invalid {frame_type} frame body: {message}")]
    InvalidBody {
        frame_type: FrameType,
        message: String,
    },

    /// The startup configuration publish could not be scheduled.
    #[error("startup publish failed: {0}")]
    Startup(std::io::Error),

    /// I/O error while reading a source stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParserError {
    /// Whether the error means frame boundaries can no longer be trusted.
    pub fn requires_resync(&self) -> bool {
        !matches!(
            self,
            ParserError::MissingConfiguration
                | ParserError::NotStarted
                | ParserError::Config(_)
                | ParserError::Startup(_)
                | ParserError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ParserError>;
