/// Errors that can occur while framing a Macrodyne stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame does not start with a data or command-response marker.
    #[error("invalid frame marker 0x{0:02X} (expected 0xAA or 0xBB)")]
    InvalidMarker(u8),

    /// The marker/code pair does not name a supported frame type.
    #[error("unsupported frame type 0x{0:04X}")]
    UnsupportedFrameType(u16),

    /// The version byte is not a known protocol variant.
    #[error("unknown protocol version byte 0x{0:02X}")]
    UnknownVersion(u8),

    /// A protocol version name could not be parsed.
    #[error("unknown protocol version {0:?} (expected M or G)")]
    UnknownVersionName(String),

    /// The declared frame length exceeds the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A body does not fit in the 16-bit length field.
    #[error("frame body too large ({size} bytes, max {max})")]
    BodyTooLarge { size: usize, max: usize },

    /// The trailing CRC does not match the frame contents.
    #[error("checksum mismatch (computed 0x{computed:04X}, frame carries 0x{received:04X})")]
    ChecksumMismatch { computed: u16, received: u16 },

    /// An I/O error occurred while reading the stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
