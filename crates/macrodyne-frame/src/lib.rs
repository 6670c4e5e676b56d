//! Wire format and stream synchronization for Macrodyne phasor streams.
//!
//! Every frame on the wire is laid out as:
//! - A 1-byte marker (`0xAA` data, `0xBB` command response)
//! - A 1-byte frame code
//! - A 1-byte protocol version
//! - A 2-byte big-endian body length
//! - The body, followed by a 2-byte CRC-CCITT
//!
//! The device doubles every literal `0xAA` after the leading marker. The
//! [`StreamNormalizer`] collapses those pairs and locks onto the first frame
//! marker after attach or after a desync.

pub mod codec;
pub mod error;
pub mod kind;
pub mod normalizer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::MacrodyneCodec;
pub use codec::{
    calculate_crc, encode_frame, stuff, unstuff, verify_checksum, CommonHeader, FrameConfig,
    RawFrame, CHECKSUM_SIZE, COMMON_HEADER_SIZE, DEFAULT_MAX_FRAME_SIZE,
};
pub use error::{FrameError, Result};
pub use kind::{
    frame_type_name, is_marker, FrameType, ProtocolVersion, COMMAND_MARKER,
    CONFIGURATION_FRAME_CODE, DATA_FRAME_CODE, DATA_MARKER, HEADER_FRAME_CODE,
};
pub use normalizer::{find_marker, StreamNormalizer};
