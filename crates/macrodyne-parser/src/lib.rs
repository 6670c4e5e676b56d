//! Streaming parser for Macrodyne phasor measurement devices.
//!
//! Push raw bytes in with [`FrameParser::write`] (or any `std::io::Read`
//! through [`FrameParser::read_from`]) and receive decoded frames on
//! per-kind channels. The parser tolerates attaching mid-stream, line noise
//! and byte-stuffed payloads; any malformed frame is reported and the stream
//! is resynchronized on the next frame marker.

pub mod assembler;
pub mod decode;
pub mod error;
pub mod events;
pub mod header;
pub mod parser;
pub mod startup;

pub use assembler::{AssembledFrame, FrameAssembler};
pub use decode::{
    decode_frame, CellDecoder, DataCell, DataFrame, DecodedFrame, MacrodyneCells, PhasorValue,
    Timestamp,
};
pub use error::{ParserError, Result};
pub use events::FrameEvents;
pub use header::{parse_header, DecodeState, HeaderContext, ParsedHeader};
pub use parser::{FrameParser, ParserConfig, DEFAULT_READ_CHUNK, STATUS_PATH_WIDTH};
pub use startup::StartupPublish;
