//! Streaming parser for Macrodyne 1690 phasor measurement devices.
//!
//! # Crate Structure
//!
//! - [`frame`]: wire constants, checksums, byte unstuffing and stream sync
//! - [`config`]: device configuration model, descriptor files and hot reload
//! - [`parser`]: frame assembly, body decoding and subscriber channels
//!
//! Most callers only need [`FrameParser`]:
//!
//! ```no_run
//! use macrodyne::FrameParser;
//!
//! let mut parser = FrameParser::new();
//! let frames = parser.subscribe_frames();
//! parser.start();
//! parser.write(&[0xBB, 0x48, 0x01, 0x00, 0x02]).unwrap();
//! for frame in frames.try_iter() {
//!     println!("{} from {}", frame.frame_type(), frame.id_code());
//! }
//! ```

/// Re-export frame types.
pub mod frame {
    pub use macrodyne_frame::*;
}

/// Re-export configuration types.
pub mod config {
    pub use macrodyne_config::*;
}

/// Re-export parser types.
pub mod parser {
    pub use macrodyne_parser::*;
}

pub use macrodyne_parser::{DecodedFrame, FrameParser, ParserConfig, ParserError};
