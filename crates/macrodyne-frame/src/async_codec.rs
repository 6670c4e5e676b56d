//! `tokio_util::codec` adapter yielding normalized raw frames.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::codec::{verify_checksum, CommonHeader, FrameConfig, RawFrame};
use crate::error::FrameError;
use crate::normalizer::StreamNormalizer;

/// Decoder that unstuffs, synchronizes and splits a Macrodyne byte stream.
///
/// Every read handed to the decoder is treated as one chunk. Malformed frames
/// are logged and the stream is rescanned from the byte after their marker;
/// only I/O errors end the stream.
#[derive(Debug, Default)]
pub struct MacrodyneCodec {
    normalizer: StreamNormalizer,
    pending: BytesMut,
    config: FrameConfig,
}

impl MacrodyneCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }
}

impl Decoder for MacrodyneCodec {
    type Item = RawFrame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>, FrameError> {
        if !src.is_empty() {
            let chunk = src.split();
            if let Some(run) = self.normalizer.ingest(&chunk) {
                self.pending.extend_from_slice(&run);
            }
        }

        loop {
            match CommonHeader::parse(&self.pending, self.config.max_frame_size) {
                Ok(None) => return Ok(None),
                Ok(Some(header)) => {
                    let image = self.pending.split_to(header.frame_length()).freeze();
                    if let Err(err) = verify_checksum(&image) {
                        warn!(error = %err, frame_type = %header.frame_type, "corrupt frame; resynchronizing");
                        let mut restored =
                            BytesMut::with_capacity(image.len() + self.pending.len());
                        restored.extend_from_slice(&image);
                        restored.extend_from_slice(&self.pending);
                        self.pending = restored;
                        self.normalizer.resynchronize(&mut self.pending);
                        continue;
                    }
                    return Ok(Some(RawFrame { header, image }));
                }
                Err(err) => {
                    warn!(error = %err, "malformed frame header; resynchronizing");
                    self.normalizer.resynchronize(&mut self.pending);
                }
            }
        }
    }
}
