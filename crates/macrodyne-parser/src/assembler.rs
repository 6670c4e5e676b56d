use bytes::{Bytes, BytesMut};
use macrodyne_frame::StreamNormalizer;
use tracing::debug;

use crate::error::Result;
use crate::header::{parse_header, HeaderContext, ParsedHeader};

/// A complete frame split off the stream, ready to decode.
#[derive(Debug, Clone)]
pub struct AssembledFrame {
    pub header: ParsedHeader,
    pub image: Bytes,
}

/// Accumulates normalized bytes and splits them into frames.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    normalizer: StreamNormalizer,
    buffer: BytesMut,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unstuff `chunk` and append whatever the normalizer forwards.
    pub fn push(&mut self, chunk: &[u8]) {
        if let Some(run) = self.normalizer.ingest(chunk) {
            self.buffer.extend_from_slice(&run);
        }
    }

    /// Split the next complete frame off the buffer.
    ///
    /// `Ok(None)` means more bytes are needed. On `Err` the buffer is left
    /// untouched; call [`FrameAssembler::resynchronize`] to move past it.
    pub fn next_frame(&mut self, context: &HeaderContext<'_>) -> Result<Option<AssembledFrame>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let Some(header) = parse_header(&self.buffer, context)? else {
            return Ok(None);
        };
        let image = self.buffer.split_to(header.frame_length()).freeze();
        Ok(Some(AssembledFrame { header, image }))
    }

    /// Drop sync and rescan the buffer past the failed frame start.
    pub fn resynchronize(&mut self) {
        self.normalizer.resynchronize(&mut self.buffer);
    }

    /// Put a rejected frame back in front of the buffer and resynchronize
    /// past its first byte.
    pub fn reject(&mut self, frame: &AssembledFrame) {
        let mut restored = BytesMut::with_capacity(frame.image.len() + self.buffer.len());
        restored.extend_from_slice(&frame.image);
        restored.extend_from_slice(&self.buffer);
        self.buffer = restored;
        self.resynchronize();
        debug!(
            kind = %frame.header.frame_type(),
            buffered = self.buffer.len(),
            "rejected frame; resynchronized"
        );
    }

    /// Forget buffered bytes and sync state.
    pub fn reset(&mut self) {
        self.normalizer.desynchronize();
        self.buffer.clear();
    }

    pub fn is_synchronized(&self) -> bool {
        self.normalizer.is_synchronized()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use macrodyne_frame::{
        encode_frame, stuff, FrameType, ProtocolVersion, DATA_MARKER, DEFAULT_MAX_FRAME_SIZE,
    };

    use super::*;
    use crate::decode::{CellDecoder, MacrodyneCells};

    fn header_frame(prefix: &[u8]) -> BytesMut {
        for suffix in 0u8..=u8::MAX {
            let mut body = prefix.to_vec();
            body.push(suffix);
            let mut logical = BytesMut::new();
            encode_frame(FrameType::Header, ProtocolVersion::M, &body, &mut logical).unwrap();
            if !logical[1..].contains(&DATA_MARKER) {
                return logical;
            }
        }
        unreachable!("some suffix yields a marker-free frame")
    }

    fn drain(assembler: &mut FrameAssembler) -> Vec<Bytes> {
        let cells: Arc<dyn CellDecoder> = Arc::new(MacrodyneCells);
        let context = HeaderContext {
            allowed: &FrameType::ALL,
            version: ProtocolVersion::M,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            configuration: None,
            header_frame: None,
            cells: &cells,
            on_image: &|_| {},
        };
        let mut frames = Vec::new();
        loop {
            match assembler.next_frame(&context) {
                Ok(Some(frame)) => frames.push(frame.image),
                Ok(None) => return frames,
                Err(_) => assembler.resynchronize(),
            }
        }
    }

    #[test]
    fn splits_back_to_back_frames() {
        let first = header_frame(b"\x00\x01ONE");
        let second = header_frame(b"\x00\x02TWO");
        let mut wire = BytesMut::new();
        stuff(&first, &mut wire);
        stuff(&second, &mut wire);

        let mut assembler = FrameAssembler::new();
        assembler.push(&wire);
        let frames = drain(&mut assembler);
        assert_eq!(frames, vec![first.freeze(), second.freeze()]);
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn discarded_prefix_never_reaches_a_frame() {
        let frame = header_frame(b"\x00\x03SYNC");
        let mut assembler = FrameAssembler::new();
        assembler.push(&[0x10, 0x20, 0x30]);
        assert!(!assembler.is_synchronized());
        assert!(drain(&mut assembler).is_empty());

        let mut chunk = BytesMut::from(&[0x40, 0x50][..]);
        stuff(&frame, &mut chunk);
        assembler.push(&chunk);
        assert_eq!(drain(&mut assembler), vec![frame.freeze()]);
    }

    #[test]
    fn reject_rescans_inside_the_failed_frame() {
        let inner = header_frame(b"\x00\x04IN");
        // Bogus command frame whose declared length ends inside a real one.
        let mut bogus = BytesMut::from(&[0xBB, 0x48, 0x01, 0x00, 0x02, 0x00, 0x00][..]);
        bogus.extend_from_slice(&inner);

        let mut assembler = FrameAssembler::new();
        assembler.push(&bogus);
        let cells: Arc<dyn CellDecoder> = Arc::new(MacrodyneCells);
        let context = HeaderContext {
            allowed: &FrameType::ALL,
            version: ProtocolVersion::M,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            configuration: None,
            header_frame: None,
            cells: &cells,
            on_image: &|_| {},
        };
        let failed = assembler.next_frame(&context).unwrap().unwrap();
        assert_eq!(failed.image.len(), 9);
        assembler.reject(&failed);

        assert_eq!(drain(&mut assembler), vec![inner.freeze()]);
    }

    #[test]
    fn reset_clears_everything() {
        let mut assembler = FrameAssembler::new();
        assembler.push(&[0xBB, 0x48, 0x01]);
        assert!(assembler.is_synchronized());
        assembler.reset();
        assert!(!assembler.is_synchronized());
        assert_eq!(assembler.buffered(), 0);
    }
}
