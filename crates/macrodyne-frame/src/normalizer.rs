use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::codec::unstuff;
use crate::kind::{COMMAND_MARKER, DATA_MARKER};

/// Removes device byte-stuffing and keeps the stream aligned to frame markers.
///
/// Each chunk is unstuffed on its own; the only state carried between chunks
/// is whether the stream is synchronized. While unsynchronized, everything
/// before the first marker is discarded.
#[derive(Debug, Default)]
pub struct StreamNormalizer {
    synchronized: bool,
}

impl StreamNormalizer {
    /// Create an unsynchronized normalizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a frame marker has been located since the last desync.
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Drop synchronization; the next chunk restarts marker acquisition.
    pub fn desynchronize(&mut self) {
        if self.synchronized {
            debug!("stream desynchronized");
        }
        self.synchronized = false;
    }

    /// Normalize one raw chunk.
    ///
    /// Returns the clean run to forward downstream, or `None` when the chunk
    /// held no marker and was dropped.
    pub fn ingest(&mut self, chunk: &[u8]) -> Option<BytesMut> {
        let (clean, collapsed) = unstuff(chunk);
        if collapsed > 0 {
            trace!(collapsed, "collapsed stuffed marker pairs");
        }

        if self.synchronized {
            return Some(clean);
        }
        self.acquire(clean)
    }

    /// Locate a marker in bytes that are already unstuffed.
    ///
    /// On success the stream becomes synchronized and the run starting at the
    /// marker is returned.
    pub fn acquire(&mut self, mut clean: BytesMut) -> Option<BytesMut> {
        let Some(offset) = find_marker(&clean) else {
            if !clean.is_empty() {
                debug!(dropped = clean.len(), "no frame marker in chunk; waiting for more data");
            }
            return None;
        };

        self.synchronized = true;
        debug!(
            offset,
            marker = format_args!("0x{:02X}", clean[offset]),
            "stream synchronized"
        );
        clean.advance(offset);
        Some(clean)
    }

    /// Recover from a failed frame at the front of `pending`.
    ///
    /// Drops synchronization, discards the failed marker byte and searches the
    /// remaining bytes for the next marker. `pending` is left empty when none
    /// is found.
    pub fn resynchronize(&mut self, pending: &mut BytesMut) {
        self.desynchronize();
        if !pending.is_empty() {
            pending.advance(1);
        }
        let rest = pending.split();
        if let Some(run) = self.acquire(rest) {
            *pending = run;
        }
    }
}

/// Position of the marker synchronization locks onto.
///
/// The data marker is always searched first; the command-response marker is
/// only considered when no data marker is present.
pub fn find_marker(buf: &[u8]) -> Option<usize> {
    buf.iter()
        .position(|&byte| byte == DATA_MARKER)
        .or_else(|| buf.iter().position(|&byte| byte == COMMAND_MARKER))
}
