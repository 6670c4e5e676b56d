use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::{is_marker, FrameType, ProtocolVersion, DATA_MARKER};

/// Common header: marker (1) + code (1) + version (1) + data length (2) = 5 bytes.
pub const COMMON_HEADER_SIZE: usize = 5;

/// Trailing CRC-CCITT.
pub const CHECKSUM_SIZE: usize = 2;

/// Default maximum frame size: 8 KiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024;

const MAX_DATA_LENGTH: usize = u16::MAX as usize;

/// Fixed leading fields of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonHeader {
    /// Frame kind resolved from the marker and frame code.
    pub frame_type: FrameType,
    /// Protocol variant the device declared.
    pub version: ProtocolVersion,
    /// Declared body length in bytes.
    pub data_length: usize,
}

impl CommonHeader {
    /// Parse the common header at the start of `src`.
    ///
    /// Returns `Ok(None)` while `src` holds fewer than [`COMMON_HEADER_SIZE`]
    /// bytes or fewer than the declared frame length. A returned header is
    /// therefore always backed by a complete frame image.
    pub fn parse(src: &[u8], max_frame_size: usize) -> Result<Option<Self>> {
        if src.len() < COMMON_HEADER_SIZE {
            return Ok(None); // Need more data
        }

        if !is_marker(src[0]) {
            return Err(FrameError::InvalidMarker(src[0]));
        }

        let type_id = u16::from_be_bytes([src[0], src[1]]);
        let frame_type =
            FrameType::from_id(type_id).ok_or(FrameError::UnsupportedFrameType(type_id))?;
        let version = ProtocolVersion::from_byte(src[2])?;
        let data_length = u16::from_be_bytes([src[3], src[4]]) as usize;

        let header = Self {
            frame_type,
            version,
            data_length,
        };

        let frame_length = header.frame_length();
        if frame_length > max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: frame_length,
                max: max_frame_size,
            });
        }

        if src.len() < frame_length {
            return Ok(None); // Need more data
        }

        Ok(Some(header))
    }

    /// Total frame length: header + body + checksum.
    pub fn frame_length(&self) -> usize {
        COMMON_HEADER_SIZE + self.data_length + CHECKSUM_SIZE
    }

    /// Wire id of the frame type.
    pub fn type_id(&self) -> u16 {
        self.frame_type.id()
    }
}

/// A complete, unstuffed frame image with its parsed common header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub header: CommonHeader,
    pub image: Bytes,
}

impl RawFrame {
    /// Body bytes between the common header and the checksum.
    pub fn body(&self) -> &[u8] {
        &self.image[COMMON_HEADER_SIZE..COMMON_HEADER_SIZE + self.header.data_length]
    }
}

/// Encode a frame in its logical (unstuffed) form.
///
/// Wire format:
/// ```text
/// ┌────────┬────────┬─────────┬──────────┬──────────────┬──────────┐
/// │ Marker │ Code   │ Version │ Length   │ Body         │ CRC      │
/// │ (1B)   │ (1B)   │ (1B)    │ (2B BE)  │ (Length B)   │ (2B BE)  │
/// └────────┴────────┴─────────┴──────────┴──────────────┴──────────┘
/// ```
///
/// Use [`stuff`] to produce the bytes a device actually transmits.
pub fn encode_frame(
    frame_type: FrameType,
    version: ProtocolVersion,
    body: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if body.len() > MAX_DATA_LENGTH {
        return Err(FrameError::BodyTooLarge {
            size: body.len(),
            max: MAX_DATA_LENGTH,
        });
    }
    let start = dst.len();
    dst.reserve(COMMON_HEADER_SIZE + body.len() + CHECKSUM_SIZE);
    dst.put_u8(frame_type.marker());
    dst.put_u8(frame_type.code());
    dst.put_u8(version.to_byte());
    dst.put_u16(body.len() as u16);
    dst.put_slice(body);
    let crc = calculate_crc(&dst[start..]);
    dst.put_u16(crc);
    Ok(())
}

/// Apply device byte-stuffing to one logical frame.
///
/// The leading marker is sent as-is; every later data-marker byte is doubled.
pub fn stuff(frame: &[u8], dst: &mut BytesMut) {
    let Some((first, rest)) = frame.split_first() else {
        return;
    };
    dst.reserve(frame.len() + rest.len() / 8);
    dst.put_u8(*first);
    for &byte in rest {
        dst.put_u8(byte);
        if byte == DATA_MARKER {
            dst.put_u8(DATA_MARKER);
        }
    }
}

/// Collapse every doubled data-marker pair in `src`.
///
/// After a pair is collapsed the scan resumes just past the removed byte, so
/// `AA AA AA` becomes `AA AA` and `AA AA AA AA` becomes `AA AA`. Isolated
/// marker bytes are left alone. Returns the cleaned bytes and the number of
/// pairs collapsed.
pub fn unstuff(src: &[u8]) -> (BytesMut, usize) {
    let mut out = BytesMut::with_capacity(src.len());
    let mut collapsed = 0usize;
    let mut i = 0usize;
    while i < src.len() {
        let byte = src[i];
        out.put_u8(byte);
        if byte == DATA_MARKER && src.get(i + 1) == Some(&DATA_MARKER) {
            collapsed += 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    (out, collapsed)
}

/// CRC-CCITT (polynomial 0x1021, initial value 0xFFFF).
pub fn calculate_crc(buffer: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in buffer {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Check the trailing CRC of a complete frame image.
pub fn verify_checksum(frame: &[u8]) -> Result<()> {
    if frame.len() < COMMON_HEADER_SIZE + CHECKSUM_SIZE {
        return Err(FrameError::ChecksumMismatch {
            computed: 0,
            received: 0,
        });
    }
    let (content, trailer) = frame.split_at(frame.len() - CHECKSUM_SIZE);
    let computed = calculate_crc(content);
    let received = u16::from_be_bytes([trailer[0], trailer[1]]);
    if computed != received {
        return Err(FrameError::ChecksumMismatch { computed, received });
    }
    Ok(())
}

/// Configuration for frame parsing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest frame accepted before the header is treated as malformed. Default: 8 KiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::COMMAND_MARKER;

    fn header_frame(body: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(FrameType::Header, ProtocolVersion::M, body, &mut buf).unwrap();
        buf
    }

    #[test]
    fn crc_ccitt_check_value() {
        assert_eq!(calculate_crc(b"123456789"), 0x29B1);
    }

    #[test]
    fn encode_and_parse_header() {
        let buf = header_frame(b"\x06\x9aUNIT");
        assert_eq!(buf.len(), COMMON_HEADER_SIZE + 6 + CHECKSUM_SIZE);
        assert_eq!(&buf[..3], &[COMMAND_MARKER, 0x48, 0x01]);

        let header = CommonHeader::parse(&buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(header.frame_type, FrameType::Header);
        assert_eq!(header.version, ProtocolVersion::M);
        assert_eq!(header.data_length, 6);
        assert_eq!(header.frame_length(), buf.len());
        assert!(verify_checksum(&buf).is_ok());
    }

    #[test]
    fn parse_incomplete_common_header() {
        let buf = [COMMAND_MARKER, 0x48, 0x01, 0x00];
        assert!(CommonHeader::parse(&buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .is_none());
    }

    #[test]
    fn completeness_gating_at_boundaries() {
        for body_len in [0usize, 1, 7, 64, 300] {
            let body = vec![0x11; body_len];
            let mut buf = header_frame(&body);
            let frame_len = buf.len();
            buf.put_u8(COMMAND_MARKER);

            let short = CommonHeader::parse(&buf[..frame_len - 1], DEFAULT_MAX_FRAME_SIZE);
            assert!(short.unwrap().is_none(), "length-1 must be incomplete");

            let exact = CommonHeader::parse(&buf[..frame_len], DEFAULT_MAX_FRAME_SIZE);
            assert_eq!(exact.unwrap().unwrap().frame_length(), frame_len);

            let longer = CommonHeader::parse(&buf[..frame_len + 1], DEFAULT_MAX_FRAME_SIZE);
            assert_eq!(longer.unwrap().unwrap().frame_length(), frame_len);
        }
    }

    #[test]
    fn parse_rejects_invalid_marker() {
        let buf = [0x10, 0x48, 0x01, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            CommonHeader::parse(&buf, DEFAULT_MAX_FRAME_SIZE),
            Err(FrameError::InvalidMarker(0x10))
        ));
    }

    #[test]
    fn parse_rejects_unsupported_frame_type() {
        let buf = [COMMAND_MARKER, 0x99, 0x01, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            CommonHeader::parse(&buf, DEFAULT_MAX_FRAME_SIZE),
            Err(FrameError::UnsupportedFrameType(0xBB99))
        ));
    }

    #[test]
    fn parse_rejects_unknown_version() {
        let buf = [DATA_MARKER, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            CommonHeader::parse(&buf, DEFAULT_MAX_FRAME_SIZE),
            Err(FrameError::UnknownVersion(0x09))
        ));
    }

    #[test]
    fn parse_rejects_oversized_frame() {
        let buf = [DATA_MARKER, 0x00, 0x01, 0x40, 0x00];
        assert!(matches!(
            CommonHeader::parse(&buf, 1024),
            Err(FrameError::FrameTooLarge { size, max: 1024 }) if size == 0x4000 + 7
        ));
    }

    #[test]
    fn checksum_mismatch_detected() {
        let mut buf = header_frame(b"\x00\x01ABC");
        let last = buf.len() - 3;
        buf[last] ^= 0xFF;
        assert!(matches!(
            verify_checksum(&buf),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn stuffing_doubles_markers_after_the_first_byte() {
        let frame = [DATA_MARKER, 0x00, DATA_MARKER, 0x01, DATA_MARKER];
        let mut wire = BytesMut::new();
        stuff(&frame, &mut wire);
        assert_eq!(
            wire.as_ref(),
            &[DATA_MARKER, 0x00, DATA_MARKER, DATA_MARKER, 0x01, DATA_MARKER, DATA_MARKER]
        );

        let (clean, collapsed) = unstuff(&wire);
        assert_eq!(collapsed, 2);
        assert_eq!(clean.as_ref(), &frame);
    }

    #[test]
    fn unstuff_resumes_after_removed_byte() {
        let (clean, collapsed) = unstuff(&[DATA_MARKER; 3]);
        assert_eq!(collapsed, 1);
        assert_eq!(clean.as_ref(), &[DATA_MARKER, DATA_MARKER]);

        let (clean, collapsed) = unstuff(&[DATA_MARKER; 4]);
        assert_eq!(collapsed, 2);
        assert_eq!(clean.as_ref(), &[DATA_MARKER, DATA_MARKER]);
    }

    #[test]
    fn unstuff_counts_pairs_and_keeps_isolated_markers() {
        // 3 doubled pairs and 2 isolated markers separated by other bytes.
        let input = [
            0x01,
            DATA_MARKER,
            DATA_MARKER,
            0x02,
            DATA_MARKER,
            0x03,
            DATA_MARKER,
            DATA_MARKER,
            0x04,
            DATA_MARKER,
            0x05,
            DATA_MARKER,
            DATA_MARKER,
        ];
        let (clean, collapsed) = unstuff(&input);
        assert_eq!(collapsed, 3);
        assert_eq!(clean.len(), input.len() - 3);
        assert_eq!(clean.iter().filter(|b| **b == DATA_MARKER).count(), 5);
    }

    #[test]
    fn raw_frame_body_slice() {
        let buf = header_frame(b"\x00\x07BODY");
        let header = CommonHeader::parse(&buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        let raw = RawFrame {
            header,
            image: buf.freeze(),
        };
        assert_eq!(raw.body(), b"\x00\x07BODY");
    }
}
