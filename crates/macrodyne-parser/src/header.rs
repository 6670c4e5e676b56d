use std::fmt;
use std::sync::Arc;

use macrodyne_config::{ConfigurationFrame, HeaderFrame};
use macrodyne_frame::{CommonHeader, FrameType, ProtocolVersion};

use crate::decode::CellDecoder;
use crate::error::{ParserError, Result};

/// Per-kind state needed to decode a frame body.
#[derive(Clone)]
pub enum DecodeState {
    /// Data frames are laid out by the configuration known when the header
    /// was parsed. `None` is reported once decoding is attempted.
    Data {
        configuration: Option<Arc<ConfigurationFrame>>,
        cells: Arc<dyn CellDecoder>,
    },
    /// Header frames only need their declared body length.
    Header { data_length: usize },
    /// Configuration frames take their identity from the latest header frame.
    Configuration {
        header_frame: Option<Arc<HeaderFrame>>,
        cells: Arc<dyn CellDecoder>,
    },
}

impl fmt::Debug for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeState::Data { configuration, .. } => f
                .debug_struct("Data")
                .field("configuration", &configuration.as_ref().map(|c| c.id_code))
                .finish_non_exhaustive(),
            DecodeState::Header { data_length } => f
                .debug_struct("Header")
                .field("data_length", data_length)
                .finish(),
            DecodeState::Configuration { header_frame, .. } => f
                .debug_struct("Configuration")
                .field("header_frame", &header_frame.as_ref().map(|h| h.id_code))
                .finish_non_exhaustive(),
        }
    }
}

/// Common header with its decode state attached.
#[derive(Debug, Clone)]
pub struct ParsedHeader {
    pub common: CommonHeader,
    pub state: DecodeState,
}

impl ParsedHeader {
    pub fn frame_type(&self) -> FrameType {
        self.common.frame_type
    }

    pub fn frame_length(&self) -> usize {
        self.common.frame_length()
    }
}

/// Everything the header parser consults besides the buffer itself.
pub struct HeaderContext<'a> {
    pub allowed: &'a [FrameType],
    pub version: ProtocolVersion,
    pub max_frame_size: usize,
    pub configuration: Option<Arc<ConfigurationFrame>>,
    pub header_frame: Option<Arc<HeaderFrame>>,
    pub cells: &'a Arc<dyn CellDecoder>,
    /// Receives every complete frame image before it is validated further.
    pub on_image: &'a dyn Fn(&[u8]),
}

/// Parse the common header at the start of `window`.
///
/// Returns `Ok(None)` while the window holds less than a complete frame.
/// Once the frame is complete its image goes to `on_image`, whether or not the
/// frame is accepted afterwards.
pub fn parse_header(window: &[u8], context: &HeaderContext<'_>) -> Result<Option<ParsedHeader>> {
    let Some(common) = CommonHeader::parse(window, context.max_frame_size)? else {
        return Ok(None);
    };

    (context.on_image)(&window[..common.frame_length()]);

    if !context.allowed.contains(&common.frame_type) {
        return Err(ParserError::UnsupportedFrameType {
            id: common.type_id(),
            name: common.frame_type.name(),
        });
    }
    if common.version != context.version {
        return Err(ParserError::VersionMismatch {
            configured: context.version,
            received: common.version,
        });
    }

    let state = match common.frame_type {
        FrameType::Data => DecodeState::Data {
            configuration: context.configuration.clone(),
            cells: Arc::clone(context.cells),
        },
        FrameType::Header => DecodeState::Header {
            data_length: common.data_length,
        },
        FrameType::Configuration => DecodeState::Configuration {
            header_frame: context.header_frame.clone(),
            cells: Arc::clone(context.cells),
        },
    };

    Ok(Some(ParsedHeader { common, state }))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use bytes::BytesMut;
    use macrodyne_frame::{encode_frame, FrameError, DEFAULT_MAX_FRAME_SIZE};

    use super::*;
    use crate::decode::MacrodyneCells;

    fn frame(frame_type: FrameType, body: &[u8]) -> BytesMut {
        let mut dst = BytesMut::new();
        encode_frame(frame_type, ProtocolVersion::M, body, &mut dst).expect("frame should encode");
        dst
    }

    fn with_context<R>(
        allowed: &[FrameType],
        configuration: Option<Arc<ConfigurationFrame>>,
        f: impl FnOnce(&HeaderContext<'_>) -> R,
    ) -> (R, Vec<Vec<u8>>) {
        let images = RefCell::new(Vec::new());
        let result = {
            let on_image = |image: &[u8]| images.borrow_mut().push(image.to_vec());
            let cells: Arc<dyn CellDecoder> = Arc::new(MacrodyneCells);
            let context = HeaderContext {
                allowed,
                version: ProtocolVersion::M,
                max_frame_size: DEFAULT_MAX_FRAME_SIZE,
                configuration,
                header_frame: None,
                cells: &cells,
                on_image: &on_image,
            };
            f(&context)
        };
        (result, images.into_inner())
    }

    #[test]
    fn completeness_gating_at_boundaries() {
        let image = frame(FrameType::Header, b"\x00\x01STATION");
        let length = image.len();

        for available in [0, 4, length - 1] {
            let (parsed, images) = with_context(&FrameType::ALL, None, |context| {
                parse_header(&image[..available], context)
            });
            assert!(parsed.expect("incomplete is not an error").is_none());
            assert!(images.is_empty());
        }

        let mut longer = image.clone();
        longer.extend_from_slice(&[0xBB, 0x48]);
        for window in [&image[..], &longer[..length + 1]] {
            let (parsed, images) =
                with_context(&FrameType::ALL, None, |context| parse_header(window, context));
            let parsed = parsed.expect("header should parse").expect("frame is complete");
            assert_eq!(parsed.frame_length(), length);
            assert_eq!(images, vec![image.to_vec()]);
        }
    }

    #[test]
    fn attaches_state_per_kind() {
        let configuration = Arc::new(ConfigurationFrame::new(9, "CFG"));

        let image = frame(FrameType::Data, &[0u8; 11]);
        let (parsed, _) = with_context(&FrameType::ALL, Some(configuration.clone()), |context| {
            parse_header(&image, context)
        });
        match parsed.unwrap().unwrap().state {
            DecodeState::Data { configuration: Some(found), .. } => {
                assert_eq!(found.instance_id(), configuration.instance_id());
            }
            other => panic!("unexpected state {other:?}"),
        }

        let image = frame(FrameType::Header, b"\x00\x01AB");
        let (parsed, _) =
            with_context(&FrameType::ALL, None, |context| parse_header(&image, context));
        assert!(matches!(
            parsed.unwrap().unwrap().state,
            DecodeState::Header { data_length: 4 }
        ));

        let image = frame(FrameType::Configuration, &[0x01, 0, 60]);
        let (parsed, _) =
            with_context(&FrameType::ALL, None, |context| parse_header(&image, context));
        assert!(matches!(
            parsed.unwrap().unwrap().state,
            DecodeState::Configuration { header_frame: None, .. }
        ));
    }

    #[test]
    fn filtered_type_is_rejected_after_image_is_emitted() {
        let image = frame(FrameType::Data, &[0u8; 3]);
        let (parsed, images) = with_context(&[FrameType::Header], None, |context| {
            parse_header(&image, context)
        });
        assert!(matches!(
            parsed,
            Err(ParserError::UnsupportedFrameType { id: 0xAA00, .. })
        ));
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut image = BytesMut::new();
        encode_frame(FrameType::Header, ProtocolVersion::G, b"\x00\x01", &mut image).unwrap();
        let (parsed, _) =
            with_context(&FrameType::ALL, None, |context| parse_header(&image, context));
        assert!(matches!(
            parsed,
            Err(ParserError::VersionMismatch {
                configured: ProtocolVersion::M,
                received: ProtocolVersion::G
            })
        ));
    }

    #[test]
    fn unknown_type_id_is_a_frame_error() {
        let window = [0xBB, 0x99, 0x01, 0x00, 0x00, 0x00, 0x00];
        let (parsed, images) =
            with_context(&FrameType::ALL, None, |context| parse_header(&window, context));
        assert!(matches!(
            parsed,
            Err(ParserError::Frame(FrameError::UnsupportedFrameType(0xBB99)))
        ));
        assert!(images.is_empty());
    }
}
