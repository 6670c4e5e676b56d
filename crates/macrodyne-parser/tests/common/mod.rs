#![allow(dead_code)]

use std::sync::mpsc::Receiver;
use std::time::Duration;

use bytes::BytesMut;
use macrodyne_config::{ConfigurationFrame, PhasorDefinition, PhasorKind};
use macrodyne_frame::{encode_frame, stuff, FrameType, ProtocolVersion, COMMAND_MARKER, DATA_MARKER};

/// Encode a frame whose bytes after the leading marker hold no marker value.
///
/// `build` receives a seed byte to vary until the checksum cooperates, so
/// acquisition and resync never lock onto a literal inside the frame.
pub fn clean_frame(
    frame_type: FrameType,
    version: ProtocolVersion,
    build: impl Fn(u8) -> Vec<u8>,
) -> BytesMut {
    for seed in 0u8..=u8::MAX {
        let body = build(seed);
        let mut logical = BytesMut::new();
        encode_frame(frame_type, version, &body, &mut logical).expect("frame should encode");
        if marker_free(&logical[1..]) {
            return logical;
        }
    }
    panic!("no seed yields a marker-free frame");
}

/// Encode a frame exactly as given, markers and all.
pub fn encode(frame_type: FrameType, version: ProtocolVersion, body: &[u8]) -> BytesMut {
    let mut logical = BytesMut::new();
    encode_frame(frame_type, version, body, &mut logical).expect("frame should encode");
    logical
}

/// Encode the first frame built from a 16-bit seed that `accept` takes.
pub fn find_frame(
    frame_type: FrameType,
    version: ProtocolVersion,
    build: impl Fn(u16) -> Vec<u8>,
    accept: impl Fn(&[u8]) -> bool,
) -> BytesMut {
    (0u16..=u16::MAX)
        .map(|seed| encode(frame_type, version, &build(seed)))
        .find(|logical| accept(logical))
        .expect("some seed yields an acceptable frame")
}

pub fn marker_free(bytes: &[u8]) -> bool {
    !bytes
        .iter()
        .any(|byte| *byte == DATA_MARKER || *byte == COMMAND_MARKER)
}

pub fn wire(logical: &[u8]) -> BytesMut {
    let mut out = BytesMut::new();
    stuff(logical, &mut out);
    out
}

pub fn header_frame(id_code: u16, description: &str) -> BytesMut {
    clean_frame(FrameType::Header, ProtocolVersion::M, |seed| {
        let mut body = id_code.to_be_bytes().to_vec();
        body.extend_from_slice(description.as_bytes());
        body.push(b'0' + seed % 10);
        body.push(seed);
        body
    })
}

/// Configuration with `phasors` voltage phasors and the default format
/// (timestamp plus one digital word).
pub fn configuration(phasors: usize) -> ConfigurationFrame {
    let mut frame = ConfigurationFrame::new(1690, "TEST");
    frame.phasors = (1..=phasors)
        .map(|n| PhasorDefinition::new(format!("V{n}"), PhasorKind::Voltage))
        .collect();
    frame
}

/// M-variant data frame matching [`configuration`] with `phasors` phasors.
pub fn data_frame(phasors: usize) -> BytesMut {
    clean_frame(FrameType::Data, ProtocolVersion::M, |seed| {
        let mut body = vec![seed]; // status
        body.extend_from_slice(&1_000u32.to_be_bytes());
        body.extend_from_slice(&500u16.to_be_bytes());
        for n in 0..phasors {
            body.extend_from_slice(&(100 * (n as i16 + 1)).to_be_bytes());
            body.extend_from_slice(&0i16.to_be_bytes());
        }
        body.extend_from_slice(&12i16.to_be_bytes());
        body.extend_from_slice(&(-1i16).to_be_bytes());
        body.extend_from_slice(&0x0001u16.to_be_bytes());
        body
    })
}

pub fn recv<T>(rx: &Receiver<T>) -> T {
    rx.recv_timeout(Duration::from_secs(5))
        .expect("event should arrive")
}

pub fn drain<T>(rx: &Receiver<T>) -> Vec<T> {
    rx.try_iter().collect()
}
