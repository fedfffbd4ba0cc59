//! Multiplexed stdout/stderr framing.
//!
//! Attached container output interleaves both channels on one connection.
//! Every frame is an 8 byte header followed by its payload:
//!
//! ```text
//! [channel:1][reserved:3][length:4, big-endian][payload:length]
//! ```
//!
//! Channel `1` is stdout, channel `2` is stderr.

use crate::config::StreamConfig;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use dockstream_core::{StreamError, StreamResult};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Output channel of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl Channel {
    /// Wire value of this channel.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Stdout => 1,
            Self::Stderr => 2,
        }
    }

    /// Parse a wire value.
    pub fn from_byte(byte: u8) -> StreamResult<Self> {
        match byte {
            1 => Ok(Self::Stdout),
            2 => Ok(Self::Stderr),
            other => Err(StreamError::protocol(format!(
                "invalid channel byte {other}"
            ))),
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Stdout => 0,
            Self::Stderr => 1,
        }
    }
}

impl TryFrom<u8> for Channel {
    type Error = StreamError;

    fn try_from(byte: u8) -> StreamResult<Self> {
        Self::from_byte(byte)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Channel the payload belongs to.
    pub channel: Channel,
    /// Payload length in bytes.
    pub length: u32,
}

impl FrameHeader {
    /// Encoded header length.
    pub const LEN: usize = 8;

    /// Parse a header from the first [`FrameHeader::LEN`] bytes of `buf`.
    pub fn parse(buf: &[u8]) -> StreamResult<Self> {
        if buf.len() < Self::LEN {
            return Err(StreamError::protocol(format!(
                "frame header needs {} bytes, got {}",
                Self::LEN,
                buf.len()
            )));
        }

        let channel = Channel::from_byte(buf[0])?;
        // Bytes 1..4 are reserved.
        let length = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);

        Ok(Self { channel, length })
    }

    /// Encode the header.
    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut header = [0u8; Self::LEN];
        header[0] = self.channel.as_byte();
        header[4..].copy_from_slice(&self.length.to_be_bytes());
        header
    }
}

/// One demultiplexed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Channel the payload was sent on.
    pub channel: Channel,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(channel: Channel, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    /// Create a stdout frame.
    pub fn stdout(payload: impl Into<Bytes>) -> Self {
        Self::new(Channel::Stdout, payload)
    }

    /// Create a stderr frame.
    pub fn stderr(payload: impl Into<Bytes>) -> Self {
        Self::new(Channel::Stderr, payload)
    }

    /// Encode header and payload into wire format.
    pub fn encode(&self) -> StreamResult<Bytes> {
        encode_frame(self.channel, &self.payload)
    }
}

/// Encode a payload into wire format.
///
/// Payloads longer than `u32::MAX` bytes cannot be framed and are reported as
/// [`StreamError::ProtocolViolation`].
pub fn encode_frame(channel: Channel, payload: &[u8]) -> StreamResult<Bytes> {
    let header = FrameHeader {
        channel,
        length: frame_length(payload.len())?,
    };

    let mut buf = BytesMut::with_capacity(FrameHeader::LEN + payload.len());
    buf.put_slice(&header.encode());
    buf.put_slice(payload);
    Ok(buf.freeze())
}

fn frame_length(len: usize) -> StreamResult<u32> {
    u32::try_from(len).map_err(|_| {
        StreamError::protocol(format!("payload of {len} bytes does not fit in a frame"))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitingHeader,
    AwaitingPayload(FrameHeader),
}

/// Incremental decoder for the multiplexed framing.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    state: DecodeState,
    frames: VecDeque<Frame>,
    max_buffer_size: Option<usize>,
    max_frame_size: Option<u32>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            buffer: BytesMut::new(),
            state: DecodeState::AwaitingHeader,
            frames: VecDeque::new(),
            max_buffer_size: None,
            max_frame_size: None,
        }
    }
}

impl FrameDecoder {
    /// Create a new unbounded decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with the limits from `config`.
    #[must_use]
    pub fn with_config(config: &StreamConfig) -> Self {
        Self {
            max_buffer_size: config.max_buffer_size,
            max_frame_size: config.max_frame_size,
            ..Self::default()
        }
    }

    /// Feed bytes and decode every frame they complete.
    ///
    /// Frames decoded before an error stay queued.
    pub fn feed(&mut self, chunk: &[u8]) -> StreamResult<()> {
        self.buffer.extend_from_slice(chunk);

        loop {
            match self.state {
                DecodeState::AwaitingHeader => {
                    if self.buffer.len() < FrameHeader::LEN {
                        break;
                    }

                    let header = FrameHeader::parse(&self.buffer)?;
                    if let Some(max) = self.max_frame_size {
                        if header.length > max {
                            return Err(StreamError::protocol(format!(
                                "frame of {} bytes exceeds limit of {max}",
                                header.length
                            )));
                        }
                    }

                    self.buffer.advance(FrameHeader::LEN);
                    self.state = DecodeState::AwaitingPayload(header);
                }
                DecodeState::AwaitingPayload(header) => {
                    let length = header.length as usize;
                    if self.buffer.len() < length {
                        break;
                    }

                    let payload = self.buffer.split_to(length).freeze();
                    tracing::trace!(channel = %header.channel, len = length, "decoded frame");
                    self.frames.push_back(Frame {
                        channel: header.channel,
                        payload,
                    });
                    self.state = DecodeState::AwaitingHeader;
                }
            }
        }

        if let Some(limit) = self.max_buffer_size {
            if self.buffer.len() > limit {
                return Err(StreamError::BufferOverflow { limit });
            }
        }

        Ok(())
    }

    /// Call when the input ends.
    ///
    /// Ending anywhere but on a frame boundary is a protocol violation.
    pub fn finish(&mut self) -> StreamResult<()> {
        if self.is_idle() {
            return Ok(());
        }

        let pending = self.buffer.len();
        self.buffer.clear();
        self.state = DecodeState::AwaitingHeader;
        Err(StreamError::protocol(format!(
            "incomplete frame at stream end ({pending} bytes pending)"
        )))
    }

    /// Get the next decoded frame.
    pub fn next_frame(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /// Check if the decoder sits on a frame boundary with nothing buffered.
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::AwaitingHeader && self.buffer.is_empty()
    }

    /// Number of buffered bytes not yet part of a complete frame.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn drain(decoder: &mut FrameDecoder) -> Vec<Frame> {
        std::iter::from_fn(|| decoder.next_frame()).collect()
    }

    #[test]
    fn test_encode_wire_format() {
        let wire = encode_frame(Channel::Stderr, b"hi").unwrap();
        assert_eq!(&wire[..], &[2, 0, 0, 0, 0, 0, 0, 2, b'h', b'i']);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_oversized_payload_cannot_be_framed() {
        assert_eq!(frame_length(u32::MAX as usize), Ok(u32::MAX));

        let err = frame_length(u32::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, StreamError::ProtocolViolation(_)));
    }

    #[test]
    fn test_header_parse_ignores_reserved_bytes() {
        let header = FrameHeader::parse(&[1, 0xff, 0xff, 0xff, 0, 0, 1, 0]).unwrap();
        assert_eq!(header.channel, Channel::Stdout);
        assert_eq!(header.length, 256);
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    #[case(255)]
    fn test_invalid_channel_byte(#[case] byte: u8) {
        let err = Channel::try_from(byte).unwrap_err();
        assert!(err.is_protocol_error());

        let mut decoder = FrameDecoder::new();
        let err = decoder.feed(&[byte, 0, 0, 0, 0, 0, 0, 1, b'x']).unwrap_err();
        assert!(matches!(err, StreamError::ProtocolViolation(_)));
    }

    #[test]
    fn test_decode_byte_by_byte() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_frame(Channel::Stdout, b"out").unwrap());
        wire.extend_from_slice(&encode_frame(Channel::Stderr, b"err").unwrap());

        let mut decoder = FrameDecoder::new();
        for byte in &wire {
            decoder.feed(std::slice::from_ref(byte)).unwrap();
        }

        assert_eq!(
            drain(&mut decoder),
            vec![Frame::stdout("out"), Frame::stderr("err")]
        );
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_empty_payload() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&encode_frame(Channel::Stdout, b"").unwrap()).unwrap();
        assert_eq!(drain(&mut decoder), vec![Frame::stdout(Bytes::new())]);
        decoder.finish().unwrap();
    }

    #[rstest]
    #[case::partial_header(b"XX".to_vec(), 2)]
    #[case::partial_payload([&[1u8, 0, 0, 0, 0, 0, 0, 4][..], &b"ab"[..]].concat(), 2)]
    fn test_incomplete_frame_at_end(#[case] input: Vec<u8>, #[case] pending: usize) {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&input).unwrap();
        assert_eq!(decoder.pending_bytes(), pending);
        assert!(!decoder.is_idle());

        let err = decoder.finish().unwrap_err();
        assert_eq!(
            err,
            StreamError::ProtocolViolation(format!(
                "incomplete frame at stream end ({pending} bytes pending)"
            ))
        );
    }

    #[test]
    fn test_header_without_payload_is_incomplete() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[1, 0, 0, 0, 0, 0, 0, 4]).unwrap();
        assert_eq!(decoder.pending_bytes(), 0);
        assert!(decoder.finish().is_err());
    }

    #[test]
    fn test_frame_size_limit() {
        let config = StreamConfig::new().max_frame_size(4);
        let mut decoder = FrameDecoder::with_config(&config);
        decoder.feed(&encode_frame(Channel::Stdout, b"four").unwrap()).unwrap();

        let err = decoder
            .feed(&encode_frame(Channel::Stdout, b"fives").unwrap())
            .unwrap_err();
        assert!(matches!(err, StreamError::ProtocolViolation(_)));
        assert_eq!(drain(&mut decoder), vec![Frame::stdout("four")]);
    }

    #[test]
    fn test_buffer_limit() {
        let config = StreamConfig::new().max_buffer_size(4);
        let mut decoder = FrameDecoder::with_config(&config);
        let wire = encode_frame(Channel::Stderr, b"too long").unwrap();

        assert_eq!(
            decoder.feed(&wire[..FrameHeader::LEN + 5]),
            Err(StreamError::BufferOverflow { limit: 4 })
        );
    }
}
