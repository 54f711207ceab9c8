//! TPCK frame codec.
//!
//! Implements tokio's `Decoder` and `Encoder` traits over [`FrameParser`] and
//! [`Frame::encode_into`], so a byte stream can be wrapped in
//! `tokio_util::codec::Framed`.

use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use super::frame::Frame;
use super::parser::FrameParser;

/// Codec for TPCK frames.
///
/// Unlike a length-prefixed codec, decoding never needs to wait for a
/// declared size: every byte is consumed as it is seen and the parser keeps
/// whatever partial frame is in progress.
#[derive(Debug, Default)]
pub struct TpckCodec {
    parser: FrameParser,
}

impl TpckCodec {
    /// Create a new codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames dropped by the decoder so far.
    #[must_use]
    pub fn checksum_failures(&self) -> u64 {
        self.parser.checksum_failures()
    }
}

impl Decoder for TpckCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while src.has_remaining() {
            let b = src.get_u8();
            if let Some(frame) = self.parser.push_byte(b) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

impl Encoder<Frame> for TpckCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}
