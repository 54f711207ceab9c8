//! Streaming TPCK parser.
//!
//! The parser is fed consecutive chunks of any size (including empty ones)
//! and yields every frame completed by those bytes. Frames can be split across
//! chunk boundaries at any byte, including between an escape byte and the
//! literal it protects.
//!
//! A start-of-frame byte always resynchronizes: whatever was being accumulated
//! is abandoned. Frames failing the checksum, or ending before their checksum
//! byte, are dropped and counted in [`FrameParser::checksum_failures`].

use tracing::debug;

use super::frame::{checksum, Frame, EOF, ESC, SOF};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between frames; only SOF is meaningful.
    Idle,
    /// After SOF, accumulating stuffed content.
    Receiving,
}

/// Incremental TPCK frame parser.
///
/// Owned by the single task reading the stream it parses.
#[derive(Debug)]
pub struct FrameParser {
    state: State,
    /// Count of content bytes consumed since SOF.
    position: usize,
    declared_len: u8,
    frame_type: u8,
    data: Vec<u8>,
    checksum: u8,
    escape_pending: bool,
    checksum_failures: u64,
}

impl FrameParser {
    /// Create a parser in the idle state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            position: 0,
            declared_len: 0,
            frame_type: 0,
            data: Vec::new(),
            checksum: 0,
            escape_pending: false,
            checksum_failures: 0,
        }
    }

    /// Abandon any partial frame and return to idle.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.clear_accumulator();
    }

    /// Number of frames dropped because they failed validation.
    #[must_use]
    pub fn checksum_failures(&self) -> u64 {
        self.checksum_failures
    }

    /// Whether a frame is currently being accumulated.
    #[must_use]
    pub fn in_frame(&self) -> bool {
        self.state == State::Receiving
    }

    /// Feed a chunk, returning every frame it completes in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&b| self.push_byte(b)).collect()
    }

    /// Feed a single byte.
    pub fn push_byte(&mut self, b: u8) -> Option<Frame> {
        if self.escape_pending {
            self.escape_pending = false;
            self.consume(b);
            return None;
        }

        match b {
            SOF => {
                if self.state == State::Receiving && self.position > 0 {
                    debug!(position = self.position, "start of frame inside frame, resyncing");
                }
                self.clear_accumulator();
                self.state = State::Receiving;
                None
            }
            _ if self.state == State::Idle => None,
            ESC => {
                self.escape_pending = true;
                None
            }
            EOF => self.complete(),
            _ => {
                self.consume(b);
                None
            }
        }
    }

    fn consume(&mut self, b: u8) {
        let len = usize::from(self.declared_len);
        match self.position {
            0 => self.declared_len = b,
            1 => self.frame_type = b,
            p if p < len + 2 => self.data.push(b),
            p if p == len + 2 => self.checksum = b,
            // Bytes past the checksum are counted but not kept.
            _ => {}
        }
        self.position += 1;
    }

    /// Finish the frame at an end marker.
    ///
    /// A frame must have reached its checksum position to be emitted. A
    /// literal reading of the stream rules would emit whatever was collected,
    /// so `CA 35` would give an empty frame of type 0; here it is dropped and
    /// counted as a checksum failure instead.
    fn complete(&mut self) -> Option<Frame> {
        let complete = self.position >= usize::from(self.declared_len) + 3;
        let expected = checksum(self.frame_type, &self.data);

        let frame = if complete && expected == self.checksum {
            // data never exceeds the single-byte declared length
            Frame::new(self.frame_type, std::mem::take(&mut self.data)).ok()
        } else {
            self.checksum_failures += 1;
            debug!(
                frame_type = self.frame_type,
                declared_len = self.declared_len,
                received = self.position,
                expected = expected,
                actual = self.checksum,
                "dropping invalid frame"
            );
            None
        };

        self.reset();
        frame
    }

    fn clear_accumulator(&mut self) {
        self.position = 0;
        self.declared_len = 0;
        self.frame_type = 0;
        self.data.clear();
        self.checksum = 0;
        self.escape_pending = false;
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_frame() -> impl Strategy<Value = Frame> {
        (any::<u8>(), proptest::collection::vec(any::<u8>(), 0..=255))
            .prop_map(|(t, data)| Frame::new(t, data).unwrap())
    }

    proptest! {
        /// parse(serialize(frame)) yields exactly that frame.
        #[test]
        fn prop_round_trip(f in arb_frame()) {
            let mut parser = FrameParser::new();
            prop_assert_eq!(parser.push(&f.serialize()), vec![f]);
        }

        /// Any chunking of the wire bytes parses identically.
        #[test]
        fn prop_fragmentation_invariance(
            f in arb_frame(),
            cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..12)
        ) {
            let bytes = f.serialize();
            let mut points: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len())).collect();
            points.push(0);
            points.push(bytes.len());
            points.sort_unstable();
            points.dedup();

            let mut parser = FrameParser::new();
            let mut out = Vec::new();
            for w in points.windows(2) {
                out.extend(parser.push(&bytes[w[0]..w[1]]));
            }
            prop_assert_eq!(out, vec![f]);
        }

        /// Reserved bytes only appear escaped inside the delimiters.
        #[test]
        fn prop_escaping(f in arb_frame()) {
            let bytes = f.serialize();
            prop_assert_eq!(bytes[0], SOF);
            prop_assert_eq!(bytes[bytes.len() - 1], EOF);

            let inner = &bytes[1..bytes.len() - 1];
            let mut i = 0;
            while i < inner.len() {
                if inner[i] == ESC {
                    prop_assert!(i + 1 < inner.len());
                    prop_assert!(matches!(inner[i + 1], SOF | EOF | ESC));
                    i += 2;
                } else {
                    prop_assert!(inner[i] != SOF && inner[i] != EOF);
                    i += 1;
                }
            }
        }

        /// Garbage without a start marker never produces a frame ahead of a real one.
        #[test]
        fn prop_resync_after_garbage(
            garbage in proptest::collection::vec(any::<u8>().prop_filter("no SOF", |b| *b != SOF), 0..64),
            f in arb_frame()
        ) {
            let mut stream = garbage;
            stream.extend_from_slice(&f.serialize());
            let mut parser = FrameParser::new();
            prop_assert_eq!(parser.push(&stream), vec![f]);
        }
    }
}
