//! TPCK frame type and serializer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Start-of-frame delimiter.
pub const SOF: u8 = 0xCA;

/// End-of-frame delimiter.
pub const EOF: u8 = 0x35;

/// Escape (stuffing) byte.
pub const ESC: u8 = 0x2F;

/// Maximum data length; the length travels in one byte.
pub const MAX_DATA_LEN: usize = u8::MAX as usize;

/// Compute the TPCK checksum over a frame's type and data.
#[must_use]
pub fn checksum(frame_type: u8, data: &[u8]) -> u8 {
    // data.len() <= 255 for every caller, so the truncation is exact.
    data.iter()
        .fold(frame_type.wrapping_add(data.len() as u8), |acc, b| {
            acc.wrapping_add(*b)
        })
}

#[inline]
fn is_reserved(b: u8) -> bool {
    matches!(b, SOF | EOF | ESC)
}

#[inline]
fn put_stuffed(dst: &mut BytesMut, b: u8) {
    if is_reserved(b) {
        dst.put_u8(ESC);
    }
    dst.put_u8(b);
}

/// One delimited, checksummed TPCK unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    frame_type: u8,
    data: Bytes,
}

impl Frame {
    /// Create a frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::DataTooLong`] if `data` exceeds 255 bytes.
    pub fn new(frame_type: u8, data: Vec<u8>) -> Result<Self, FrameError> {
        if data.len() > MAX_DATA_LEN {
            return Err(FrameError::DataTooLong(data.len()));
        }
        Ok(Self {
            frame_type,
            data: Bytes::from(data),
        })
    }

    /// The frame type byte.
    #[must_use]
    pub fn frame_type(&self) -> u8 {
        self.frame_type
    }

    /// The frame data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Checksum byte this frame carries on the wire.
    #[must_use]
    pub fn checksum(&self) -> u8 {
        checksum(self.frame_type, &self.data)
    }

    /// Serialize into `dst`, delimiters and stuffing included.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        // Worst case every content byte is escaped.
        dst.reserve(2 + 2 * (self.data.len() + 3));
        dst.put_u8(SOF);
        put_stuffed(dst, self.data.len() as u8);
        put_stuffed(dst, self.frame_type);
        for &b in self.data.iter() {
            put_stuffed(dst, b);
        }
        put_stuffed(dst, self.checksum());
        dst.put_u8(EOF);
    }

    /// Serialize to a standalone byte buffer.
    #[must_use]
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }
}
