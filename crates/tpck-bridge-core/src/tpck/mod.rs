//! TPCK framing protocol.
//!
//! A frame on the wire is:
//!
//! ```text
//! 0xCA [len] [type] [data...] [checksum] 0x35
//! ```
//!
//! Every byte between the delimiters is stuffed: a literal `0xCA`, `0x35` or
//! `0x2F` is preceded by the escape byte `0x2F`. The checksum is
//! `(type + len + sum(data)) mod 256`.
//!
//! - [`Frame`] - one checksummed unit, plus its serializer
//! - [`FrameParser`] - streaming parser over arbitrarily fragmented input
//! - [`TpckCodec`] - `tokio_util` codec wrapping both

pub mod codec;
pub mod frame;
pub mod parser;

pub use codec::TpckCodec;
pub use frame::{checksum, Frame, EOF, ESC, MAX_DATA_LEN, SOF};
pub use parser::FrameParser;
