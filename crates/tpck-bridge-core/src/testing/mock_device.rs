//! Mock serial device for integration testing.
//!
//! Holds the device end of an in-memory duplex pipe whose other end is the
//! bridge's serial transport. Speaks TPCK through [`TpckCodec`], so frames
//! written here arrive at the bridge exactly as a device would send them.

use std::io;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::codec::Framed;

use crate::packet::Packet;
use crate::tpck::{Frame, TpckCodec};

/// The device side of a simulated serial link.
pub struct MockDevice {
    framed: Framed<DuplexStream, TpckCodec>,
}

impl MockDevice {
    /// Wrap the device end of a duplex pipe.
    #[must_use]
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            framed: Framed::new(stream, TpckCodec::new()),
        }
    }

    /// Send one frame to the bridge.
    pub async fn send_frame(&mut self, frame: Frame) -> io::Result<()> {
        self.framed.send(frame).await
    }

    /// Send one packet to the bridge.
    pub async fn send_packet(&mut self, packet: &Packet) -> io::Result<()> {
        let frame = packet
            .to_frame()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.send_frame(frame).await
    }

    /// Write bytes as-is, bypassing the encoder.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await?;
        stream.flush().await
    }

    /// Next frame the bridge wrote, or `None` on timeout or end of stream.
    pub async fn next_frame(&mut self, wait: Duration) -> Option<Frame> {
        match tokio::time::timeout(wait, self.framed.next()).await {
            Ok(Some(Ok(frame))) => Some(frame),
            _ => None,
        }
    }

    /// Next frame the bridge wrote, decoded as a packet.
    pub async fn next_packet(&mut self, wait: Duration) -> Option<Packet> {
        let frame = self.next_frame(wait).await?;
        Packet::try_from(&frame).ok()
    }

    /// Frames received with a bad checksum so far.
    #[must_use]
    pub fn checksum_failures(&self) -> u64 {
        self.framed.codec().checksum_failures()
    }
}
