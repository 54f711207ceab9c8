//! Client side of the bridge's text protocol.
//!
//! A [`BridgeClient`] connects to a running bridge, receives every packet the
//! device sends as one line each, and can send packets back to the device.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::config::host_defaults;
use crate::error::{BridgeError, Result};
use crate::packet::{Packet, PacketFormatter, TextFormatter};

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A connection to a bridge's TCP front-end.
pub struct BridgeClient {
    peer: SocketAddr,
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    formatter: Arc<dyn PacketFormatter>,
}

impl BridgeClient {
    /// Connect to a bridge.
    ///
    /// A missing host or port falls back to `TRPC_HOST` / `TRPC_PORT`, then to
    /// `localhost:55444`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Connect`] if the bridge cannot be reached within
    /// the connection timeout.
    #[instrument(skip_all)]
    pub async fn connect(host: Option<&str>, port: Option<u16>) -> Result<Self> {
        let (default_host, default_port) = host_defaults();
        let host = host.map_or(default_host, str::to_string);
        let port = port.unwrap_or(default_port);
        let address = if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };

        let stream = match timeout(DEFAULT_CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port)))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(address = %address, error = %e, "failed to connect to bridge");
                return Err(BridgeError::Connect {
                    address,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!(address = %address, "connection timeout");
                return Err(BridgeError::Connect {
                    address,
                    message: "connection timeout".to_string(),
                });
            }
        };

        Self::from_stream(stream)
    }

    /// Wrap an already connected stream.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Io`] if the peer address cannot be read.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        let (read, writer) = stream.into_split();
        info!(peer = %peer, "connected to bridge");
        Ok(Self {
            peer,
            lines: BufReader::new(read).lines(),
            writer,
            formatter: Arc::new(TextFormatter),
        })
    }

    /// Use a different line format.
    #[must_use]
    pub fn with_formatter(mut self, formatter: Arc<dyn PacketFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Wait for the next packet from the bridge.
    ///
    /// Empty lines are skipped. Returns `Ok(None)` once the bridge closes the
    /// connection.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Decode`] for a line that is not a packet; the client
    /// stays usable and the next call reads the following line.
    /// [`BridgeError::Io`] if the socket fails.
    pub async fn read_packet(&mut self) -> Result<Option<Packet>> {
        while let Some(line) = self.lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            return match self.formatter.parse(&line) {
                Ok(packet) => Ok(Some(packet)),
                Err(e) => {
                    debug!(peer = %self.peer, line = %line, error = %e, "undecodable line from bridge");
                    Err(e.into())
                }
            };
        }
        debug!(peer = %self.peer, "bridge closed the connection");
        Ok(None)
    }

    /// Send one packet to the device behind the bridge.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Io`] if the socket fails.
    pub async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let mut line = self.formatter.format(packet);
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Io`] if the write half cannot be shut down.
    pub async fn close(mut self) -> Result<()> {
        info!(peer = %self.peer, "closing bridge connection");
        self.writer.shutdown().await?;
        Ok(())
    }
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient").field("peer", &self.peer).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::packet::{Method, Service};
    use tokio::net::TcpListener;

    async fn pair() -> (BridgeClient, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = BridgeClient::connect(Some("127.0.0.1"), Some(addr.port()));
        let (client, accepted) = tokio::join!(client, listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_read_skips_blank_lines() {
        let (mut client, mut server) = pair().await;
        server
            .write_all(b"\n\r\nReport DateTime <01>\n")
            .await
            .unwrap();
        drop(server);

        let packet = client.read_packet().await.unwrap().unwrap();
        assert_eq!(packet.service(), Service::Report);
        assert_eq!(packet.method(), Method::DateTime);
        assert!(client.read_packet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_line_then_good_line() {
        let (mut client, mut server) = pair().await;
        server
            .write_all(b"garbage\nUpdate NullMethod <>\n")
            .await
            .unwrap();

        assert!(matches!(
            client.read_packet().await,
            Err(BridgeError::Decode(DecodeError::UnknownService(_)))
        ));
        let packet = client.read_packet().await.unwrap().unwrap();
        assert_eq!(packet, Packet::new(Service::Update, Method::NullMethod));
    }

    #[tokio::test]
    async fn test_write_appends_newline() {
        let (mut client, server) = pair().await;
        client
            .write_packet(&Packet::new(Service::Request, Method::CurrentTemp))
            .await
            .unwrap();
        client.close().await.unwrap();

        let mut lines = BufReader::new(server).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, "Request          CurrentTemp      <>");
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = BridgeClient::connect(Some("127.0.0.1"), Some(port))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Connect { ref address, .. } if address == &format!("127.0.0.1:{port}")));
    }
}
