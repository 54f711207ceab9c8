//! The bridge loop: sole owner of the serial transport.
//!
//! Each iteration reads a bounded chunk from the serial port, turns complete
//! frames into text lines for every write-ready client, forwards lines from
//! read-ready clients to the port as frames, and evicts clients whose socket
//! failed. Client I/O is multiplexed in this one task through a single
//! readiness wait per iteration; no task is spawned per client.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{select_all, FutureExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, Interest, Ready};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, DecodeError, PacketError, Result};
use crate::metrics::{BridgeMetrics, RejectReason};
use crate::packet::{Packet, PacketFormatter, TextFormatter};
use crate::tpck::{Frame, FrameParser};

use super::connection::{Connection, ConnectionId};
use super::registry::ConnectionRegistry;

/// Sizes and timeouts for one bridge iteration.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub read_size: usize,
    pub read_timeout: Duration,
    pub poll_timeout: Duration,
    pub recv_size: usize,
    pub write_timeout: Duration,
}

impl BridgeSettings {
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            read_size: config.serial.read_size,
            read_timeout: config.serial.read_timeout(),
            poll_timeout: config.bridge.poll_timeout(),
            recv_size: config.bridge.recv_size,
            write_timeout: config.bridge.write_timeout(),
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

/// Relay between one serial transport and the registered clients.
pub struct Bridge<S> {
    serial: S,
    parser: FrameParser,
    registry: ConnectionRegistry,
    formatter: Arc<dyn PacketFormatter>,
    metrics: Arc<BridgeMetrics>,
    settings: BridgeSettings,
    reported_failures: u64,
}

impl<S> Bridge<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a bridge over `serial` using the default text formatter.
    pub fn new(serial: S, registry: ConnectionRegistry, settings: BridgeSettings) -> Self {
        Self {
            serial,
            parser: FrameParser::new(),
            registry,
            formatter: Arc::new(TextFormatter),
            metrics: Arc::new(BridgeMetrics::new()),
            settings,
            reported_failures: 0,
        }
    }

    #[must_use]
    pub fn with_formatter(mut self, formatter: Arc<dyn PacketFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<BridgeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Spawn the loop on the current runtime.
    pub fn start(self) -> BridgeHandle {
        let running = Arc::new(AtomicBool::new(true));
        let finished = CancellationToken::new();

        let task = tokio::spawn(self.run(Arc::clone(&running), finished.clone()));

        BridgeHandle {
            running,
            finished,
            task: Mutex::new(Some(task)),
        }
    }

    async fn run(mut self, running: Arc<AtomicBool>, finished: CancellationToken) -> Result<()> {
        info!(
            read_size = self.settings.read_size,
            poll_timeout_ms = self.settings.poll_timeout.as_millis() as u64,
            "bridge loop started"
        );

        let mut outcome = Ok(());
        while running.load(Ordering::Acquire) {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "bridge loop failed");
                running.store(false, Ordering::Release);
                outcome = Err(e);
            }
        }

        info!("serial port closing");
        if let Err(e) = self.serial.shutdown().await {
            debug!(error = %e, "serial shutdown failed");
        }
        finished.cancel();
        outcome
    }

    /// Run a single iteration of the loop.
    ///
    /// # Errors
    ///
    /// Only serial transport failures are returned; client failures evict
    /// the client.
    pub async fn run_once(&mut self) -> Result<()> {
        let outbound = self.read_serial().await?;

        let connections = self.registry.snapshot();
        let readiness = wait_ready(&connections, self.settings.poll_timeout).await;

        let mut failed: Vec<ConnectionId> = Vec::new();
        for (conn, ready) in connections.iter().zip(&readiness) {
            if ready.is_readable() && !self.receive(conn).await? {
                failed.push(conn.id());
            }
        }

        if !outbound.is_empty() {
            for (conn, ready) in connections.iter().zip(&readiness) {
                if !ready.is_writable() || failed.contains(&conn.id()) {
                    continue;
                }
                match tokio::time::timeout(
                    self.settings.write_timeout,
                    send_all(conn.stream(), outbound.as_bytes()),
                )
                .await
                {
                    Ok(Ok(())) => self.metrics.record_client_sent(outbound.len()),
                    Ok(Err(e)) => {
                        warn!(connection_id = %conn.id(), peer = %conn.peer(), error = %e, "send failed");
                        failed.push(conn.id());
                    }
                    Err(_) => {
                        warn!(connection_id = %conn.id(), peer = %conn.peer(), "send timed out");
                        failed.push(conn.id());
                    }
                }
            }
        }

        let removed = self.registry.evict(&failed);
        self.metrics.record_removed(removed);
        self.metrics.set_active_connections(self.registry.len());
        Ok(())
    }

    /// Read one chunk from the serial port and render every packet it
    /// completes as newline-terminated text.
    async fn read_serial(&mut self) -> Result<String> {
        let mut buf = vec![0u8; self.settings.read_size];
        let n = match tokio::time::timeout(self.settings.read_timeout, self.serial.read(&mut buf))
            .await
        {
            Err(_) => 0,
            Ok(Ok(0)) => return Err(BridgeError::SerialClosed),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(BridgeError::Serial(e)),
        };

        let mut outbound = String::new();
        if n == 0 {
            return Ok(outbound);
        }
        trace!(bytes = n, "serial read");
        self.metrics.record_serial_received(n);

        let frames = self.parser.push(&buf[..n]);
        let failures = self.parser.checksum_failures();
        if failures > self.reported_failures {
            self.metrics
                .record_checksum_failures(failures - self.reported_failures);
            self.reported_failures = failures;
        }

        for frame in frames {
            self.metrics.record_frame();
            match Packet::try_from(&frame) {
                Ok(packet) => {
                    outbound.push_str(&self.formatter.format(&packet));
                    outbound.push('\n');
                }
                Err(PacketError::WrongFrameType(frame_type)) => {
                    debug!(frame_type, "ignoring non-tRPC frame");
                    self.metrics.record_rejected(RejectReason::WrongType);
                }
                Err(e) => {
                    warn!(error = %e, "dropping undecodable packet");
                    self.metrics.record_rejected(RejectReason::InvalidPacket);
                }
            }
        }
        Ok(outbound)
    }

    /// Receive from one read-ready client and forward its lines to the
    /// serial port. Returns `false` if the client should be evicted.
    async fn receive(&mut self, conn: &Connection) -> Result<bool> {
        let mut buf = vec![0u8; self.settings.recv_size];
        let n = match conn.stream().try_read(&mut buf) {
            Ok(0) => {
                debug!(connection_id = %conn.id(), peer = %conn.peer(), "client closed");
                return Ok(false);
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
            Err(e) => {
                warn!(connection_id = %conn.id(), peer = %conn.peer(), error = %e, "receive failed");
                return Ok(false);
            }
        };

        for line in buf[..n].split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            match self.decode_line(line) {
                Ok(frame) => {
                    let bytes = frame.serialize();
                    self.serial
                        .write_all(&bytes)
                        .await
                        .map_err(BridgeError::Serial)?;
                    self.serial.flush().await.map_err(BridgeError::Serial)?;
                    self.metrics.record_serial_sent(bytes.len());
                    self.metrics.record_line_forwarded();
                }
                Err(e) => {
                    warn!(
                        connection_id = %conn.id(),
                        peer = %conn.peer(),
                        error = %e,
                        line = %String::from_utf8_lossy(line),
                        "dropping client line"
                    );
                    self.metrics.record_decode_error();
                }
            }
        }
        Ok(true)
    }

    fn decode_line(&self, line: &[u8]) -> std::result::Result<Frame, DecodeError> {
        let text = std::str::from_utf8(line).map_err(|_| DecodeError::InvalidUtf8)?;
        let packet = self.formatter.parse(text)?;
        Ok(packet.to_frame()?)
    }
}

/// Readiness of every connection, after waiting at most `timeout` for the
/// first one to become ready. Empty for no connections.
async fn wait_ready(connections: &[Connection], timeout: Duration) -> Vec<Ready> {
    if connections.is_empty() {
        return Vec::new();
    }
    let interest = Interest::READABLE | Interest::WRITABLE;

    let any = select_all(
        connections
            .iter()
            .map(|c| Box::pin(c.stream().ready(interest))),
    );
    if tokio::time::timeout(timeout, any).await.is_err() {
        return vec![Ready::EMPTY; connections.len()];
    }

    connections
        .iter()
        .map(|c| match c.stream().ready(interest).now_or_never() {
            Some(Ok(ready)) => ready,
            // An error surfaces on the following read.
            Some(Err(_)) => Ready::READABLE,
            None => Ready::EMPTY,
        })
        .collect()
}

async fn send_all(stream: &TcpStream, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        stream.writable().await?;
        match stream.try_write(buf) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Control handle for a running bridge loop.
#[derive(Debug)]
pub struct BridgeHandle {
    running: Arc<AtomicBool>,
    finished: CancellationToken,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl BridgeHandle {
    /// Whether the loop is still iterating.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.finished.is_cancelled()
    }

    /// Resolves once the loop has exited, whether stopped or failed.
    pub async fn finished(&self) {
        self.finished.cancelled().await;
    }

    /// Ask the loop to stop and wait for it to exit.
    ///
    /// Returns the error that ended the loop, if it failed on its own.
    /// Later calls return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns the serial failure that terminated the loop, or
    /// [`BridgeError::TaskFailed`] if the task panicked.
    pub async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match task {
            Some(task) => task
                .await
                .map_err(|e| BridgeError::TaskFailed(e.to_string()))?,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Method, Service};
    use tokio::io::{duplex, AsyncBufReadExt, BufReader, DuplexStream};
    use tokio::net::TcpListener;

    fn fast_settings() -> BridgeSettings {
        BridgeSettings {
            read_size: 100,
            read_timeout: Duration::from_millis(10),
            poll_timeout: Duration::from_millis(10),
            recv_size: 1024,
            write_timeout: Duration::from_millis(500),
        }
    }

    async fn client_pair(registry: &ConnectionRegistry) -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        registry.insert(Connection::new(server, peer));
        client
    }

    fn bridge(registry: &ConnectionRegistry) -> (Bridge<DuplexStream>, DuplexStream) {
        let (serial, device) = duplex(4096);
        (Bridge::new(serial, registry.clone(), fast_settings()), device)
    }

    #[tokio::test]
    async fn test_serial_frame_reaches_client() {
        let registry = ConnectionRegistry::new();
        let (mut bridge, mut device) = bridge(&registry);
        let client = client_pair(&registry).await;

        let mut packet = Packet::new(Service::Report, Method::CurrentTemp);
        packet.set_address(1).unwrap();
        device
            .write_all(&packet.to_frame().unwrap().serialize())
            .await
            .unwrap();

        bridge.run_once().await.unwrap();

        let mut lines = BufReader::new(client).lines();
        let line = tokio::time::timeout(Duration::from_secs(1), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(TextFormatter.parse(&line), Ok(packet));
        assert_eq!(bridge.metrics.frames_received.get(), 1);
    }

    #[tokio::test]
    async fn test_client_line_reaches_serial() {
        let registry = ConnectionRegistry::new();
        let (mut bridge, mut device) = bridge(&registry);
        let mut client = client_pair(&registry).await;

        client
            .write_all(b"Update HeatSetpoint <0100074A>\r\nbogus\n\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        bridge.run_once().await.unwrap();

        let mut expected = Packet::new(Service::Update, Method::HeatSetpoint);
        expected.set_address(1).unwrap();
        expected.set_setpoint(0x4A).unwrap();
        let expected = expected.to_frame().unwrap().serialize();

        let mut buf = vec![0u8; expected.len()];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], &expected[..]);
        assert_eq!(bridge.metrics.lines_forwarded.get(), 1);
        assert_eq!(bridge.metrics.decode_errors.get(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_client_evicted() {
        let registry = ConnectionRegistry::new();
        let (mut bridge, _device) = bridge(&registry);
        let client = client_pair(&registry).await;
        let _other = client_pair(&registry).await;
        drop(client);
        tokio::time::sleep(Duration::from_millis(20)).await;

        bridge.run_once().await.unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(bridge.metrics.connections_removed.get(), 1);
    }

    #[tokio::test]
    async fn test_checksum_failures_counted() {
        let registry = ConnectionRegistry::new();
        let (mut bridge, mut device) = bridge(&registry);

        let mut bytes = Packet::new(Service::Update, Method::NullMethod)
            .to_frame()
            .unwrap()
            .serialize()
            .to_vec();
        bytes[3] ^= 0x01;
        device.write_all(&bytes).await.unwrap();

        bridge.run_once().await.unwrap();
        assert_eq!(bridge.metrics.checksum_failures.get(), 1);
        assert_eq!(bridge.metrics.frames_received.get(), 0);
    }

    #[tokio::test]
    async fn test_non_trpc_frame_rejected() {
        let registry = ConnectionRegistry::new();
        let (mut bridge, mut device) = bridge(&registry);

        let frame = Frame::new(3, vec![1, 2]).unwrap();
        device.write_all(&frame.serialize()).await.unwrap();
        bridge.run_once().await.unwrap();

        let output = bridge.metrics.encode().unwrap();
        assert!(output.contains(r#"reason="wrong_type"} 1"#));
    }

    #[tokio::test]
    async fn test_serial_eof_is_fatal() {
        let registry = ConnectionRegistry::new();
        let (mut bridge, device) = bridge(&registry);
        drop(device);
        assert!(matches!(
            bridge.run_once().await,
            Err(BridgeError::SerialClosed)
        ));
    }

    #[tokio::test]
    async fn test_stop_and_self_exit() {
        let registry = ConnectionRegistry::new();
        let (bridge, device) = bridge(&registry);
        let handle = bridge.start();
        assert!(handle.is_running());

        drop(device);
        tokio::time::timeout(Duration::from_secs(1), handle.finished())
            .await
            .unwrap();
        assert!(!handle.is_running());
        assert!(matches!(handle.stop().await, Err(BridgeError::SerialClosed)));
        assert!(handle.stop().await.is_ok());

        let (bridge, _device) = self::bridge(&registry);
        let handle = bridge.start();
        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .unwrap()
            .unwrap();
        assert!(!handle.is_running());
    }
}
