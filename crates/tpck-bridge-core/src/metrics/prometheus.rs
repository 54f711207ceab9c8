//! Prometheus metrics for the serial bridge.
//!
//! Counters cover both directions of the relay plus the two ways data is
//! lost on purpose: frames failing their checksum and client lines that do
//! not decode.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Why a valid TPCK frame was not forwarded to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Frame type is not the tRPC type.
    WrongType,
    /// Frame carries a tRPC header the packet model refuses.
    InvalidPacket,
}

impl RejectReason {
    fn label(self) -> &'static str {
        match self {
            Self::WrongType => "wrong_type",
            Self::InvalidPacket => "invalid_packet",
        }
    }
}

/// Bridge metrics collection.
pub struct BridgeMetrics {
    /// The Prometheus registry.
    pub registry: Registry,

    /// Valid frames parsed from the serial transport.
    pub frames_received: IntCounter,

    /// Frames dropped by the parser (bad checksum or truncated).
    pub checksum_failures: IntCounter,

    /// Valid frames that did not become packets, by reason.
    pub frames_rejected: IntCounterVec,

    /// Client lines written to the serial transport as frames.
    pub lines_forwarded: IntCounter,

    /// Client lines dropped because they did not decode.
    pub decode_errors: IntCounter,

    pub serial_bytes_received: IntCounter,
    pub serial_bytes_sent: IntCounter,

    /// Bytes of packet text sent to clients, summed over clients.
    pub client_bytes_sent: IntCounter,

    /// Connections currently in the registry.
    pub active_connections: IntGauge,

    /// Connections removed by the bridge after an I/O failure.
    pub connections_removed: IntCounter,
}

fn counter(name: &str, help: &str) -> IntCounter {
    IntCounter::new(name, help).expect("metric creation should succeed")
}

impl BridgeMetrics {
    /// Create a new metrics collection.
    ///
    /// # Panics
    ///
    /// Panics if metric registration fails (should not happen with unique names).
    #[must_use]
    pub fn new() -> Self {
        let registry = Registry::new();

        let frames_received = counter(
            "tpck_bridge_frames_received_total",
            "Total valid TPCK frames received from the serial transport",
        );
        let checksum_failures = counter(
            "tpck_bridge_checksum_failures_total",
            "Total TPCK frames dropped for a bad checksum or truncation",
        );
        let frames_rejected = IntCounterVec::new(
            Opts::new(
                "tpck_bridge_frames_rejected_total",
                "Total valid frames not forwarded to clients by reason",
            ),
            &["reason"],
        )
        .expect("metric creation should succeed");
        let lines_forwarded = counter(
            "tpck_bridge_lines_forwarded_total",
            "Total client lines forwarded to the serial transport",
        );
        let decode_errors = counter(
            "tpck_bridge_decode_errors_total",
            "Total client lines dropped because they did not decode",
        );
        let serial_bytes_received = counter(
            "tpck_bridge_serial_bytes_received_total",
            "Total bytes read from the serial transport",
        );
        let serial_bytes_sent = counter(
            "tpck_bridge_serial_bytes_sent_total",
            "Total bytes written to the serial transport",
        );
        let client_bytes_sent = counter(
            "tpck_bridge_client_bytes_sent_total",
            "Total bytes sent to TCP clients",
        );
        let active_connections = IntGauge::new(
            "tpck_bridge_active_connections",
            "Current number of registered client connections",
        )
        .expect("metric creation should succeed");
        let connections_removed = counter(
            "tpck_bridge_connections_removed_total",
            "Total client connections removed after an I/O failure",
        );

        let collectors: [Box<dyn prometheus::core::Collector>; 10] = [
            Box::new(frames_received.clone()),
            Box::new(checksum_failures.clone()),
            Box::new(frames_rejected.clone()),
            Box::new(lines_forwarded.clone()),
            Box::new(decode_errors.clone()),
            Box::new(serial_bytes_received.clone()),
            Box::new(serial_bytes_sent.clone()),
            Box::new(client_bytes_sent.clone()),
            Box::new(active_connections.clone()),
            Box::new(connections_removed.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .expect("metric registration should succeed");
        }

        Self {
            registry,
            frames_received,
            checksum_failures,
            frames_rejected,
            lines_forwarded,
            decode_errors,
            serial_bytes_received,
            serial_bytes_sent,
            client_bytes_sent,
            active_connections,
            connections_removed,
        }
    }

    pub fn record_frame(&self) {
        self.frames_received.inc();
    }

    pub fn record_checksum_failures(&self, count: u64) {
        self.checksum_failures.inc_by(count);
    }

    pub fn record_rejected(&self, reason: RejectReason) {
        self.frames_rejected
            .with_label_values(&[reason.label()])
            .inc();
    }

    pub fn record_line_forwarded(&self) {
        self.lines_forwarded.inc();
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.inc();
    }

    pub fn record_serial_received(&self, bytes: usize) {
        self.serial_bytes_received.inc_by(bytes as u64);
    }

    pub fn record_serial_sent(&self, bytes: usize) {
        self.serial_bytes_sent.inc_by(bytes as u64);
    }

    pub fn record_client_sent(&self, bytes: usize) {
        self.client_bytes_sent.inc_by(bytes as u64);
    }

    /// Set the registered connection count.
    pub fn set_active_connections(&self, count: usize) {
        self.active_connections
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn record_removed(&self, count: usize) {
        self.connections_removed.inc_by(count as u64);
    }

    /// Encode metrics in Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = String::new();
        encoder.encode_utf8(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = BridgeMetrics::new();
        assert!(metrics.encode().is_ok());
    }

    #[test]
    fn test_frame_counters() {
        let metrics = BridgeMetrics::new();
        metrics.record_frame();
        metrics.record_frame();
        metrics.record_checksum_failures(3);

        assert_eq!(metrics.frames_received.get(), 2);
        let output = metrics.encode().unwrap();
        assert!(output.contains("tpck_bridge_frames_received_total 2"));
        assert!(output.contains("tpck_bridge_checksum_failures_total 3"));
    }

    #[test]
    fn test_rejected_by_reason() {
        let metrics = BridgeMetrics::new();
        metrics.record_rejected(RejectReason::WrongType);
        metrics.record_rejected(RejectReason::InvalidPacket);
        metrics.record_rejected(RejectReason::InvalidPacket);

        let output = metrics.encode().unwrap();
        assert!(output.contains(r#"tpck_bridge_frames_rejected_total{reason="wrong_type"} 1"#));
        assert!(output.contains(r#"tpck_bridge_frames_rejected_total{reason="invalid_packet"} 2"#));
    }

    #[test]
    fn test_connection_gauge() {
        let metrics = BridgeMetrics::new();
        metrics.set_active_connections(3);
        metrics.set_active_connections(2);
        metrics.record_removed(1);

        assert_eq!(metrics.active_connections.get(), 2);
        assert_eq!(metrics.connections_removed.get(), 1);
    }

    #[test]
    fn test_byte_counters() {
        let metrics = BridgeMetrics::new();
        metrics.record_serial_received(100);
        metrics.record_serial_sent(12);
        metrics.record_client_sent(40);

        let output = metrics.encode().unwrap();
        assert!(output.contains("tpck_bridge_serial_bytes_received_total 100"));
        assert!(output.contains("tpck_bridge_serial_bytes_sent_total 12"));
        assert!(output.contains("tpck_bridge_client_bytes_sent_total 40"));
    }
}
