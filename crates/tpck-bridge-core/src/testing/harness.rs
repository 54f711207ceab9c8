//! Test harness for integration testing of the serial bridge.
//!
//! Provides a complete test environment with:
//! - A running bridge whose serial transport is an in-memory pipe
//! - A [`MockDevice`] on the other end of that pipe
//! - A listener on an ephemeral loopback port
//! - Helpers for connecting clients and waiting on the registry

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::duplex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::ListenConfig;
use crate::error::Result;
use crate::metrics::BridgeMetrics;
use crate::network::{
    Bridge, BridgeClient, BridgeHandle, BridgeListener, BridgeSettings, ConnectionRegistry,
};

use super::mock_device::MockDevice;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Test harness for integration testing.
pub struct BridgeTestHarness {
    /// Device end of the serial link.
    pub device: MockDevice,
    /// The registry shared by listener and bridge.
    pub registry: ConnectionRegistry,
    /// Metrics recorded by the bridge.
    pub metrics: Arc<BridgeMetrics>,
    /// The running bridge.
    pub bridge: Arc<BridgeHandle>,
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    listener_task: Option<JoinHandle<Result<()>>>,
}

impl BridgeTestHarness {
    /// Create a harness with short timeouts.
    pub async fn new() -> Self {
        TestHarnessBuilder::new().build().await
    }

    /// Address clients connect to.
    #[must_use]
    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    /// Connect a client and wait until the registry holds it.
    pub async fn connect_client(&self) -> TcpStream {
        let expected = self.registry.len() + 1;
        let stream = TcpStream::connect(self.addr)
            .await
            .expect("Failed to connect to bridge");
        self.wait_for_connections(expected).await;
        stream
    }

    /// Connect a [`BridgeClient`] and wait until the registry holds it.
    pub async fn connect_bridge_client(&self) -> BridgeClient {
        let expected = self.registry.len() + 1;
        let client = BridgeClient::connect(Some("127.0.0.1"), Some(self.addr.port()))
            .await
            .expect("Failed to connect to bridge");
        self.wait_for_connections(expected).await;
        client
    }

    /// Wait until the registry holds exactly `n` connections.
    ///
    /// # Panics
    ///
    /// Panics if that does not happen within two seconds.
    pub async fn wait_for_connections(&self, n: usize) {
        let registry = self.registry.clone();
        tokio::time::timeout(Duration::from_secs(2), async move {
            while registry.len() != n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {n} connections, registry has {}",
                self.registry.len()
            )
        });
    }

    /// Request shutdown and return what the listener returned.
    ///
    /// # Panics
    ///
    /// Panics if the listener task panicked.
    pub async fn shutdown(&mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        self.join_listener().await
    }

    /// Wait for the listener to exit on its own.
    ///
    /// # Panics
    ///
    /// Panics if the listener task panicked.
    pub async fn join_listener(&mut self) -> Result<()> {
        match self.listener_task.take() {
            Some(task) => task.await.expect("listener task panicked"),
            None => Ok(()),
        }
    }
}

/// Builder for creating a test harness with specific bridge settings.
pub struct TestHarnessBuilder {
    settings: BridgeSettings,
}

impl TestHarnessBuilder {
    /// Create a new builder with fast timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: BridgeSettings {
                read_timeout: Duration::from_millis(10),
                poll_timeout: Duration::from_millis(10),
                write_timeout: Duration::from_millis(500),
                ..BridgeSettings::default()
            },
        }
    }

    /// Set the serial read chunk size.
    #[must_use]
    pub fn read_size(mut self, bytes: usize) -> Self {
        self.settings.read_size = bytes;
        self
    }

    /// Set the per-client receive size.
    #[must_use]
    pub fn recv_size(mut self, bytes: usize) -> Self {
        self.settings.recv_size = bytes;
        self
    }

    /// Set the readiness-check timeout.
    #[must_use]
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.settings.poll_timeout = timeout;
        self
    }

    /// Build the test harness.
    ///
    /// # Panics
    ///
    /// Panics if no loopback port can be bound.
    pub async fn build(self) -> BridgeTestHarness {
        let (serial, device_end) = duplex(PIPE_CAPACITY);
        let registry = ConnectionRegistry::new();
        let metrics = Arc::new(BridgeMetrics::new());

        let bridge = Arc::new(
            Bridge::new(serial, registry.clone(), self.settings)
                .with_metrics(Arc::clone(&metrics))
                .start(),
        );

        let tcp = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = tcp.local_addr().expect("bound listener has an address");

        let listener = BridgeListener::new(
            &ListenConfig {
                address: addr.to_string(),
            },
            registry.clone(),
        );
        let shutdown_tx = listener.shutdown_handle();
        let task_bridge = Arc::clone(&bridge);
        let listener_task =
            tokio::spawn(async move { listener.serve(tcp, &task_bridge).await });

        BridgeTestHarness {
            device: MockDevice::new(device_end),
            registry,
            metrics,
            bridge,
            addr,
            shutdown_tx,
            listener_task: Some(listener_task),
        }
    }
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
