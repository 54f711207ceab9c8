//! TCP front-end for the bridge.
//!
//! The listener only accepts: each connection goes straight into the
//! registry and all client I/O happens in the bridge loop. On a shutdown
//! request, an accept failure or the bridge exiting on its own, the
//! listener runs the shutdown path.

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::config::ListenConfig;
use crate::error::{BridgeError, Result};

use super::bridge::BridgeHandle;
use super::connection::Connection;
use super::registry::ConnectionRegistry;

/// TCP listener that registers client connections with the bridge.
pub struct BridgeListener {
    address: String,
    registry: ConnectionRegistry,
    shutdown_tx: broadcast::Sender<()>,
}

impl BridgeListener {
    /// Create a new listener.
    #[must_use]
    pub fn new(config: &ListenConfig, registry: ConnectionRegistry) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            address: config.resolved_address(),
            registry,
            shutdown_tx,
        }
    }

    /// Get a shutdown handle to signal the listener to stop.
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Bind the configured address and accept until shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Bind`] if the address cannot be bound, after
    /// stopping the bridge; otherwise see [`BridgeListener::serve`].
    #[instrument(skip(self, bridge), fields(address = %self.address))]
    pub async fn run(&self, bridge: &BridgeHandle) -> Result<()> {
        let listener = match TcpListener::bind(&self.address).await {
            Ok(listener) => listener,
            Err(source) => {
                error!(error = %source, "failed to bind");
                if let Err(e) = bridge.stop().await {
                    error!(error = %e, "bridge had already failed");
                }
                return Err(BridgeError::Bind {
                    address: self.address.clone(),
                    source,
                });
            }
        };
        self.serve(listener, bridge).await
    }

    /// Accept on an already-bound listener until shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Accept`] if accepting fails, or the error that
    /// ended the bridge loop.
    pub async fn serve(&self, listener: TcpListener, bridge: &BridgeHandle) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "bridge listening");
        }
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let connection = Connection::new(stream, peer);
                            info!(connection_id = %connection.id(), peer = %peer, "Connected to {}", peer);
                            self.registry.insert(connection);
                        }
                        Err(e) => {
                            error!(error = %e, "accept error");
                            shutdown("accept error", bridge, &self.registry).await?;
                            return Err(BridgeError::Accept(e));
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    return shutdown("shutdown requested", bridge, &self.registry).await;
                }
                () = bridge.finished() => {
                    return shutdown("bridge loop exited", bridge, &self.registry).await;
                }
            }
        }
    }
}

/// Close every registered connection, then stop the bridge.
///
/// Connections are drained from the registry before the bridge is asked to
/// stop, so the bridge never evicts an entry this path already closed.
///
/// # Errors
///
/// Returns the error that ended the bridge loop, if any.
pub async fn shutdown(
    reason: &str,
    bridge: &BridgeHandle,
    registry: &ConnectionRegistry,
) -> Result<()> {
    info!(reason, "shutting down");
    let drained = registry.drain_all();
    info!(connections = drained.len(), "closing client connections");
    for connection in &drained {
        connection.close();
    }
    bridge.stop().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::bridge::{Bridge, BridgeSettings};
    use std::time::Duration;
    use tokio::io::duplex;
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    fn start_bridge(registry: &ConnectionRegistry) -> (BridgeHandle, tokio::io::DuplexStream) {
        let (serial, device) = duplex(1024);
        let settings = BridgeSettings {
            read_timeout: Duration::from_millis(10),
            poll_timeout: Duration::from_millis(10),
            ..BridgeSettings::default()
        };
        (Bridge::new(serial, registry.clone(), settings).start(), device)
    }

    async fn wait_for(registry: &ConnectionRegistry, n: usize) {
        timeout(Duration::from_secs(2), async {
            while registry.len() != n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_listener_registers_connections() {
        let registry = ConnectionRegistry::new();
        let (bridge, _device) = start_bridge(&registry);
        let listener = BridgeListener::new(&ListenConfig::default(), registry.clone());
        let shutdown_handle = listener.shutdown_handle();

        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let serve = tokio::spawn(async move { listener.serve(tcp, &bridge).await });

        let _a = TcpStream::connect(addr).await.unwrap();
        let _b = TcpStream::connect(addr).await.unwrap();
        wait_for(&registry, 2).await;

        let _ = shutdown_handle.send(());
        let result = timeout(Duration::from_secs(2), serve).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_bind_failure_stops_bridge() {
        let registry = ConnectionRegistry::new();
        let (bridge, _device) = start_bridge(&registry);

        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ListenConfig {
            address: taken.local_addr().unwrap().to_string(),
        };
        let listener = BridgeListener::new(&config, registry);

        let result = listener.run(&bridge).await;
        assert!(matches!(result, Err(BridgeError::Bind { .. })));
        assert!(!bridge.is_running());
    }

    #[tokio::test]
    async fn test_bridge_exit_triggers_shutdown() {
        let registry = ConnectionRegistry::new();
        let (bridge, device) = start_bridge(&registry);
        let listener = BridgeListener::new(&ListenConfig::default(), registry.clone());

        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let serve = tokio::spawn(async move { listener.serve(tcp, &bridge).await });

        let _client = TcpStream::connect(addr).await.unwrap();
        wait_for(&registry, 1).await;
        drop(device);

        let result = timeout(Duration::from_secs(2), serve).await.unwrap().unwrap();
        assert!(matches!(result, Err(BridgeError::SerialClosed)));
        assert!(registry.is_empty());
    }
}
