//! TPCK Serial Bridge Core Library
//!
//! This library relays packets between one serial transport speaking the
//! TPCK framing protocol and any number of TCP clients speaking a
//! line-oriented text form of the same packets.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`tpck`] - Frame serializer and streaming parser
//! - [`packet`] - tRPC packet model and its text form
//! - [`network`] - Connection registry, bridge loop, TCP listener and client
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Domain-specific error types
//! - [`metrics`] - Prometheus metrics collection
//!
//! # Example
//!
//! ```rust,ignore
//! use tpck_bridge_core::config::BridgeConfig;
//! use tpck_bridge_core::network::{Bridge, BridgeListener, BridgeSettings, ConnectionRegistry};
//!
//! let config = BridgeConfig::from_file("bridge.yaml")?;
//! let registry = ConnectionRegistry::new();
//! let bridge = Bridge::new(serial, registry.clone(), BridgeSettings::from_config(&config)).start();
//! BridgeListener::new(&config.listen, registry).run(&bridge).await?;
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod network;
pub mod packet;
pub mod tpck;

/// Test utilities for integration testing.
///
/// This module is only available when compiling tests or when the `testing` feature is enabled.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use config::BridgeConfig;
pub use error::{BridgeError, ConfigError, DecodeError, FrameError, PacketError, Result};
pub use metrics::BridgeMetrics;
pub use network::{
    Bridge, BridgeClient, BridgeHandle, BridgeListener, BridgeSettings, ConnectionRegistry,
};
pub use packet::{Method, Packet, PacketFormatter, Service, TextFormatter};
pub use tpck::{Frame, FrameParser, TpckCodec};
