//! Network layer of the serial bridge.
//!
//! This module provides:
//! - The connection registry shared by the accept loop and the bridge loop
//! - The bridge loop that owns the serial transport
//! - The TCP listener and the shutdown path
//! - A client for programs that talk to a running bridge

pub mod bridge;
pub mod client;
pub mod connection;
pub mod listener;
pub mod registry;

pub use bridge::{Bridge, BridgeHandle, BridgeSettings};
pub use client::BridgeClient;
pub use connection::{Connection, ConnectionId};
pub use listener::{shutdown, BridgeListener};
pub use registry::ConnectionRegistry;
