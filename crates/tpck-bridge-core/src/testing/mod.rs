//! Test utilities for the serial bridge.
//!
//! This module provides infrastructure for integration testing:
//!
//! - [`MockDevice`] - The device end of a simulated serial link
//! - [`BridgeTestHarness`] - A running bridge, listener and mock device
//! - [`TestHarnessBuilder`] - Builder pattern for custom bridge settings
//!
//! # Example
//!
//! ```rust,ignore
//! use tpck_bridge_core::testing::BridgeTestHarness;
//!
//! #[tokio::test]
//! async fn test_broadcast() {
//!     let mut harness = BridgeTestHarness::new().await;
//!     let client = harness.connect_client().await;
//!
//!     harness.device.send_packet(&packet).await.unwrap();
//!     // read a line from `client` ...
//! }
//! ```

pub mod harness;
pub mod mock_device;

pub use harness::{BridgeTestHarness, TestHarnessBuilder};
pub use mock_device::MockDevice;
