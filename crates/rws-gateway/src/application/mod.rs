//! Application layer for rws-gateway.
//!
//! Orchestrates sessions without owning any I/O: the bridge is generic over
//! the socket and talks to the broker through the [`StreamBroker`] trait.
//!
//! # Responsibilities
//!
//! - Running one bridged session (`bridge`)
//! - Resolving requested streams into pinned cursors (`subscription`)
//! - Rendering the test page (`test_page`)
//!
//! # What does NOT belong here?
//!
//! - Listening sockets, TLS and HTTP parsing (infrastructure)
//! - The Redis client (infrastructure)

pub mod bridge;
pub mod broker;
pub mod subscription;
pub mod test_page;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge::ConnectionBridge;
pub use broker::{BrokerConnector, BrokerError, StreamBroker};
pub use subscription::{subscribe, SubscribeError};
pub use test_page::{TestPage, TestPageError};
