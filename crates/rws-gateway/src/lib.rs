//! rws-gateway library crate.
//!
//! Serves Redis streams to WebSocket clients.  Every configured endpoint
//! binds a WebSocket path to one or more streams; entries are pushed to the
//! client as they arrive and deleted once written.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! WebSocket client
//!         ↕
//! [rws-gateway]
//!   ├── domain/            Session events, lifecycle, request parameters
//!   ├── application/       Connection bridge, subscription, broker traits
//!   └── infrastructure/
//!         ├── server/      Accept loop, TLS, HTTP/1.1 (hyper)
//!         ├── dispatcher/  Path routing, assets, test page, upgrades
//!         └── *_broker/    Redis and in-memory StreamBroker adapters
//!         ↕
//! Redis streams
//! ```
//!
//! # Layer rules
//!
//! - `domain` does no I/O.
//! - `application` depends on `domain`, `rws-core` and the broker traits; it
//!   is generic over the socket.
//! - `infrastructure` depends on all other layers plus hyper, rustls and redis.

/// Domain layer: session types (no I/O).
pub mod domain;

/// Application layer: the per-connection bridge.
pub mod application;

/// Infrastructure layer: listeners, routing and broker adapters.
pub mod infrastructure;
