//! Infrastructure layer for rws-gateway.
//!
//! Everything that touches the outside world.
//!
//! # Responsibilities
//!
//! - Binding listeners, terminating TLS, serving HTTP/1.1 (`server`)
//! - Routing requests to assets, the test page or a bridge (`dispatcher`)
//! - The WebSocket upgrade handshake (`upgrade`) and inflating compressed
//!   client frames (`inflate`)
//! - Broker adapters: Redis (`redis_broker`) and in-process (`memory_broker`)
//! - Reading and writing the configuration file (`config_file`)
//!
//! # What does NOT belong here?
//!
//! - Session orchestration (application layer)
//! - Wire formats and route validation (`rws-core`)

pub mod config_file;
pub mod dispatcher;
pub mod inflate;
pub mod memory_broker;
pub mod redis_broker;
pub mod server;
pub mod upgrade;

pub use config_file::{load_config, load_route_tables, write_template, ConfigFileError};
pub use dispatcher::{run_bridge, Dispatcher};
pub use inflate::InflatingStream;
pub use memory_broker::{MemoryBroker, MemoryConnector, MemoryStore};
pub use redis_broker::{RedisBroker, RedisConnector};
pub use server::{bind_listener, load_tls_acceptor, run_listener, serve, TlsError};
pub use upgrade::{plan_upgrade, UpgradeError, UpgradePlan};
