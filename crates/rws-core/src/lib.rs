//! # rws-core
//!
//! Pure library behind the RWS gateway, which bridges Redis streams to
//! WebSocket clients.  It has no dependency on sockets, the async runtime or
//! the broker client.
//!
//! - **`domain`** – entries, entry ids, per-session cursors and the validated
//!   [`Endpoint`] a bridge path resolves to.
//!
//! - **`routing`** – the YAML and TOML configuration schemas and [`build_route_tables`],
//!   which validates it into one immutable [`RouteTable`] per listening
//!   address.
//!
//! - **`codec`** – the wire formats (`json`, `text`, `binary`, `csv`) used
//!   towards clients, inbound frame decoding and `permessage-deflate`.
//!
//! - **`template`** – the compiled test page template.

pub mod codec;
pub mod domain;
pub mod routing;
pub mod template;

pub use codec::{CodecError, Encoder, Payload};
pub use domain::{
    BrokerSettings, CursorSet, Endpoint, EntryId, FieldMap, MessageFormat, OffsetReset,
    StreamBatch, StreamEntry, TlsFiles,
};
pub use routing::{
    build_route_tables, ConfigFormat, ConfigurationError, GatewayConfig, Route, RouteTable,
};
