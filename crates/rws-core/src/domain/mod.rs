//! Domain types shared by the route table, the codec and the gateway.
//!
//! Nothing in this module performs I/O.

pub mod cursor;
pub mod endpoint;
pub mod entry;

pub use cursor::{CursorSet, StreamCursor};
pub use endpoint::{
    BrokerSettings, Endpoint, MessageFormat, OffsetReset, TlsFiles, UnsupportedValue,
};
pub use entry::{EntryId, FieldMap, StreamBatch, StreamEntry};
