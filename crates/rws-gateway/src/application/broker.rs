//! Broker capability traits.
//!
//! The bridge only talks to the broker through [`StreamBroker`], so sessions
//! can be driven by the Redis adapter in production and by in-memory or
//! scripted doubles in tests.
//!
//! Infrastructure implementations live in `crate::infrastructure`.

use std::sync::Arc;

use async_trait::async_trait;
use rws_core::{BrokerSettings, CursorSet, EntryId, FieldMap, StreamBatch};
use thiserror::Error;

/// Broker failures.  Every variant ends the session it occurs in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// A requested stream or pattern matched nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The broker could not be reached or the connection dropped.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The broker rejected a command.
    #[error("command failed: {0}")]
    Command(String),

    /// The connection was already released by this session.
    #[error("broker connection already released")]
    Released,
}

impl BrokerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BrokerError::NotFound(_))
    }
}

/// One session's connection to the stream broker.
#[async_trait]
pub trait StreamBroker: Send + Sync {
    /// Names of existing streams matching a glob-style `pattern`.
    async fn list_matching_stream_names(&self, pattern: &str) -> Result<Vec<String>, BrokerError>;

    /// Id of the newest entry in `stream`, or `None` when it is empty.
    async fn latest_entry_id(&self, stream: &str) -> Result<Option<EntryId>, BrokerError>;

    /// Waits until at least one stream has entries newer than its cursor and
    /// returns them, one batch per stream, in broker order.
    async fn read_new(&self, cursors: &CursorSet) -> Result<Vec<StreamBatch>, BrokerError>;

    async fn delete_entry(&self, stream: &str, id: &EntryId) -> Result<(), BrokerError>;

    /// Appends `fields` to `stream` and returns the id the broker assigned.
    async fn append_entry(&self, stream: &str, fields: &FieldMap) -> Result<EntryId, BrokerError>;

    /// Drops the connection.  Later calls fail with [`BrokerError::Released`].
    async fn release(&self);
}

/// Opens [`StreamBroker`] connections for new sessions.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, settings: &BrokerSettings) -> Result<Arc<dyn StreamBroker>, BrokerError>;
}
