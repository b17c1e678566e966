//! Redis streams adapter.
//!
//! Each session opens two multiplexed connections:
//!
//! - `reader` carries only the blocking `XREAD BLOCK 0`
//! - `commands` carries `SCAN`, `XREVRANGE`, `XDEL` and `XADD`
//!
//! so acknowledgments never queue behind a read that may block forever.
//! Releasing the adapter drops both; a read still in flight is abandoned when
//! the bridge aborts its task.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, RedisError};
use rws_core::{BrokerSettings, CursorSet, EntryId, FieldMap, StreamBatch, StreamEntry};
use tracing::debug;
use url::Url;

use crate::application::{BrokerConnector, BrokerError, StreamBroker};

/// `extra` keys the adapter understands.
const URL_SETTINGS: [&str; 3] = ["username", "password", "db"];
const SCAN_COUNT: usize = 1000;

/// Opens [`RedisBroker`] sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedisConnector;

#[async_trait]
impl BrokerConnector for RedisConnector {
    async fn connect(&self, settings: &BrokerSettings) -> Result<Arc<dyn StreamBroker>, BrokerError> {
        let url = connection_url(settings)?;
        for key in settings.extra.keys() {
            if !URL_SETTINGS.contains(&key.as_str()) {
                debug!("ignoring unsupported broker setting {key}");
            }
        }

        let client = redis::Client::open(url.as_str()).map_err(broker_error)?;
        let mut reader = client
            .get_multiplexed_async_connection()
            .await
            .map_err(broker_error)?;
        let mut commands = client
            .get_multiplexed_async_connection()
            .await
            .map_err(broker_error)?;

        if let Some(name) = &settings.group_id {
            for conn in [&mut reader, &mut commands] {
                let _: () = redis::cmd("CLIENT")
                    .arg("SETNAME")
                    .arg(name)
                    .query_async(conn)
                    .await
                    .map_err(broker_error)?;
            }
        }

        Ok(Arc::new(RedisBroker {
            reader: Mutex::new(Some(reader)),
            commands: Mutex::new(Some(commands)),
        }))
    }
}

/// One session's pair of Redis connections.
pub struct RedisBroker {
    reader: Mutex<Option<MultiplexedConnection>>,
    commands: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBroker {
    fn reader(&self) -> Result<MultiplexedConnection, BrokerError> {
        self.reader.lock().clone().ok_or(BrokerError::Released)
    }

    fn commands(&self) -> Result<MultiplexedConnection, BrokerError> {
        self.commands.lock().clone().ok_or(BrokerError::Released)
    }
}

#[async_trait]
impl StreamBroker for RedisBroker {
    async fn list_matching_stream_names(&self, pattern: &str) -> Result<Vec<String>, BrokerError> {
        let mut conn = self.commands()?;
        let mut names = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .arg("TYPE")
                .arg("stream")
                .query_async(&mut conn)
                .await
                .map_err(broker_error)?;
            names.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn latest_entry_id(&self, stream: &str) -> Result<Option<EntryId>, BrokerError> {
        let mut conn = self.commands()?;
        let reply: StreamRangeReply = conn
            .xrevrange_count(stream, "+", "-", 1)
            .await
            .map_err(broker_error)?;
        Ok(reply.ids.first().map(|entry| EntryId::new(entry.id.clone())))
    }

    async fn read_new(&self, cursors: &CursorSet) -> Result<Vec<StreamBatch>, BrokerError> {
        let mut conn = self.reader()?;
        let keys: Vec<&str> = cursors.iter().map(|c| c.stream.as_str()).collect();
        let ids: Vec<&str> = cursors.iter().map(|c| c.last_seen.as_str()).collect();
        let options = StreamReadOptions::default().block(0);

        let reply: Option<StreamReadReply> = conn
            .xread_options(&keys, &ids, &options)
            .await
            .map_err(broker_error)?;
        match reply {
            Some(reply) => batches_from_reply(reply),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_entry(&self, stream: &str, id: &EntryId) -> Result<(), BrokerError> {
        let mut conn = self.commands()?;
        let _: i64 = conn
            .xdel(stream, &[id.as_str()])
            .await
            .map_err(broker_error)?;
        Ok(())
    }

    async fn append_entry(&self, stream: &str, fields: &FieldMap) -> Result<EntryId, BrokerError> {
        let mut conn = self.commands()?;
        let items: Vec<(&str, &[u8])> = fields
            .iter()
            .map(|(field, value)| (field.as_str(), value.as_slice()))
            .collect();
        let id: String = conn
            .xadd(stream, "*", &items)
            .await
            .map_err(broker_error)?;
        Ok(EntryId::new(id))
    }

    async fn release(&self) {
        self.reader.lock().take();
        self.commands.lock().take();
    }
}

/// Builds the connection URL from the address and the `extra` settings.
fn connection_url(settings: &BrokerSettings) -> Result<String, BrokerError> {
    let address = settings.address.trim();
    let raw = if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{address}")
    };
    let mut url = Url::parse(&raw)
        .map_err(|e| BrokerError::Connection(format!("invalid broker address {address}: {e}")))?;

    let extra: &BTreeMap<String, String> = &settings.extra;
    if let Some(username) = extra.get("username") {
        url.set_username(username)
            .map_err(|()| BrokerError::Connection("cannot set broker username".to_string()))?;
    }
    if let Some(password) = extra.get("password") {
        url.set_password(Some(password))
            .map_err(|()| BrokerError::Connection("cannot set broker password".to_string()))?;
    }
    if let Some(db) = extra.get("db") {
        let db: u32 = db
            .parse()
            .map_err(|_| BrokerError::Connection(format!("invalid broker db [{db}]")))?;
        url.set_path(&format!("/{db}"));
    }
    Ok(url.into())
}

fn batches_from_reply(reply: StreamReadReply) -> Result<Vec<StreamBatch>, BrokerError> {
    reply
        .keys
        .into_iter()
        .map(|key| {
            let entries = key
                .ids
                .into_iter()
                .map(|entry| {
                    let values = entry
                        .map
                        .iter()
                        .map(|(field, value)| {
                            redis::from_redis_value::<Vec<u8>>(value)
                                .map(|bytes| (field.clone(), bytes))
                                .map_err(broker_error)
                        })
                        .collect::<Result<FieldMap, BrokerError>>()?;
                    Ok(StreamEntry::new(entry.id, values))
                })
                .collect::<Result<Vec<_>, BrokerError>>()?;
            Ok(StreamBatch::new(key.key, entries))
        })
        .collect()
}

fn broker_error(e: RedisError) -> BrokerError {
    if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() {
        BrokerError::Connection(e.to_string())
    } else {
        BrokerError::Command(e.to_string())
    }
}
