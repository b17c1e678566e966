//! Scripted test doubles for the application layer.
//!
//! - [`ScriptedBroker`] answers scans from a fixed stream list and hands out
//!   read results pushed by the test; an empty script blocks like `XREAD`.
//! - [`ScriptedSocket`] is a WebSocket stand-in: the test feeds client frames
//!   in, everything the bridge sends is recorded.
//!
//! Both write into one shared [`EventLog`], so tests can assert the relative
//! order of writes, deletes and releases.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, Stream};
use parking_lot::Mutex;
use rws_core::{BrokerSettings, CursorSet, EntryId, FieldMap, StreamBatch};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::broker::{BrokerConnector, BrokerError, StreamBroker};

// ── Event log ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Recorded {
    Sent(Message),
    SinkClosed,
    Read(Vec<(String, EntryId)>),
    Deleted(String, EntryId),
    Appended(String, FieldMap),
    Released,
}

#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Recorded>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, event: Recorded) {
        self.events.lock().push(event);
    }

    pub fn snapshot(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Recorded) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn close_frames(&self) -> usize {
        self.count(|e| matches!(e, Recorded::Sent(Message::Close(_))))
    }

    pub fn releases(&self) -> usize {
        self.count(|e| matches!(e, Recorded::Released))
    }

    pub fn deletes(&self) -> Vec<(String, String)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Deleted(stream, id) => Some((stream.clone(), id.to_string())),
                _ => None,
            })
            .collect()
    }

    pub fn appends(&self) -> Vec<(String, FieldMap)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Appended(stream, fields) => Some((stream.clone(), fields.clone())),
                _ => None,
            })
            .collect()
    }

    /// Data frames the bridge sent, in order.
    pub fn data_frames(&self) -> Vec<Message> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Sent(m @ (Message::Text(_) | Message::Binary(_) | Message::Frame(_))) => {
                    Some(m.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Polls until `predicate` holds; panics after two seconds.
    pub async fn wait_until(&self, predicate: impl Fn(&EventLog) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !predicate(self) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached; log: {:?}",
                self.snapshot()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

// ── Broker ────────────────────────────────────────────────────────────────────

pub struct ScriptedBroker {
    streams: Vec<String>,
    latest: BTreeMap<String, EntryId>,
    reads_tx: mpsc::UnboundedSender<Result<Vec<StreamBatch>, BrokerError>>,
    reads_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Vec<StreamBatch>, BrokerError>>>,
    log: Arc<EventLog>,
    fail_scans: bool,
    fail_deletes: bool,
    next_append: AtomicU64,
}

impl ScriptedBroker {
    pub fn new(streams: &[&str]) -> Self {
        let (reads_tx, reads_rx) = mpsc::unbounded_channel();
        Self {
            streams: streams.iter().map(|s| s.to_string()).collect(),
            latest: BTreeMap::new(),
            reads_tx,
            reads_rx: tokio::sync::Mutex::new(reads_rx),
            log: EventLog::new(),
            fail_scans: false,
            fail_deletes: false,
            next_append: AtomicU64::new(1),
        }
    }

    pub fn with_log(mut self, log: &Arc<EventLog>) -> Self {
        self.log = Arc::clone(log);
        self
    }

    pub fn with_latest(mut self, stream: &str, id: &str) -> Self {
        self.latest.insert(stream.to_string(), EntryId::from(id));
        self
    }

    pub fn failing_scans(mut self) -> Self {
        self.fail_scans = true;
        self
    }

    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    /// Queues the result of one future `read_new` call.
    pub fn script_read(&self, result: Result<Vec<StreamBatch>, BrokerError>) {
        let _ = self.reads_tx.send(result);
    }
}

#[async_trait]
impl StreamBroker for ScriptedBroker {
    async fn list_matching_stream_names(&self, pattern: &str) -> Result<Vec<String>, BrokerError> {
        if self.fail_scans {
            return Err(BrokerError::Command("scan refused".to_string()));
        }
        Ok(self
            .streams
            .iter()
            .filter(|name| glob_match::glob_match(pattern, name))
            .cloned()
            .collect())
    }

    async fn latest_entry_id(&self, stream: &str) -> Result<Option<EntryId>, BrokerError> {
        Ok(self.latest.get(stream).cloned())
    }

    async fn read_new(&self, cursors: &CursorSet) -> Result<Vec<StreamBatch>, BrokerError> {
        self.log.push(Recorded::Read(
            cursors
                .iter()
                .map(|c| (c.stream.clone(), c.last_seen.clone()))
                .collect(),
        ));
        let mut reads = self.reads_rx.lock().await;
        match reads.recv().await {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn delete_entry(&self, stream: &str, id: &EntryId) -> Result<(), BrokerError> {
        self.log
            .push(Recorded::Deleted(stream.to_string(), id.clone()));
        if self.fail_deletes {
            return Err(BrokerError::Command("delete refused".to_string()));
        }
        Ok(())
    }

    async fn append_entry(&self, stream: &str, fields: &FieldMap) -> Result<EntryId, BrokerError> {
        self.log
            .push(Recorded::Appended(stream.to_string(), fields.clone()));
        let n = self.next_append.fetch_add(1, Ordering::Relaxed);
        Ok(EntryId::new(format!("{n}-0")))
    }

    async fn release(&self) {
        self.log.push(Recorded::Released);
    }
}

pub struct ScriptedConnector {
    pub broker: Arc<ScriptedBroker>,
    pub fail: bool,
}

impl ScriptedConnector {
    pub fn new(broker: ScriptedBroker) -> Arc<Self> {
        Arc::new(Self {
            broker: Arc::new(broker),
            fail: false,
        })
    }

    pub fn failing(broker: ScriptedBroker) -> Arc<Self> {
        Arc::new(Self {
            broker: Arc::new(broker),
            fail: true,
        })
    }
}

#[async_trait]
impl BrokerConnector for ScriptedConnector {
    async fn connect(&self, _settings: &BrokerSettings) -> Result<Arc<dyn StreamBroker>, BrokerError> {
        if self.fail {
            return Err(BrokerError::Connection("connection refused".to_string()));
        }
        let broker: Arc<dyn StreamBroker> = Arc::clone(&self.broker) as Arc<dyn StreamBroker>;
        Ok(broker)
    }
}

// ── Socket ────────────────────────────────────────────────────────────────────

pub type ClientFrames = mpsc::UnboundedSender<Result<Message, WsError>>;

pub struct ScriptedSocket {
    incoming: mpsc::UnboundedReceiver<Result<Message, WsError>>,
    log: Arc<EventLog>,
    fail_writes: bool,
}

impl ScriptedSocket {
    /// Returns the socket and the sender the test uses to play the client.
    pub fn new(log: &Arc<EventLog>) -> (Self, ClientFrames) {
        let (tx, incoming) = mpsc::unbounded_channel();
        let socket = Self {
            incoming,
            log: Arc::clone(log),
            fail_writes: false,
        };
        (socket, tx)
    }

    /// Every send is recorded and then fails.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }
}

impl Stream for ScriptedSocket {
    type Item = Result<Message, WsError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.incoming.poll_recv(cx)
    }
}

impl Sink<Message> for ScriptedSocket {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), WsError> {
        self.log.push(Recorded::Sent(item));
        if self.fail_writes {
            return Err(WsError::ConnectionClosed);
        }
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        self.log.push(Recorded::SinkClosed);
        Poll::Ready(Ok(()))
    }
}
