//! The connection bridge: one WebSocket session bound to one broker connection.
//!
//! # Task layout
//!
//! ```text
//!                 ┌──────────────────┐  close   ┌──────────────┐
//!  client ──────▶ │ client-read task │ ───────▶ │              │
//!                 └──────────────────┘          │ central loop │ ──▶ client
//!                 ┌──────────────────┐ entries  │ (this task)  │
//!  broker ──────▶ │ stream-read task │ ───────▶ │              │ ──▶ broker (XDEL)
//!                 └──────────────────┘  error   └──────────────┘
//! ```
//!
//! The two spawned tasks share nothing with the loop except the three
//! capacity-1 channels.  The loop owns the socket's write half and is the only
//! place that writes frames or acknowledges entries, so delivery order and
//! acknowledgment order are the same thing.
//!
//! # Shutdown
//!
//! Any of client close, broker failure or write failure moves the session to
//! `Draining`, at most once.  Draining sends one Close frame, closes the sink,
//! aborts and joins both tasks and releases the broker connection exactly once.

use std::sync::Arc;

use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use rws_core::codec::{compress, decode_frame};
use rws_core::{Encoder, Endpoint, OffsetReset, Payload, StreamBatch};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::{Data, OpCode};
use tokio_tungstenite::tungstenite::protocol::frame::Frame;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use super::broker::{BrokerConnector, StreamBroker};
use super::subscription::subscribe;
use crate::domain::{
    BridgeOutcome, FailureKind, SessionEvent, SessionId, SessionLifecycle, SessionParams,
};

/// One bridged session, ready to run.
pub struct ConnectionBridge<S> {
    id: SessionId,
    endpoint: Arc<Endpoint>,
    params: SessionParams,
    compress: bool,
    socket: S,
    connector: Arc<dyn BrokerConnector>,
}

impl<S> ConnectionBridge<S>
where
    S: Stream<Item = Result<Message, WsError>>
        + Sink<Message, Error = WsError>
        + Unpin
        + Send
        + 'static,
{
    /// `query` is the raw request query string; `compress` is whether
    /// `permessage-deflate` was negotiated during the upgrade.
    pub fn new(
        endpoint: Arc<Endpoint>,
        query: Option<&str>,
        compress: bool,
        socket: S,
        connector: Arc<dyn BrokerConnector>,
    ) -> Self {
        let params = SessionParams::resolve(&endpoint, query);
        Self {
            id: SessionId::new(),
            endpoint,
            params,
            compress,
            socket,
            connector,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.id
    }

    /// Runs the session to completion.
    pub async fn run(self) -> BridgeOutcome {
        let ConnectionBridge {
            id,
            endpoint,
            params,
            compress,
            socket,
            connector,
        } = self;

        for key in &params.ignored {
            debug!("session {id}: ignoring query parameter {key}");
        }
        let (mut sink, client) = socket.split();

        // ── Connect ───────────────────────────────────────────────────────────
        let broker = match connector.connect(&params.broker).await {
            Ok(broker) => broker,
            Err(e) => {
                warn!(
                    "session {id}: broker connection to {} failed: {e}",
                    params.broker.address
                );
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                return BridgeOutcome::BrokerFailed;
            }
        };
        info!(
            "session {id}: opened on {} (streams {:?})",
            endpoint.ws_path, params.streams
        );

        // ── Spawn readers ─────────────────────────────────────────────────────
        let (close_tx, mut close_rx) = mpsc::channel::<()>(1);
        let (entries_tx, mut entries_rx) = mpsc::channel::<StreamBatch>(1);
        let (error_tx, mut error_rx) = mpsc::channel::<(FailureKind, String)>(1);

        let publisher = endpoint.publish_stream.clone().map(|stream| Publisher {
            broker: Arc::clone(&broker),
            stream,
        });
        let client_task = tokio::spawn(read_client(id, client, publisher, close_tx));
        let stream_task = tokio::spawn(read_streams(
            id,
            Arc::clone(&broker),
            params.streams.clone(),
            params.broker.offset_reset,
            entries_tx,
            error_tx,
        ));

        // ── Central loop ──────────────────────────────────────────────────────
        let encoder = Encoder::new(endpoint.format, endpoint.message_details);
        let mut lifecycle = SessionLifecycle::new();
        let mut outcome = BridgeOutcome::ClientClosed;

        while lifecycle.is_open() {
            let event = tokio::select! {
                biased;
                Some(()) = close_rx.recv() => SessionEvent::Close,
                Some(batch) = entries_rx.recv() => SessionEvent::Entries(batch),
                Some((kind, detail)) = error_rx.recv() => SessionEvent::Failure(kind, detail),
                else => SessionEvent::Close,
            };

            match event {
                SessionEvent::Close => {
                    debug!("session {id}: client went away");
                    outcome = BridgeOutcome::ClientClosed;
                    lifecycle.begin_draining();
                }
                SessionEvent::Failure(kind, detail) => {
                    if kind.is_expected() {
                        info!("session {id}: {detail}");
                    } else {
                        warn!("session {id}: broker failure: {detail}");
                    }
                    outcome = kind.into();
                    lifecycle.begin_draining();
                }
                SessionEvent::Entries(batch) => {
                    let Some(message) = build_message(id, &encoder, compress, &batch) else {
                        continue;
                    };
                    if let Err(e) = sink.send(message).await {
                        debug!("session {id}: write failed: {e}");
                        outcome = BridgeOutcome::WriteFailed;
                        lifecycle.begin_draining();
                        continue;
                    }
                    acknowledge(id, broker.as_ref(), &batch).await;
                }
            }
        }

        // ── Drain ─────────────────────────────────────────────────────────────
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
        client_task.abort();
        stream_task.abort();
        let _ = client_task.await;
        let _ = stream_task.await;
        broker.release().await;
        lifecycle.finish();

        info!("session {id}: closed ({outcome:?})");
        outcome
    }
}

/// Encodes a batch into the frame to send, or `None` if it must be skipped.
fn build_message(
    id: SessionId,
    encoder: &Encoder,
    compressed: bool,
    batch: &StreamBatch,
) -> Option<Message> {
    let payload = match encoder.encode(batch) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("session {id}: cannot encode batch from {}: {e}", batch.stream);
            return None;
        }
    };

    if !compressed {
        return Some(match payload {
            Payload::Text(text) => Message::Text(text),
            Payload::Binary(bytes) => Message::Binary(bytes),
        });
    }

    let opcode = if payload.is_text() {
        OpCode::Data(Data::Text)
    } else {
        OpCode::Data(Data::Binary)
    };
    match compress(payload.as_bytes()) {
        Ok(body) => {
            let mut frame = Frame::message(body, opcode, true);
            frame.header_mut().rsv1 = true;
            Some(Message::Frame(frame))
        }
        Err(e) => {
            warn!("session {id}: cannot compress batch from {}: {e}", batch.stream);
            None
        }
    }
}

/// Deletes every delivered entry, in delivery order.  Failures are logged and
/// not retried.
async fn acknowledge(id: SessionId, broker: &dyn StreamBroker, batch: &StreamBatch) {
    for entry in &batch.entries {
        match broker.delete_entry(&batch.stream, &entry.id).await {
            Ok(()) => debug!("session {id}: acknowledged {} {}", batch.stream, entry.id),
            Err(e) => warn!(
                "session {id}: failed to acknowledge {} {}: {e}",
                batch.stream, entry.id
            ),
        }
    }
}

// ── Client-read task ──────────────────────────────────────────────────────────

/// Where decoded client frames go on a bidirectional endpoint.
struct Publisher {
    broker: Arc<dyn StreamBroker>,
    stream: String,
}

impl Publisher {
    async fn publish(&self, id: SessionId, bytes: &[u8]) {
        let fields = match decode_frame(bytes) {
            Ok(fields) => fields,
            Err(e) => {
                warn!("session {id}: dropping client frame: {e}");
                return;
            }
        };
        match self.broker.append_entry(&self.stream, &fields).await {
            Ok(entry_id) => debug!("session {id}: appended {entry_id} to {}", self.stream),
            Err(e) => warn!("session {id}: failed to append to {}: {e}", self.stream),
        }
    }
}

async fn read_client<S>(
    id: SessionId,
    mut client: SplitStream<S>,
    publisher: Option<Publisher>,
    close_tx: mpsc::Sender<()>,
) where
    S: Stream<Item = Result<Message, WsError>>,
{
    loop {
        let payload = match client.next().await {
            Some(Ok(Message::Text(text))) => text.into_bytes(),
            Some(Ok(Message::Binary(bytes))) => bytes,
            Some(Ok(Message::Close(_))) | None => {
                debug!("session {id}: client closed the connection");
                break;
            }
            // Ping, pong and raw frames are handled by the protocol layer.
            Some(Ok(_)) => continue,
            Some(Err(
                WsError::ConnectionClosed
                | WsError::AlreadyClosed
                | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake),
            )) => {
                debug!("session {id}: client connection closed");
                break;
            }
            Some(Err(e)) => {
                warn!("session {id}: client read error: {e}");
                break;
            }
        };

        match &publisher {
            Some(publisher) => publisher.publish(id, &payload).await,
            None => debug!("session {id}: ignoring {} byte client frame", payload.len()),
        }
    }
    let _ = close_tx.send(()).await;
}

// ── Stream-read task ──────────────────────────────────────────────────────────

async fn read_streams(
    id: SessionId,
    broker: Arc<dyn StreamBroker>,
    requested: Vec<String>,
    offset_reset: OffsetReset,
    entries_tx: mpsc::Sender<StreamBatch>,
    error_tx: mpsc::Sender<(FailureKind, String)>,
) {
    let mut cursors = match subscribe(broker.as_ref(), &requested, offset_reset).await {
        Ok(cursors) => cursors,
        Err(e) => {
            let _ = error_tx.send((e.kind(), e.to_string())).await;
            return;
        }
    };
    info!("session {id}: subscribed to {:?}", cursors.streams());

    loop {
        let batches = match broker.read_new(&cursors).await {
            Ok(batches) => batches,
            Err(e) => {
                let kind = if e.is_not_found() {
                    FailureKind::StreamsNotFound
                } else {
                    FailureKind::Broker
                };
                let _ = error_tx.send((kind, e.to_string())).await;
                return;
            }
        };
        for batch in batches {
            if batch.is_empty() {
                continue;
            }
            cursors.advance(&batch);
            if entries_tx.send(batch).await.is_err() {
                return;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
