//! Session lifecycle types.

use std::fmt;

use rws_core::StreamBatch;
use uuid::Uuid;

/// Identifier attached to every log line of one bridged session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Why the stream side of a session gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Neither the endpoint nor the request named any stream.
    NoStreams,
    /// No existing stream matched the requested names.
    StreamsNotFound,
    /// The broker failed.
    Broker,
}

impl FailureKind {
    /// Expected conditions are logged at `info`, faults at `warn`.
    pub fn is_expected(self) -> bool {
        matches!(self, FailureKind::NoStreams | FailureKind::StreamsNotFound)
    }
}

/// The single event type the central bridge loop consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The client closed the socket, or reading from it failed.
    Close,
    /// New entries from one stream, ready to deliver.
    Entries(StreamBatch),
    Failure(FailureKind, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Draining,
    Closed,
}

/// `Open → Draining → Closed`, with the transition into `Draining` taken at
/// most once no matter how many shutdown triggers arrive.
#[derive(Debug)]
pub struct SessionLifecycle {
    state: SessionState,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            state: SessionState::Open,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Moves to `Draining`.  Returns `true` only for the call that performed
    /// the transition.
    pub fn begin_draining(&mut self) -> bool {
        if self.state != SessionState::Open {
            return false;
        }
        self.state = SessionState::Draining;
        true
    }

    pub fn finish(&mut self) {
        self.state = SessionState::Closed;
    }
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// How a bridged session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    ClientClosed,
    WriteFailed,
    NoStreams,
    StreamsNotFound,
    BrokerFailed,
}

impl From<FailureKind> for BridgeOutcome {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::NoStreams => BridgeOutcome::NoStreams,
            FailureKind::StreamsNotFound => BridgeOutcome::StreamsNotFound,
            FailureKind::Broker => BridgeOutcome::BrokerFailed,
        }
    }
}
