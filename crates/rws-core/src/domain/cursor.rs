//! Per-session read cursors.
//!
//! A session keeps one cursor per subscribed stream.  Cursors are pinned when
//! the session subscribes and only move forward as batches are delivered, so a
//! reconnecting client always starts from a fresh position.

use super::entry::{EntryId, StreamBatch};

/// Read position of one stream: the id of the last entry already seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCursor {
    pub stream: String,
    pub last_seen: EntryId,
}

/// The ordered set of cursors owned by one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorSet {
    cursors: Vec<StreamCursor>,
}

impl CursorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stream at the given position.  A stream that is already present
    /// keeps its existing cursor.
    pub fn pin(&mut self, stream: impl Into<String>, last_seen: EntryId) {
        let stream = stream.into();
        if self.position(&stream).is_none() {
            self.cursors.push(StreamCursor { stream, last_seen });
        }
    }

    /// Moves the cursor of `batch.stream` to the newest entry of the batch.
    ///
    /// Cursors never move backwards; a batch for an unknown stream is ignored.
    pub fn advance(&mut self, batch: &StreamBatch) {
        let Some(last) = batch.last_id() else {
            return;
        };
        if let Some(cursor) = self.cursors.iter_mut().find(|c| c.stream == batch.stream) {
            if *last > cursor.last_seen {
                cursor.last_seen = last.clone();
            }
        }
    }

    pub fn position(&self, stream: &str) -> Option<&EntryId> {
        self.cursors
            .iter()
            .find(|c| c.stream == stream)
            .map(|c| &c.last_seen)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamCursor> {
        self.cursors.iter()
    }

    pub fn streams(&self) -> Vec<&str> {
        self.cursors.iter().map(|c| c.stream.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}
