//! In-process broker with Redis stream semantics.
//!
//! A [`MemoryStore`] holds every stream; each [`MemoryConnector::connect`]
//! hands out a session view over the shared store.  Ids are assigned like
//! Redis does: `<unix ms>-<seq>`, strictly increasing across the whole store.
//! `read_new` blocks until an append produces something past the cursors.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use rws_core::{BrokerSettings, CursorSet, EntryId, FieldMap, StreamBatch, StreamEntry};
use tokio::sync::Notify;

use crate::application::{BrokerConnector, BrokerError, StreamBroker};

#[derive(Debug, Default)]
struct State {
    streams: BTreeMap<String, Vec<StreamEntry>>,
    last_id: (u64, u64),
}

/// Streams shared by every session of one [`MemoryConnector`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    appended: Notify,
    readers: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates an empty stream, like `XGROUP CREATE ... MKSTREAM` would.
    pub fn create_stream(&self, stream: &str) {
        self.state
            .lock()
            .streams
            .entry(stream.to_string())
            .or_default();
    }

    /// Appends an entry, creating the stream if needed, and wakes readers.
    pub fn append(&self, stream: &str, values: FieldMap) -> EntryId {
        let id = {
            let mut state = self.state.lock();
            let now = unix_millis();
            state.last_id = if now > state.last_id.0 {
                (now, 0)
            } else {
                (state.last_id.0, state.last_id.1 + 1)
            };
            let id = EntryId::new(format!("{}-{}", state.last_id.0, state.last_id.1));
            state
                .streams
                .entry(stream.to_string())
                .or_default()
                .push(StreamEntry::new(id.clone(), values));
            id
        };
        self.appended.notify_waiters();
        id
    }

    /// Current contents of `stream`, oldest first.
    pub fn entries(&self, stream: &str) -> Vec<StreamEntry> {
        self.state
            .lock()
            .streams
            .get(stream)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `read_new` calls currently parked waiting for entries.
    pub fn blocked_readers(&self) -> usize {
        self.readers.load(Ordering::SeqCst)
    }

    fn collect_new(&self, cursors: &CursorSet) -> Vec<StreamBatch> {
        let state = self.state.lock();
        cursors
            .iter()
            .filter_map(|cursor| {
                let entries: Vec<StreamEntry> = state
                    .streams
                    .get(&cursor.stream)?
                    .iter()
                    .filter(|entry| entry.id > cursor.last_seen)
                    .cloned()
                    .collect();
                (!entries.is_empty()).then(|| StreamBatch::new(cursor.stream.clone(), entries))
            })
            .collect()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Counts a parked reader for as long as it lives.
struct ReaderGuard<'a>(&'a AtomicUsize);

impl<'a> ReaderGuard<'a> {
    fn enter(readers: &'a AtomicUsize) -> Self {
        readers.fetch_add(1, Ordering::SeqCst);
        Self(readers)
    }
}

impl Drop for ReaderGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Opens [`MemoryBroker`] sessions over one store.  Settings are ignored.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

#[async_trait]
impl BrokerConnector for MemoryConnector {
    async fn connect(&self, _settings: &BrokerSettings) -> Result<Arc<dyn StreamBroker>, BrokerError> {
        Ok(Arc::new(MemoryBroker {
            store: Arc::clone(&self.store),
            released: AtomicBool::new(false),
        }))
    }
}

/// One session's view of a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryBroker {
    store: Arc<MemoryStore>,
    released: AtomicBool,
}

impl MemoryBroker {
    fn check(&self) -> Result<&MemoryStore, BrokerError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(BrokerError::Released);
        }
        Ok(&self.store)
    }
}

#[async_trait]
impl StreamBroker for MemoryBroker {
    async fn list_matching_stream_names(&self, pattern: &str) -> Result<Vec<String>, BrokerError> {
        let store = self.check()?;
        let state = store.state.lock();
        Ok(state
            .streams
            .keys()
            .filter(|name| glob_match::glob_match(pattern, name))
            .cloned()
            .collect())
    }

    async fn latest_entry_id(&self, stream: &str) -> Result<Option<EntryId>, BrokerError> {
        let store = self.check()?;
        let state = store.state.lock();
        Ok(state
            .streams
            .get(stream)
            .and_then(|entries| entries.last())
            .map(|entry| entry.id.clone()))
    }

    async fn read_new(&self, cursors: &CursorSet) -> Result<Vec<StreamBatch>, BrokerError> {
        let store = self.check()?;
        loop {
            // Register interest before checking so an append in between is
            // not missed.
            let notified = store.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batches = store.collect_new(cursors);
            if !batches.is_empty() {
                return Ok(batches);
            }
            let _parked = ReaderGuard::enter(&store.readers);
            notified.await;
            self.check()?;
        }
    }

    async fn delete_entry(&self, stream: &str, id: &EntryId) -> Result<(), BrokerError> {
        let store = self.check()?;
        if let Some(entries) = store.state.lock().streams.get_mut(stream) {
            entries.retain(|entry| &entry.id != id);
        }
        Ok(())
    }

    async fn append_entry(&self, stream: &str, fields: &FieldMap) -> Result<EntryId, BrokerError> {
        Ok(self.check()?.append(stream, fields.clone()))
    }

    async fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn fields(value: &str) -> FieldMap {
        FieldMap::from([("v".to_string(), value.as_bytes().to_vec())])
    }

    async fn session(store: &Arc<MemoryStore>) -> Arc<dyn StreamBroker> {
        MemoryConnector::new(Arc::clone(store))
            .connect(&BrokerSettings::default())
            .await
            .unwrap()
    }

    #[test]
    fn test_ids_increase_across_streams() {
        let store = MemoryStore::new();

        let a = store.append("a", fields("1"));
        let b = store.append("b", fields("2"));
        let c = store.append("a", fields("3"));

        assert!(a < b && b < c);
        assert!(c.parts().is_some());
    }

    #[tokio::test]
    async fn test_scan_matches_glob_patterns() {
        let store = MemoryStore::new();
        store.create_stream("orders.eu");
        store.create_stream("orders.us");
        store.create_stream("audit");
        let broker = session(&store).await;

        let names = broker.list_matching_stream_names("orders.*").await.unwrap();

        assert_eq!(names, vec!["orders.eu", "orders.us"]);
    }

    #[tokio::test]
    async fn test_latest_id_of_empty_stream_is_none() {
        let store = MemoryStore::new();
        store.create_stream("orders");
        let broker = session(&store).await;

        assert_eq!(broker.latest_entry_id("orders").await.unwrap(), None);

        let id = store.append("orders", fields("x"));
        assert_eq!(broker.latest_entry_id("orders").await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn test_read_new_returns_only_entries_past_cursor() {
        // Arrange
        let store = MemoryStore::new();
        let seen = store.append("orders", fields("old"));
        store.append("orders", fields("new"));
        let broker = session(&store).await;
        let mut cursors = CursorSet::new();
        cursors.pin("orders", seen);

        // Act
        let batches = broker.read_new(&cursors).await.unwrap();

        // Assert
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].entries.len(), 1);
        assert_eq!(batches[0].entries[0].values["v"], b"new".to_vec());
    }

    #[tokio::test]
    async fn test_read_new_blocks_until_append() {
        // Arrange
        let store = MemoryStore::new();
        store.create_stream("orders");
        let broker = session(&store).await;
        let mut cursors = CursorSet::new();
        cursors.pin("orders", EntryId::origin());

        // Act
        let reader = tokio::spawn(async move { broker.read_new(&cursors).await });
        while store.blocked_readers() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        store.append("orders", fields("late"));
        let batches = tokio::time::timeout(Duration::from_secs(2), reader)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        // Assert
        assert_eq!(batches[0].entries[0].values["v"], b"late".to_vec());
        assert_eq!(store.blocked_readers(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_only_named_entry() {
        let store = MemoryStore::new();
        let first = store.append("orders", fields("1"));
        let second = store.append("orders", fields("2"));
        let broker = session(&store).await;

        broker.delete_entry("orders", &first).await.unwrap();
        broker.delete_entry("missing", &first).await.unwrap();

        let left = store.entries("orders");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, second);
    }

    #[tokio::test]
    async fn test_released_session_refuses_commands() {
        let store = MemoryStore::new();
        let broker = session(&store).await;

        broker.release().await;

        assert_eq!(
            broker.append_entry("orders", &fields("x")).await,
            Err(BrokerError::Released)
        );
        assert!(store.entries("orders").is_empty());
    }
}
