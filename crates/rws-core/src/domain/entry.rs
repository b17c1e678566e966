//! Stream entry types: the unit of data that flows from the broker to a client.
//!
//! A Redis stream entry consists of a broker-assigned identifier of the form
//! `<milliseconds>-<sequence>` and a flat field/value map.  Redis stores every
//! value as a binary-safe string, so values are kept as raw bytes here and only
//! interpreted by the codec.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Field/value payload of one entry.  Keys are unique; iteration order is the
/// key order, which keeps encoded output deterministic.
pub type FieldMap = BTreeMap<String, Vec<u8>>;

/// A broker-assigned entry identifier.
///
/// Ids compare by their numeric `(ms, seq)` pair, so `"10-0"` sorts after
/// `"9-5"` even though it is lexicographically smaller.  An id that does not
/// have the `<u64>-<u64>` shape sorts after every well-formed id, and
/// malformed ids compare lexicographically among themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryId(String);

impl EntryId {
    /// The smallest possible id.  A cursor at `0-0` reads a stream from the start.
    pub const ORIGIN: &'static str = "0-0";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn origin() -> Self {
        Self(Self::ORIGIN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the id into its numeric `(ms, seq)` parts, if well-formed.
    ///
    /// A bare millisecond value (no `-seq` suffix) is accepted with an
    /// implicit sequence of zero, matching what the broker accepts on input.
    pub fn parts(&self) -> Option<(u64, u64)> {
        match self.0.split_once('-') {
            Some((ms, seq)) => Some((ms.parse().ok()?, seq.parse().ok()?)),
            None => Some((self.0.parse().ok()?, 0)),
        }
    }
}

impl Ord for EntryId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.parts(), other.parts()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for EntryId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One immutable broker message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: EntryId,
    pub values: FieldMap,
}

impl StreamEntry {
    pub fn new(id: impl Into<EntryId>, values: FieldMap) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }

    /// Convenience constructor for text-valued entries, mostly used by tests
    /// and the in-memory broker.
    pub fn from_pairs<'a>(id: &str, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect();
        Self::new(id, values)
    }
}

/// Entries read from one stream in a single broker call, in broker order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamBatch {
    pub stream: String,
    pub entries: Vec<StreamEntry>,
}

impl StreamBatch {
    pub fn new(stream: impl Into<String>, entries: Vec<StreamEntry>) -> Self {
        Self {
            stream: stream.into(),
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Id of the newest entry in the batch.
    pub fn last_id(&self) -> Option<&EntryId> {
        self.entries.last().map(|e| &e.id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_orders_numerically_not_lexicographically() {
        // Arrange
        let nine = EntryId::from("9-5");
        let ten = EntryId::from("10-0");

        // Assert
        assert!(nine < ten);
    }

    #[test]
    fn test_entry_id_orders_by_sequence_within_same_millisecond() {
        assert!(EntryId::from("1700000000000-1") < EntryId::from("1700000000000-2"));
    }

    #[test]
    fn test_entry_id_without_sequence_has_implicit_zero() {
        assert_eq!(EntryId::from("42").parts(), Some((42, 0)));
        assert_eq!(
            EntryId::from("42").cmp(&EntryId::from("42-0")),
            Ordering::Equal
        );
    }

    #[test]
    fn test_malformed_entry_id_sorts_after_well_formed() {
        assert!(EntryId::from("999-999") < EntryId::from("not-an-id"));
        assert_eq!(EntryId::from("abc").parts(), None);
    }

    #[test]
    fn test_origin_is_smallest_well_formed_id() {
        assert!(EntryId::origin() < EntryId::from("0-1"));
        assert_eq!(EntryId::origin().as_str(), "0-0");
    }

    #[test]
    fn test_from_pairs_stores_values_as_bytes() {
        let entry = StreamEntry::from_pairs("1-0", [("a", "1"), ("b", "two")]);
        assert_eq!(entry.values.get("a"), Some(&b"1".to_vec()));
        assert_eq!(entry.values.get("b"), Some(&b"two".to_vec()));
        assert_eq!(entry.id.as_str(), "1-0");
    }

    #[test]
    fn test_batch_last_id_is_newest_entry() {
        let batch = StreamBatch::new(
            "orders",
            vec![
                StreamEntry::from_pairs("1-0", [("a", "1")]),
                StreamEntry::from_pairs("2-0", [("a", "2")]),
            ],
        );
        assert_eq!(batch.last_id(), Some(&EntryId::from("2-0")));
        assert!(!batch.is_empty());
        assert_eq!(StreamBatch::new("x", vec![]).last_id(), None);
    }
}
