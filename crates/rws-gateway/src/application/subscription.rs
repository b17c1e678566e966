//! Resolving requested stream names into pinned cursors.
//!
//! Each requested name is treated as a pattern and expanded against the
//! streams that exist right now.  Every matched stream then gets a cursor:
//!
//! - `latest`   – the newest existing id (`0-0` for an empty stream), so only
//!   entries appended after subscription are delivered
//! - `earliest` – `0-0`, so the current backlog is delivered first

use rws_core::{CursorSet, EntryId, OffsetReset};
use thiserror::Error;
use tracing::debug;

use super::broker::{BrokerError, StreamBroker};
use crate::domain::FailureKind;

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("no streams requested")]
    NoStreams,

    #[error("streams {0:?} not found")]
    NotFound(Vec<String>),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl SubscribeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SubscribeError::NoStreams => FailureKind::NoStreams,
            SubscribeError::NotFound(_) => FailureKind::StreamsNotFound,
            SubscribeError::Broker(_) => FailureKind::Broker,
        }
    }
}

/// Expands `requested` and pins one cursor per matching stream.
///
/// # Errors
///
/// - [`SubscribeError::NoStreams`] when `requested` is empty.
/// - [`SubscribeError::NotFound`] when no pattern matches an existing stream.
/// - [`SubscribeError::Broker`] for any other broker failure.
pub async fn subscribe(
    broker: &dyn StreamBroker,
    requested: &[String],
    offset_reset: OffsetReset,
) -> Result<CursorSet, SubscribeError> {
    if requested.is_empty() {
        return Err(SubscribeError::NoStreams);
    }

    let mut cursors = CursorSet::new();
    for pattern in requested {
        let names = match broker.list_matching_stream_names(pattern).await {
            Ok(names) => names,
            Err(BrokerError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("pattern {pattern} matched {names:?}");

        for name in names {
            if cursors.position(&name).is_some() {
                continue;
            }
            let start = match offset_reset {
                OffsetReset::Earliest => EntryId::origin(),
                OffsetReset::Latest => broker
                    .latest_entry_id(&name)
                    .await?
                    .unwrap_or_else(EntryId::origin),
            };
            cursors.pin(name, start);
        }
    }

    if cursors.is_empty() {
        return Err(SubscribeError::NotFound(requested.to_vec()));
    }
    Ok(cursors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::ScriptedBroker;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_latest_pins_newest_existing_id() {
        // Arrange
        let broker = ScriptedBroker::new(&["orders", "empty"])
            .with_latest("orders", "42-1");

        // Act
        let cursors = subscribe(&broker, &names(&["orders", "empty"]), OffsetReset::Latest)
            .await
            .unwrap();

        // Assert
        assert_eq!(cursors.position("orders"), Some(&EntryId::from("42-1")));
        assert_eq!(cursors.position("empty"), Some(&EntryId::origin()));
    }

    #[tokio::test]
    async fn test_earliest_pins_origin() {
        let broker = ScriptedBroker::new(&["orders"]).with_latest("orders", "42-1");

        let cursors = subscribe(&broker, &names(&["orders"]), OffsetReset::Earliest)
            .await
            .unwrap();

        assert_eq!(cursors.position("orders"), Some(&EntryId::origin()));
    }

    #[tokio::test]
    async fn test_patterns_expand_and_deduplicate() {
        let broker = ScriptedBroker::new(&["orders.eu", "orders.us", "audit"]);

        let cursors = subscribe(
            &broker,
            &names(&["orders.*", "orders.eu"]),
            OffsetReset::Latest,
        )
        .await
        .unwrap();

        assert_eq!(cursors.streams(), vec!["orders.eu", "orders.us"]);
    }

    #[tokio::test]
    async fn test_empty_request_is_no_streams() {
        let broker = ScriptedBroker::new(&["orders"]);

        let err = subscribe(&broker, &[], OffsetReset::Latest).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::NoStreams);
    }

    #[tokio::test]
    async fn test_unmatched_request_is_not_found() {
        let broker = ScriptedBroker::new(&["orders"]);

        let err = subscribe(&broker, &names(&["other"]), OffsetReset::Latest)
            .await
            .unwrap_err();

        assert!(matches!(err, SubscribeError::NotFound(ref n) if n == &names(&["other"])));
        assert_eq!(err.kind(), FailureKind::StreamsNotFound);
    }

    #[tokio::test]
    async fn test_scan_failure_is_a_broker_failure() {
        let broker = ScriptedBroker::new(&["orders"]).failing_scans();

        let err = subscribe(&broker, &names(&["orders"]), OffsetReset::Latest)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Broker);
    }
}
