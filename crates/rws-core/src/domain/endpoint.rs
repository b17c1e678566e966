//! Validated endpoint types.
//!
//! An [`Endpoint`] is what a bridge path resolves to after the route table has
//! applied defaults and validation.  Everything here is immutable once built
//! and shared between sessions behind an `Arc`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// A value that is not one of the recognised names for its setting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported {setting} [{value}]")]
pub struct UnsupportedValue {
    pub setting: &'static str,
    pub value: String,
}

// ── Message format ────────────────────────────────────────────────────────────

/// Wire format used to serialise entries for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFormat {
    /// JSON envelope; values that look like JSON are embedded structurally.
    #[default]
    Json,
    /// JSON envelope; every value is a plain JSON string.
    Text,
    /// Older name of [`MessageFormat::Text`], kept for existing configurations.
    SimpleJson,
    /// JSON envelope; every value is base64 of the raw bytes.
    Binary,
    /// One CSV line per entry.
    Csv,
}

impl MessageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageFormat::Json => "json",
            MessageFormat::Text => "text",
            MessageFormat::SimpleJson => "simple-json",
            MessageFormat::Binary => "binary",
            MessageFormat::Csv => "csv",
        }
    }
}

impl FromStr for MessageFormat {
    type Err = UnsupportedValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(MessageFormat::Json),
            "text" => Ok(MessageFormat::Text),
            "simple-json" => Ok(MessageFormat::SimpleJson),
            "binary" => Ok(MessageFormat::Binary),
            "csv" => Ok(MessageFormat::Csv),
            other => Err(UnsupportedValue {
                setting: "message_type",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Broker settings ───────────────────────────────────────────────────────────

/// Where a new session starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetReset {
    /// Only entries appended after the session subscribed.
    #[default]
    Latest,
    /// Everything currently in the stream, then new entries.
    Earliest,
}

impl FromStr for OffsetReset {
    type Err = UnsupportedValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(OffsetReset::Latest),
            "earliest" => Ok(OffsetReset::Earliest),
            other => Err(UnsupportedValue {
                setting: "offset_reset",
                value: other.to_string(),
            }),
        }
    }
}

/// Broker connection settings for one endpoint.
///
/// The gateway interprets the typed fields itself.  `extra` is handed to the
/// broker adapter untouched; the Redis adapter understands `username`,
/// `password` and `db` and ignores anything else.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BrokerSettings {
    /// `host:port`, or a full `redis://` / `rediss://` URL.
    pub address: String,
    /// Connection name reported to the broker (`CLIENT SETNAME`).
    pub group_id: Option<String>,
    pub offset_reset: OffsetReset,
    /// Whether `group.id`, `auto.offset.reset` and other tuning keys in the
    /// request query may override these settings.
    pub allow_query_overrides: bool,
    pub extra: BTreeMap<String, String>,
}

// ── TLS and endpoint ──────────────────────────────────────────────────────────

/// Certificate and private key files in PEM format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// A fully validated bridge endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Listening address exactly as configured (e.g. `:9999`).
    pub address: String,
    /// Normalised WebSocket path.
    pub ws_path: String,
    /// Normalised test page path paired with this endpoint.
    pub test_path: String,
    /// Default streams; empty means the request must name them.
    pub streams: Vec<String>,
    pub format: MessageFormat,
    /// Include the source stream name in every encoded entry.
    pub message_details: bool,
    pub compression: bool,
    /// Stream that decoded client frames are appended to.  `Some` makes the
    /// endpoint bidirectional.
    pub publish_stream: Option<String>,
    pub broker: BrokerSettings,
}

impl Endpoint {
    pub fn is_bidirectional(&self) -> bool {
        self.publish_stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_format_name_round_trips() {
        for name in ["json", "text", "simple-json", "binary", "csv"] {
            let format: MessageFormat = name.parse().unwrap();
            assert_eq!(format.as_str(), name);
        }
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = "xml".parse::<MessageFormat>().unwrap_err();
        assert_eq!(err.setting, "message_type");
        assert_eq!(err.to_string(), "unsupported message_type [xml]");
    }

    #[test]
    fn test_default_format_is_json() {
        assert_eq!(MessageFormat::default(), MessageFormat::Json);
    }

    #[test]
    fn test_offset_reset_parses_known_values() {
        assert_eq!("latest".parse::<OffsetReset>().unwrap(), OffsetReset::Latest);
        assert_eq!(
            "earliest".parse::<OffsetReset>().unwrap(),
            OffsetReset::Earliest
        );
        assert!("smallest".parse::<OffsetReset>().is_err());
    }

    #[test]
    fn test_endpoint_with_publish_stream_is_bidirectional() {
        let mut endpoint = Endpoint {
            address: ":9999".to_string(),
            ws_path: "/ws".to_string(),
            test_path: "/test".to_string(),
            streams: vec!["orders".to_string()],
            format: MessageFormat::Json,
            message_details: false,
            compression: false,
            publish_stream: None,
            broker: BrokerSettings::default(),
        };
        assert!(!endpoint.is_bidirectional());

        endpoint.publish_stream = Some("replies".to_string());
        assert!(endpoint.is_bidirectional());
    }
}
