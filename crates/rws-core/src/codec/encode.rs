//! Outbound encoding: one [`StreamBatch`] becomes one frame payload.
//!
//! The JSON-family formats produce an array of entry objects:
//!
//! ```text
//! [{"id":"1700000000000-0","values":{"field":"value"}}, ...]
//! ```
//!
//! With `message_details` each object also carries `"stream"`.  The `csv`
//! format produces one line per entry instead.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;
use serde_json::value::RawValue;

use crate::domain::endpoint::MessageFormat;
use crate::domain::entry::{StreamBatch, StreamEntry};

use super::{CodecError, Payload};

/// Encodes batches for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoder {
    format: MessageFormat,
    message_details: bool,
}

/// One element of the JSON envelope.
#[derive(Serialize)]
struct EntryObject<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<&'a str>,
    values: BTreeMap<&'a str, FieldValue>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum FieldValue {
    Text(String),
    /// Embedded verbatim, so key order and spacing survive.
    Json(Box<RawValue>),
}

impl Encoder {
    pub fn new(format: MessageFormat, message_details: bool) -> Self {
        Self {
            format,
            message_details,
        }
    }

    /// Serialises `batch` into a single payload.
    ///
    /// `binary` yields [`Payload::Binary`]; every other format yields
    /// [`Payload::Text`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if the envelope cannot be serialised.
    pub fn encode(&self, batch: &StreamBatch) -> Result<Payload, CodecError> {
        match self.format {
            MessageFormat::Csv => Ok(Payload::Text(self.encode_csv(batch))),
            MessageFormat::Binary => Ok(Payload::Binary(serde_json::to_vec(
                &self.envelope(batch),
            )?)),
            MessageFormat::Json | MessageFormat::Text | MessageFormat::SimpleJson => Ok(
                Payload::Text(serde_json::to_string(&self.envelope(batch))?),
            ),
        }
    }

    fn envelope<'a>(&self, batch: &'a StreamBatch) -> Vec<EntryObject<'a>> {
        batch
            .entries
            .iter()
            .map(|entry| self.entry_object(&batch.stream, entry))
            .collect()
    }

    fn entry_object<'a>(&self, stream: &'a str, entry: &'a StreamEntry) -> EntryObject<'a> {
        EntryObject {
            id: entry.id.as_str(),
            stream: self.message_details.then_some(stream),
            values: entry
                .values
                .iter()
                .map(|(field, raw)| (field.as_str(), self.field_value(raw)))
                .collect(),
        }
    }

    fn field_value(&self, raw: &[u8]) -> FieldValue {
        match self.format {
            MessageFormat::Binary => FieldValue::Text(BASE64.encode(raw)),
            MessageFormat::Json => embedded_json(raw).map_or_else(
                || FieldValue::Text(String::from_utf8_lossy(raw).into_owned()),
                FieldValue::Json,
            ),
            _ => FieldValue::Text(String::from_utf8_lossy(raw).into_owned()),
        }
    }

    fn encode_csv(&self, batch: &StreamBatch) -> String {
        batch
            .entries
            .iter()
            .map(|entry| {
                let mut columns: Vec<String> = Vec::with_capacity(2 + entry.values.len() * 2);
                if self.message_details {
                    columns.push(csv_field(&batch.stream));
                }
                columns.push(csv_field(entry.id.as_str()));
                for (field, raw) in &entry.values {
                    columns.push(csv_field(field));
                    columns.push(csv_field(&String::from_utf8_lossy(raw)));
                }
                columns.join(",")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Encodes `batch` with `format` and no message details.
pub fn encode(batch: &StreamBatch, format: MessageFormat) -> Result<Payload, CodecError> {
    Encoder::new(format, false).encode(batch)
}

/// A value is embedded structurally only when it is UTF-8, starts with `{` or
/// `[` and is exactly one JSON document with nothing around it.  Anything
/// else stays a string so decoding gives back the same bytes.
fn embedded_json(raw: &[u8]) -> Option<Box<RawValue>> {
    let text = std::str::from_utf8(raw).ok()?;
    if !(text.starts_with('{') || text.starts_with('[')) {
        return None;
    }
    let value: Box<RawValue> = serde_json::from_str(text).ok()?;
    (value.get().len() == text.len()).then_some(value)
}

/// RFC 4180 quoting.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::domain::entry::FieldMap;

    fn batch(pairs: &[(&str, &str)]) -> StreamBatch {
        StreamBatch::new(
            "orders",
            vec![StreamEntry::from_pairs("1-0", pairs.iter().copied())],
        )
    }

    fn text(payload: Payload) -> String {
        match payload {
            Payload::Text(text) => text,
            Payload::Binary(_) => panic!("expected a text payload"),
        }
    }

    #[test]
    fn test_json_embeds_structured_values() {
        // Arrange
        let batch = batch(&[("doc", r#"{"qty":2}"#), ("list", "[1,2]"), ("name", "widget")]);

        // Act
        let payload = text(encode(&batch, MessageFormat::Json).unwrap());

        // Assert
        let parsed: Value = serde_json::from_str(&payload).unwrap();
        let values = &parsed[0]["values"];
        assert_eq!(parsed[0]["id"], "1-0");
        assert_eq!(values["doc"]["qty"], 2);
        assert_eq!(values["list"][1], 2);
        assert_eq!(values["name"], "widget");
    }

    #[test]
    fn test_json_keeps_invalid_json_as_string() {
        let payload = text(encode(&batch(&[("doc", "{not json")]), MessageFormat::Json).unwrap());
        let parsed: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed[0]["values"]["doc"], "{not json");
    }

    #[test]
    fn test_json_embeds_nested_text_verbatim() {
        let payload = text(
            encode(&batch(&[("doc", r#"{"b":1, "a":[2.50, 3]}"#)]), MessageFormat::Json).unwrap(),
        );

        assert_eq!(
            payload,
            r#"[{"id":"1-0","values":{"doc":{"b":1, "a":[2.50, 3]}}}]"#
        );
    }

    #[test]
    fn test_json_with_surrounding_whitespace_stays_a_string() {
        let payload = text(
            encode(&batch(&[("padded", " [1,2]"), ("trailing", "{}\n")]), MessageFormat::Json)
                .unwrap(),
        );

        let parsed: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed[0]["values"]["padded"], " [1,2]");
        assert_eq!(parsed[0]["values"]["trailing"], "{}\n");
    }

    #[test]
    fn test_text_never_reparses_values() {
        for format in [MessageFormat::Text, MessageFormat::SimpleJson] {
            let payload = text(encode(&batch(&[("doc", r#"{"qty":2}"#)]), format).unwrap());
            let parsed: Value = serde_json::from_str(&payload).unwrap();
            assert_eq!(parsed[0]["values"]["doc"], r#"{"qty":2}"#);
        }
    }

    #[test]
    fn test_binary_base64_encodes_raw_bytes() {
        // Arrange
        let mut values = FieldMap::new();
        values.insert("blob".to_string(), vec![0xff, 0x00, 0x10]);
        let batch = StreamBatch::new("orders", vec![StreamEntry::new("1-0", values)]);

        // Act
        let payload = encode(&batch, MessageFormat::Binary).unwrap();

        // Assert
        let Payload::Binary(bytes) = payload else {
            panic!("binary format must produce a binary payload");
        };
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed[0]["values"]["blob"], "/wAQ");
    }

    #[test]
    fn test_non_utf8_values_are_lossy_in_text_formats() {
        let mut values = FieldMap::new();
        values.insert("blob".to_string(), vec![b'a', 0xff]);
        let batch = StreamBatch::new("orders", vec![StreamEntry::new("1-0", values)]);

        let payload = text(encode(&batch, MessageFormat::Json).unwrap());

        let parsed: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed[0]["values"]["blob"], "a\u{fffd}");
    }

    #[test]
    fn test_message_details_adds_stream_name() {
        let encoder = Encoder::new(MessageFormat::Json, true);

        let payload = text(encoder.encode(&batch(&[("k", "v")])).unwrap());

        let parsed: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed[0]["stream"], "orders");
    }

    #[test]
    fn test_csv_quotes_per_rfc_4180() {
        // Arrange
        let batch = StreamBatch::new(
            "orders",
            vec![
                StreamEntry::from_pairs("1-0", [("a", "plain"), ("b", "x,y")]),
                StreamEntry::from_pairs("2-0", [("c", "say \"hi\"")]),
            ],
        );

        // Act
        let payload = text(encode(&batch, MessageFormat::Csv).unwrap());

        // Assert
        assert_eq!(payload, "1-0,a,plain,b,\"x,y\"\n2-0,c,\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_with_details_leads_with_stream() {
        let encoder = Encoder::new(MessageFormat::Csv, true);
        let payload = text(encoder.encode(&batch(&[("k", "v")])).unwrap());
        assert_eq!(payload, "orders,1-0,k,v");
    }

    #[test]
    fn test_empty_batch_encodes_empty_array() {
        let batch = StreamBatch::new("orders", Vec::new());
        assert_eq!(text(encode(&batch, MessageFormat::Json).unwrap()), "[]");
    }
}
