//! Inbound decoding.
//!
//! A client frame on a bidirectional endpoint is a JSON object, either a flat
//! field map or the same envelope the encoder produces:
//!
//! ```text
//! {"sku":"A1","qty":2}
//! {"values":{"sku":"A1","qty":2}}
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::domain::entry::{FieldMap, StreamEntry};

use super::CodecError;

/// Keys that may accompany `values` in an envelope.
const ENVELOPE_KEYS: [&str; 3] = ["id", "stream", "values"];

/// A JSON object whose member values are kept as their source text.
type RawObject<'a> = BTreeMap<Cow<'a, str>, &'a RawValue>;

/// One element of a `json`-format payload.  `stream` and unknown keys are
/// ignored.
#[derive(Deserialize)]
struct EntryObject<'a> {
    #[serde(borrow)]
    id: Cow<'a, str>,
    #[serde(borrow)]
    values: RawObject<'a>,
}

/// Decodes one client frame into the fields to append.
///
/// String values are unescaped; any other value keeps its exact JSON text.
///
/// # Errors
///
/// - [`CodecError::Json`] when the frame is not JSON.
/// - [`CodecError::Malformed`] when it is not an object.
/// - [`CodecError::EmptyFrame`] when it holds no fields.
///
/// # Examples
///
/// ```rust
/// use rws_core::codec::decode_frame;
///
/// let fields = decode_frame(br#"{"values":{"qty":2,"sku":"A1"}}"#).unwrap();
/// assert_eq!(fields["qty"], b"2".to_vec());
/// assert_eq!(fields["sku"], b"A1".to_vec());
/// ```
pub fn decode_frame(bytes: &[u8]) -> Result<FieldMap, CodecError> {
    let frame: &RawValue = serde_json::from_slice(bytes)?;
    let object = raw_object(frame)
        .ok_or_else(|| CodecError::Malformed("frame must be a JSON object".to_string()))?;

    let fields = match envelope_values(&object) {
        Some(values) => field_map(&values)?,
        None => field_map(&object)?,
    };
    if fields.is_empty() {
        return Err(CodecError::EmptyFrame);
    }
    Ok(fields)
}

/// Parses a `json`-format payload back into entries.
///
/// Structured values come back byte for byte as they were embedded.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the payload is not an array of entry
/// objects with a string `id` and an object `values`.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<StreamEntry>, CodecError> {
    let items: Vec<EntryObject<'_>> = serde_json::from_slice(bytes)?;
    items
        .iter()
        .map(|item| Ok(StreamEntry::new(&*item.id, field_map(&item.values)?)))
        .collect()
}

/// `None` unless `raw` is an object.
fn raw_object(raw: &RawValue) -> Option<RawObject<'_>> {
    if !raw.get().starts_with('{') {
        return None;
    }
    serde_json::from_str(raw.get()).ok()
}

fn envelope_values<'a>(object: &RawObject<'a>) -> Option<RawObject<'a>> {
    let values: &'a RawValue = *object.get("values")?;
    if !object.keys().all(|key| ENVELOPE_KEYS.contains(&&**key)) {
        return None;
    }
    raw_object(values)
}

fn field_map(object: &RawObject<'_>) -> Result<FieldMap, CodecError> {
    object
        .iter()
        .map(|(key, value)| Ok((key.to_string(), field_bytes(value)?)))
        .collect()
}

fn field_bytes(value: &RawValue) -> Result<Vec<u8>, CodecError> {
    let text = value.get();
    if text.starts_with('"') {
        let unescaped: String = serde_json::from_str(text)?;
        Ok(unescaped.into_bytes())
    } else {
        Ok(text.as_bytes().to_vec())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
