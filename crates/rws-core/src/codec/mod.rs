//! Wire codecs between broker entries and WebSocket frames.
//!
//! - [`encode`] turns a [`crate::StreamBatch`] into one frame payload.
//! - [`decode`] turns a client frame back into a field map.
//! - [`deflate`] implements the `permessage-deflate` extension body format.

pub mod decode;
pub mod deflate;
pub mod encode;

use thiserror::Error;

pub use decode::{decode_batch, decode_frame};
pub use deflate::{compress, decompress, negotiate_permessage_deflate};
pub use encode::{encode, Encoder};

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload is not valid JSON, or could not be serialised as JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is JSON but not of the expected shape.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A client frame carried no fields to append.
    #[error("frame has no fields")]
    EmptyFrame,

    /// DEFLATE compression or decompression failed.
    #[error("deflate failure: {0}")]
    Deflate(#[from] std::io::Error),
}

/// One encoded WebSocket message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Sent as a text frame.
    Text(String),
    /// Sent as a binary frame.
    Binary(Vec<u8>),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }
}
