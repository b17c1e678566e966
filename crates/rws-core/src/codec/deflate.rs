//! `permessage-deflate` (RFC 7692) support for outbound frames.
//!
//! Only the server-to-client direction is compressed.  Both sides agree to no
//! context takeover, so every message is compressed with a fresh window.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use super::CodecError;

pub const EXTENSION_NAME: &str = "permessage-deflate";

/// `Sec-WebSocket-Extensions` value sent back when the offer is accepted.
pub const ACCEPTED_RESPONSE: &str =
    "permessage-deflate; server_no_context_takeover; client_no_context_takeover";

/// Empty stored block appended by a sync flush; stripped on the wire.
const SYNC_TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Empty final fixed-Huffman block, so a decoder sees a terminated stream.
const FINAL_BLOCK: [u8; 2] = [0x03, 0x00];

/// Compresses one message body.
///
/// # Errors
///
/// Returns [`CodecError::Deflate`] if the encoder fails.
pub fn compress(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = DeflateEncoder::new(
        Vec::with_capacity(payload.len() / 2),
        Compression::fast(),
    );
    encoder.write_all(payload)?;
    // A flush on a flate2 writer is a sync flush.
    encoder.flush()?;
    let mut body = std::mem::take(encoder.get_mut());
    if body.ends_with(&SYNC_TRAILER) {
        body.truncate(body.len() - SYNC_TRAILER.len());
    }
    Ok(body)
}

/// Inverse of [`compress`].
///
/// # Errors
///
/// Returns [`CodecError::Deflate`] if `body` is not valid DEFLATE data.
pub fn decompress(body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut framed = Vec::with_capacity(body.len() + SYNC_TRAILER.len() + FINAL_BLOCK.len());
    framed.extend_from_slice(body);
    framed.extend_from_slice(&SYNC_TRAILER);
    framed.extend_from_slice(&FINAL_BLOCK);

    let mut decoder = DeflateDecoder::new(framed.as_slice());
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Picks an acceptable `permessage-deflate` offer from the request's
/// `Sec-WebSocket-Extensions` header values.
///
/// Returns the response header value, or `None` when no offer can be
/// accepted.  Offers that restrict the server window below 15 bits, or carry
/// parameters this server does not know, are declined.
pub fn negotiate_permessage_deflate<'a>(
    header_values: impl IntoIterator<Item = &'a str>,
) -> Option<&'static str> {
    header_values
        .into_iter()
        .flat_map(|value| value.split(','))
        .find(|offer| acceptable_offer(offer))
        .map(|_| ACCEPTED_RESPONSE)
}

fn acceptable_offer(offer: &str) -> bool {
    let mut parts = offer.split(';').map(str::trim);
    if parts.next() != Some(EXTENSION_NAME) {
        return false;
    }
    parts.all(|param| {
        let (name, value) = match param.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim().trim_matches('"'))),
            None => (param, None),
        };
        match name {
            "server_no_context_takeover" | "client_no_context_takeover" => value.is_none(),
            "client_max_window_bits" => true,
            "server_max_window_bits" => value == Some("15"),
            _ => false,
        }
    })
}
