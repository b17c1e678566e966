//! WebSocket upgrade handshake (RFC 6455 §4.2) on top of hyper.
//!
//! hyper hands us the raw request; this module checks it, computes the
//! `Sec-WebSocket-Accept` value and decides whether `permessage-deflate` is
//! enabled for the session.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use rws_core::codec::negotiate_permessage_deflate;
use thiserror::Error;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

const SEC_WEBSOCKET_KEY: &str = "sec-websocket-key";
const SEC_WEBSOCKET_VERSION: &str = "sec-websocket-version";
const SEC_WEBSOCKET_ACCEPT: &str = "sec-websocket-accept";
const SEC_WEBSOCKET_EXTENSIONS: &str = "sec-websocket-extensions";

/// Why an upgrade request was refused.  Answered with 400.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpgradeError {
    #[error("upgrade requires GET, got {0}")]
    Method(Method),

    #[error("missing or invalid {0} header")]
    Header(&'static str),

    #[error("unsupported websocket version")]
    Version,
}

/// Accepted handshake parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePlan {
    pub accept_key: String,
    /// `Sec-WebSocket-Extensions` response value, when compression is on.
    pub extensions: Option<&'static str>,
}

impl UpgradePlan {
    pub fn compressed(&self) -> bool {
        self.extensions.is_some()
    }
}

/// Validates `req` as a WebSocket upgrade.
///
/// Compression is only negotiated when the endpoint asks for it and the
/// client offers an acceptable `permessage-deflate`.
///
/// # Errors
///
/// Returns [`UpgradeError`] describing the first check that failed.
pub fn plan_upgrade<B>(req: &Request<B>, compression: bool) -> Result<UpgradePlan, UpgradeError> {
    if req.method() != Method::GET {
        return Err(UpgradeError::Method(req.method().clone()));
    }
    let headers = req.headers();
    if !header_has_token(headers, header::UPGRADE.as_str(), "websocket") {
        return Err(UpgradeError::Header("Upgrade"));
    }
    if !header_has_token(headers, header::CONNECTION.as_str(), "upgrade") {
        return Err(UpgradeError::Header("Connection"));
    }
    if !header_has_token(headers, SEC_WEBSOCKET_VERSION, "13") {
        return Err(UpgradeError::Version);
    }
    let key = headers
        .get(SEC_WEBSOCKET_KEY)
        .map(HeaderValue::as_bytes)
        .filter(|key| !key.is_empty())
        .ok_or(UpgradeError::Header("Sec-WebSocket-Key"))?;

    let extensions = if compression {
        negotiate_permessage_deflate(
            headers
                .get_all(SEC_WEBSOCKET_EXTENSIONS)
                .iter()
                .filter_map(|value| value.to_str().ok()),
        )
    } else {
        None
    };

    Ok(UpgradePlan {
        accept_key: derive_accept_key(key),
        extensions,
    })
}

/// The `101 Switching Protocols` response for an accepted plan.
pub fn switching_protocols(plan: &UpgradePlan) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    if let Ok(accept) = HeaderValue::from_str(&plan.accept_key) {
        headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
    }
    if let Some(extensions) = plan.extensions {
        headers.insert(
            SEC_WEBSOCKET_EXTENSIONS,
            HeaderValue::from_static(extensions),
        );
    }
    response
}

/// Case-insensitive token search across every value of a comma-separated
/// header.
fn header_has_token(headers: &HeaderMap, name: &str, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(token))
}
