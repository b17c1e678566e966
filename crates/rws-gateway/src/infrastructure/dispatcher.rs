//! HTTP entry point for one listening address.
//!
//! Every request is resolved against the address's [`RouteTable`]:
//!
//! - `<test path>/static/<file>.<ext>` serves a test page asset
//! - a test path renders the test page
//! - a WebSocket path upgrades and hands the socket to a [`ConnectionBridge`]
//! - anything else is 404

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use regex::Regex;
use rws_core::template::PageContext;
use rws_core::{Endpoint, Route, RouteTable};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

use super::inflate::InflatingStream;
use super::upgrade::{plan_upgrade, switching_protocols};
use crate::application::{BrokerConnector, ConnectionBridge, TestPage};
use crate::domain::BridgeOutcome;

const STATIC_ASSET_PATTERN: &str = r"^(.*)/static/([^/]+\.([A-Za-z0-9]+))$";

/// Request router for one address.
pub struct Dispatcher {
    table: RouteTable,
    test_page: TestPage,
    static_asset: Regex,
    connector: Arc<dyn BrokerConnector>,
}

impl Dispatcher {
    /// # Errors
    ///
    /// Returns an error only if the static asset pattern fails to compile.
    pub fn new(
        table: RouteTable,
        test_page: TestPage,
        connector: Arc<dyn BrokerConnector>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            table,
            test_page,
            static_asset: Regex::new(STATIC_ASSET_PATTERN)?,
            connector,
        })
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Answers one request.  Bridge sessions are spawned, never awaited.
    pub fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        let path = req.uri().path().to_string();

        if let Some(captures) = self.static_asset.captures(&path) {
            let prefix = captures.get(1).map_or("", |m| m.as_str());
            let name = captures.get(2).map_or("", |m| m.as_str());
            let extension = captures.get(3).map_or("", |m| m.as_str());
            return self.serve_asset(prefix, name, extension);
        }

        match self.table.lookup(&path) {
            Some(Route::TestUi { ws_path }) => self.render_test_page(&req, &path, ws_path),
            Some(Route::Bridge(endpoint)) => self.accept_bridge(req, Arc::clone(endpoint)),
            None => {
                debug!("{}: no route for {path}", self.table.address());
                plain(StatusCode::NOT_FOUND, "not found")
            }
        }
    }

    fn serve_asset(&self, prefix: &str, name: &str, extension: &str) -> Response<Full<Bytes>> {
        let prefix = if prefix.is_empty() { "/" } else { prefix };
        if !self.table.is_test_path(prefix) {
            return plain(StatusCode::NOT_FOUND, "not found");
        }
        match self.test_page.asset(name) {
            Ok(Some(bytes)) => {
                let mut response = Response::new(Full::new(Bytes::from(bytes.into_owned())));
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(content_type(extension)),
                );
                response
            }
            Ok(None) => plain(StatusCode::NOT_FOUND, "not found"),
            Err(e) => {
                warn!("{}: {e}", self.table.address());
                plain(StatusCode::INTERNAL_SERVER_ERROR, "asset unavailable")
            }
        }
    }

    fn render_test_page<B>(&self, req: &Request<B>, path: &str, ws_path: &str) -> Response<Full<Bytes>> {
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("localhost");
        let scheme = if self.table.uses_tls() { "wss" } else { "ws" };
        let ws_url = format!("{scheme}://{host}{ws_path}");
        let context = PageContext {
            ws_url: &ws_url,
            test_path: path.trim_end_matches('/'),
        };

        match self.test_page.render(&context) {
            Ok(html) => {
                let mut response = Response::new(Full::new(Bytes::from(html)));
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/html; charset=utf-8"),
                );
                response
            }
            Err(e) => {
                warn!("{}: cannot render test page: {e}", self.table.address());
                plain(StatusCode::INTERNAL_SERVER_ERROR, "test page unavailable")
            }
        }
    }

    fn accept_bridge<B>(&self, mut req: Request<B>, endpoint: Arc<Endpoint>) -> Response<Full<Bytes>> {
        let plan = match plan_upgrade(&req, endpoint.compression) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("{}: refused upgrade on {}: {e}", self.table.address(), endpoint.ws_path);
                return plain(StatusCode::BAD_REQUEST, &e.to_string());
            }
        };

        let query = req.uri().query().map(str::to_string);
        let compress = plan.compressed();
        let connector = Arc::clone(&self.connector);
        let on_upgrade = hyper::upgrade::on(&mut req);

        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) if compress => {
                    let io = InflatingStream::new(TokioIo::new(upgraded));
                    run_bridge(io, endpoint, query.as_deref(), compress, connector).await;
                }
                Ok(upgraded) => {
                    let io = TokioIo::new(upgraded);
                    run_bridge(io, endpoint, query.as_deref(), compress, connector).await;
                }
                Err(e) => warn!("upgrade on {} did not complete: {e}", endpoint.ws_path),
            }
        });

        switching_protocols(&plan)
    }
}

/// Runs one bridge session over an upgraded connection.  When compression was
/// negotiated `io` is an [`InflatingStream`], so client frames reach the
/// bridge already inflated.
pub async fn run_bridge<T>(
    io: T,
    endpoint: Arc<Endpoint>,
    query: Option<&str>,
    compress: bool,
    connector: Arc<dyn BrokerConnector>,
) -> BridgeOutcome
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let socket = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
    ConnectionBridge::new(endpoint, query, compress, socket, connector)
        .run()
        .await
}

/// MIME type for a static asset extension.
fn content_type(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "js" => "application/javascript",
        "htm" | "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" => "application/json",
        "xml" => "text/xml; charset=utf-8",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

fn plain(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
