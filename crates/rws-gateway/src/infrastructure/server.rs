//! Listener: accept loop, optional TLS, HTTP/1.1 with upgrades.
//!
//! One accept loop runs per listening address.  Each accepted connection is
//! served on its own task so a slow client never delays the next accept.
//! The loop polls `running` every 200 ms and returns once it is cleared;
//! sessions already bridged keep running until their sockets close.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use rws_core::{RouteTable, TlsFiles};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

use super::dispatcher::Dispatcher;
use crate::application::{BrokerConnector, TestPage};

const ACCEPT_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {}", .0.display())]
    NoCertificate(PathBuf),

    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),

    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Builds a TLS acceptor from a PEM certificate chain and private key.
///
/// # Errors
///
/// Returns [`TlsError`] when either file cannot be read or parsed.
pub fn load_tls_acceptor(files: &TlsFiles) -> Result<TlsAcceptor, TlsError> {
    let certs = read_certificates(&files.cert_file)?;
    let key = read_private_key(&files.key_file)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let pem = read_pem(path)?;
    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let pem = read_pem(path)?;
    rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// `:port` binds every interface.
pub fn bind_address(address: &str) -> String {
    match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => address.to_string(),
    }
}

/// Binds the TCP listener for a configured address.
///
/// # Errors
///
/// Fails when the address is in use or not permitted.
pub async fn bind_listener(address: &str) -> anyhow::Result<TcpListener> {
    let bind = bind_address(address);
    TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind listener on {bind}"))
}

/// Loads TLS, binds, and serves one route table until `running` is cleared.
///
/// # Errors
///
/// Returns an error if TLS material cannot be loaded or the address cannot be
/// bound.  Per-connection failures are logged, never returned.
pub async fn run_listener(
    table: RouteTable,
    test_page: TestPage,
    connector: Arc<dyn BrokerConnector>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let tls = table
        .tls()
        .map(load_tls_acceptor)
        .transpose()
        .with_context(|| format!("failed to load TLS for {}", table.address()))?;
    let listener = bind_listener(table.address()).await?;
    let dispatcher = Dispatcher::new(table, test_page, connector)
        .context("failed to build request dispatcher")?;
    serve(listener, Arc::new(dispatcher), tls, running).await
}

/// Runs the accept loop on an already bound listener.
///
/// # Errors
///
/// Only fails if the listener's local address cannot be read.
pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    tls: Option<TlsAcceptor>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local = listener
        .local_addr()
        .context("failed to read listener address")?;
    let scheme = if tls.is_some() { "https" } else { "http" };
    info!("listening on {scheme}://{local}");
    for path in dispatcher.table().test_paths() {
        info!("{local}: test page at {path}");
    }

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("{local}: shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                debug!("{local}: connection from {peer}");
                let dispatcher = Arc::clone(&dispatcher);
                let tls = tls.clone();
                tokio::spawn(async move {
                    match tls {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => serve_connection(stream, peer, dispatcher).await,
                            Err(e) => debug!("TLS handshake with {peer} failed: {e}"),
                        },
                        None => serve_connection(stream, peer, dispatcher).await,
                    }
                });
            }
            Ok(Err(e)) => error!("{local}: accept error: {e}"),
            Err(_) => {}
        }
    }

    Ok(())
}

async fn serve_connection<I>(io: I, peer: SocketAddr, dispatcher: Arc<Dispatcher>)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let dispatcher = Arc::clone(&dispatcher);
        async move { Ok::<_, Infallible>(dispatcher.handle(req)) }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(io), service)
        .with_upgrades()
        .await
    {
        debug!("connection from {peer} ended: {e}");
    }
}
