//! Route table construction and lookup.
//!
//! [`build_route_tables`] turns a parsed [`GatewayConfig`] into one immutable
//! [`RouteTable`] per listening address.  All validation happens here, before
//! any listener binds: a gateway with an ambiguous route table must not start.
//!
//! # Path rules
//!
//! - The test page path defaults to `test` when unset; the WebSocket path
//!   defaults to the empty path.
//! - An optional prefix is joined in front of both.
//! - Paths are normalised to a single leading `/` and no trailing `/`.
//! - Within one address, test page paths and WebSocket paths share a single
//!   namespace: no path may appear twice in either role.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::domain::endpoint::{
    BrokerSettings, Endpoint, MessageFormat, OffsetReset, TlsFiles, UnsupportedValue,
};

use super::descriptor::{EndpointDescriptor, GatewayConfig, SCHEMA_VERSION};

/// Default test page path, before normalisation.
pub const DEFAULT_TEST_PATH: &str = "test";

/// Fatal configuration problems.  Any of these aborts startup.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to parse configuration: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("unsupported schema_version [{0}], expected [{SCHEMA_VERSION}]")]
    UnsupportedSchema(String),

    #[error("both tls_cert_file and tls_key_file must be defined")]
    IncompleteTlsPair,

    #[error("{kind} file {} does not exist", path.display())]
    MissingTlsFile { kind: &'static str, path: PathBuf },

    #[error("endpoint address must be defined")]
    MissingAddress,

    #[error("broker address must be defined, address [{address}]")]
    MissingBrokerAddress { address: String },

    #[error("test path and websocket path can't be same [{path}]")]
    SamePaths { path: String },

    #[error("test path [{path}] already defined, address [{address}]")]
    DuplicateTestPath { address: String, path: String },

    #[error("test path [{path}] already defined as websocket path, address [{address}]")]
    TestPathIsWebSocketPath { address: String, path: String },

    #[error("websocket path [{path}] already defined, address [{address}]")]
    DuplicateWebSocketPath { address: String, path: String },

    #[error("websocket path [{path}] already defined as test path, address [{address}]")]
    WebSocketPathIsTestPath { address: String, path: String },

    #[error("{source}, address [{address}]")]
    Unsupported {
        address: String,
        #[source]
        source: UnsupportedValue,
    },
}

/// What a request path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// The human test page paired with `ws_path`.
    TestUi { ws_path: &'a str },
    /// A bridge endpoint.
    Bridge(&'a Arc<Endpoint>),
}

/// Immutable routes for one listening address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    address: String,
    tls: Option<TlsFiles>,
    /// test page path → WebSocket path
    test_uis: BTreeMap<String, String>,
    /// WebSocket path → endpoint
    bridges: BTreeMap<String, Arc<Endpoint>>,
}

impl RouteTable {
    fn new(address: String, tls: Option<TlsFiles>) -> Self {
        Self {
            address,
            tls,
            test_uis: BTreeMap::new(),
            bridges: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn tls(&self) -> Option<&TlsFiles> {
        self.tls.as_ref()
    }

    pub fn uses_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Resolves a request path.  A trailing `/` on the request is ignored.
    pub fn lookup(&self, path: &str) -> Option<Route<'_>> {
        let trimmed = path.trim_end_matches('/');
        let path = if trimmed.is_empty() { "/" } else { trimmed };

        if let Some(ws_path) = self.test_uis.get(path) {
            return Some(Route::TestUi { ws_path });
        }
        self.bridges.get(path).map(Route::Bridge)
    }

    pub fn is_test_path(&self, path: &str) -> bool {
        self.test_uis.contains_key(path)
    }

    pub fn test_paths(&self) -> impl Iterator<Item = &str> {
        self.test_uis.keys().map(String::as_str)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Arc<Endpoint>> {
        self.bridges.values()
    }

    fn register(&mut self, endpoint: Endpoint) -> Result<(), ConfigurationError> {
        let address = self.address.clone();
        let test_path = endpoint.test_path.clone();
        let ws_path = endpoint.ws_path.clone();

        if self.test_uis.contains_key(&test_path) {
            return Err(ConfigurationError::DuplicateTestPath {
                address,
                path: test_path,
            });
        }
        if self.bridges.contains_key(&test_path) {
            return Err(ConfigurationError::TestPathIsWebSocketPath {
                address,
                path: test_path,
            });
        }
        if self.bridges.contains_key(&ws_path) {
            return Err(ConfigurationError::DuplicateWebSocketPath {
                address,
                path: ws_path,
            });
        }
        if self.test_uis.contains_key(&ws_path) {
            return Err(ConfigurationError::WebSocketPathIsTestPath {
                address,
                path: ws_path,
            });
        }

        debug!(
            "address {}: test page {} → websocket {} (streams {:?}, format {})",
            self.address, test_path, ws_path, endpoint.streams, endpoint.format
        );
        self.test_uis.insert(test_path, ws_path.clone());
        self.bridges.insert(ws_path, Arc::new(endpoint));
        Ok(())
    }
}

// ── Building ──────────────────────────────────────────────────────────────────

/// Validates `config` and groups its endpoints by listening address.
///
/// Tables are returned in order of each address's first appearance.
///
/// # Errors
///
/// Returns the first [`ConfigurationError`] found.
pub fn build_route_tables(config: &GatewayConfig) -> Result<Vec<RouteTable>, ConfigurationError> {
    if config.schema_version != SCHEMA_VERSION {
        return Err(ConfigurationError::UnsupportedSchema(
            config.schema_version.clone(),
        ));
    }
    let tls = resolve_tls(config)?;

    let mut tables: Vec<RouteTable> = Vec::new();
    for descriptor in &config.endpoints {
        let endpoint = validate_endpoint(descriptor)?;
        let index = match tables.iter().position(|t| t.address == endpoint.address) {
            Some(index) => index,
            None => {
                tables.push(RouteTable::new(endpoint.address.clone(), tls.clone()));
                tables.len() - 1
            }
        };
        tables[index].register(endpoint)?;
    }
    Ok(tables)
}

fn resolve_tls(config: &GatewayConfig) -> Result<Option<TlsFiles>, ConfigurationError> {
    match (&config.tls_cert_file, &config.tls_key_file) {
        (None, None) => Ok(None),
        (Some(cert_file), Some(key_file)) => {
            if !cert_file.exists() {
                return Err(ConfigurationError::MissingTlsFile {
                    kind: "certificate",
                    path: cert_file.clone(),
                });
            }
            if !key_file.exists() {
                return Err(ConfigurationError::MissingTlsFile {
                    kind: "key",
                    path: key_file.clone(),
                });
            }
            Ok(Some(TlsFiles {
                cert_file: cert_file.clone(),
                key_file: key_file.clone(),
            }))
        }
        _ => Err(ConfigurationError::IncompleteTlsPair),
    }
}

fn validate_endpoint(descriptor: &EndpointDescriptor) -> Result<Endpoint, ConfigurationError> {
    let address = descriptor.address.trim().to_string();
    if address.is_empty() {
        return Err(ConfigurationError::MissingAddress);
    }

    let prefix = descriptor.endpoint_prefix.as_deref();
    let test_path = normalize_path(
        prefix,
        descriptor
            .endpoint_test
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_TEST_PATH),
    );
    let ws_path = normalize_path(prefix, descriptor.endpoint_websocket.as_deref().unwrap_or(""));
    if test_path == ws_path {
        return Err(ConfigurationError::SamePaths { path: ws_path });
    }

    let unsupported = |source: UnsupportedValue| ConfigurationError::Unsupported {
        address: address.clone(),
        source,
    };

    let broker_address = descriptor
        .broker
        .address
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ConfigurationError::MissingBrokerAddress {
            address: address.clone(),
        })?;

    let format = match descriptor.message_type.as_deref() {
        None | Some("") => MessageFormat::default(),
        Some(name) => name.parse().map_err(unsupported)?,
    };
    let offset_reset = match descriptor.broker.offset_reset.as_deref() {
        None | Some("") => OffsetReset::default(),
        Some(name) => name.parse().map_err(unsupported)?,
    };

    let publish_stream = descriptor
        .publish_stream
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(Endpoint {
        address,
        ws_path,
        test_path,
        streams: descriptor
            .streams
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        format,
        message_details: descriptor.message_details,
        compression: descriptor.compression,
        publish_stream,
        broker: BrokerSettings {
            address: broker_address.to_string(),
            group_id: descriptor.broker.group_id.clone().filter(|g| !g.is_empty()),
            offset_reset,
            allow_query_overrides: descriptor.broker.allow_query_overrides,
            extra: descriptor.broker.extra.clone(),
        },
    })
}

/// Joins `prefix` and `path` into a normalised absolute path.
///
/// ```rust
/// use rws_core::routing::normalize_path;
///
/// assert_eq!(normalize_path(None, "ws/"), "/ws");
/// assert_eq!(normalize_path(Some("/api/"), "/ws"), "/api/ws");
/// assert_eq!(normalize_path(None, ""), "/");
/// ```
pub fn normalize_path(prefix: Option<&str>, path: &str) -> String {
    let segments: Vec<&str> = [prefix.unwrap_or(""), path]
        .into_iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
