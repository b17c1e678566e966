//! The dotted-key YAML schema read from `config.yaml`.
//!
//! ```yaml
//! schema.version: "1.0"
//! redis.to.websocket:
//!   - redis.client.config:
//!       metadata.broker.list: localhost:6379
//!       group.id: my-redis-group
//!     redis.default.stream.config:
//!       auto.offset.reset: latest
//!     redis.streams:
//!       - orders
//!     address: :9999
//! ```
//!
//! Each document is mapped onto the same [`GatewayConfig`] the TOML schema
//! produces, so both formats share one validation path.  In the two broker
//! maps the gateway interprets the broker address, `group.id` and
//! `auto.offset.reset`; every other key is passed through as an extra setting.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use super::descriptor::{
    default_schema_version, BrokerDescriptor, EndpointDescriptor, GatewayConfig,
};

/// Keys naming the broker address, in order of preference.
const ADDRESS_KEYS: [&str; 3] = ["address", "addr", "metadata.broker.list"];
const GROUP_ID_KEY: &str = "group.id";
const OFFSET_RESET_KEY: &str = "auto.offset.reset";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct YamlConfig {
    #[serde(rename = "schema.version", default = "default_schema_version")]
    schema_version: String,
    #[serde(rename = "tls.cert.file", default)]
    tls_cert_file: Option<PathBuf>,
    #[serde(rename = "tls.key.file", default)]
    tls_key_file: Option<PathBuf>,
    #[serde(rename = "redis.to.websocket", default)]
    endpoints: Vec<YamlEndpoint>,
}

/// One `redis.to.websocket` item.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlEndpoint {
    #[serde(rename = "redis.client.config", default)]
    client: BTreeMap<String, Scalar>,
    #[serde(rename = "redis.default.stream.config", default)]
    stream: BTreeMap<String, Scalar>,
    #[serde(rename = "redis.streams", default)]
    streams: Vec<String>,
    #[serde(default)]
    address: String,
    #[serde(rename = "message.type", default)]
    message_type: Option<String>,
    #[serde(rename = "message.details", default)]
    message_details: bool,
    #[serde(default)]
    compression: bool,
    #[serde(rename = "endpoint.prefix", default)]
    endpoint_prefix: Option<String>,
    #[serde(rename = "endpoint.websocket", default)]
    endpoint_websocket: Option<String>,
    #[serde(rename = "endpoint.test", default)]
    endpoint_test: Option<String>,
    #[serde(rename = "publish.stream", default)]
    publish_stream: Option<String>,
    #[serde(rename = "query.overrides", default)]
    allow_query_overrides: bool,
}

/// A broker setting.  Nested maps and lists are rejected while parsing.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Integer(value) => write!(f, "{value}"),
            Scalar::Float(value) => write!(f, "{value}"),
            Scalar::Text(value) => f.write_str(value),
        }
    }
}

impl From<YamlConfig> for GatewayConfig {
    fn from(document: YamlConfig) -> Self {
        GatewayConfig {
            schema_version: document.schema_version,
            tls_cert_file: document.tls_cert_file.filter(|p| !p.as_os_str().is_empty()),
            tls_key_file: document.tls_key_file.filter(|p| !p.as_os_str().is_empty()),
            endpoints: document.endpoints.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<YamlEndpoint> for EndpointDescriptor {
    fn from(endpoint: YamlEndpoint) -> Self {
        let mut settings: BTreeMap<String, String> = endpoint
            .stream
            .into_iter()
            .chain(endpoint.client)
            .map(|(key, value)| (key, value.to_string()))
            .collect();

        let address = ADDRESS_KEYS.iter().find_map(|key| settings.remove(*key));
        for key in ADDRESS_KEYS {
            settings.remove(key);
        }

        EndpointDescriptor {
            address: endpoint.address,
            streams: endpoint.streams,
            message_type: endpoint.message_type,
            message_details: endpoint.message_details,
            compression: endpoint.compression,
            endpoint_prefix: endpoint.endpoint_prefix,
            endpoint_websocket: endpoint.endpoint_websocket,
            endpoint_test: endpoint.endpoint_test,
            publish_stream: endpoint.publish_stream,
            broker: BrokerDescriptor {
                address,
                group_id: settings.remove(GROUP_ID_KEY),
                offset_reset: settings.remove(OFFSET_RESET_KEY),
                allow_query_overrides: endpoint.allow_query_overrides,
                extra: settings,
            },
        }
    }
}
