//! Configuration schema: the raw, unvalidated endpoint descriptors.
//!
//! Two file formats map onto these descriptors.  YAML with dotted keys is the
//! default (`schema.version`, `redis.to.websocket`, ...); a file ending in
//! `.toml` is read as TOML, where every `[[endpoint]]` table describes one
//! binding of a WebSocket path to a set of streams:
//!
//! ```toml
//! schema_version = "1.0"
//!
//! [[endpoint]]
//! address = ":9999"
//! streams = ["orders"]
//!
//! [endpoint.broker]
//! address = "localhost:6379"
//! ```
//!
//! Fields left out of the file fall back to the defaults applied by
//! [`crate::routing::build_route_tables`]; this module only describes shape.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::table::ConfigurationError;
use super::yaml::YamlConfig;

/// The only configuration schema this build understands.
pub const SCHEMA_VERSION: &str = "1.0";

/// YAML template written by `rws-gateway --init`.
pub const YAML_TEMPLATE: &str = r#"schema.version: "1.0"
# tls.cert.file: my-domain.crt
# tls.key.file: my-domain.key
redis.to.websocket:
  - redis.client.config:
      metadata.broker.list: localhost:6379
      group.id: my-redis-group
      # password: secret
      # db: 0
    redis.default.stream.config:
      auto.offset.reset: latest       # latest | earliest
    redis.streams:
      - my.redis.stream
    address: :9999
    # message.details: false
    # message.type: json              # json | text | simple-json | binary | csv
    # compression: false
    # endpoint.prefix: ""
    # endpoint.websocket: ws
    # endpoint.test: test
    # publish.stream: replies
    # query.overrides: false
"#;

/// TOML template written by `rws-gateway --init --config <file>.toml`.
pub const TOML_TEMPLATE: &str = r#"schema_version = "1.0"
# tls_cert_file = "my-domain.crt"
# tls_key_file = "my-domain.key"

[[endpoint]]
address = ":9999"
streams = ["my.redis.stream"]
# message_type = "json"        # json | text | simple-json | binary | csv
# message_details = false
# compression = false
# endpoint_prefix = ""
# endpoint_websocket = "ws"
# endpoint_test = "test"
# publish_stream = "replies"

[endpoint.broker]
address = "localhost:6379"
# group_id = "my-redis-group"
# offset_reset = "latest"      # latest | earliest
# allow_query_overrides = false

# [endpoint.broker.extra]
# password = "secret"
"#;

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Certificate shared by every listener.  Must be paired with `tls_key_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_cert_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_key_file: Option<PathBuf>,
    #[serde(default, rename = "endpoint")]
    pub endpoints: Vec<EndpointDescriptor>,
}

/// One `[[endpoint]]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct EndpointDescriptor {
    /// `host:port` or `:port`.
    pub address: String,
    #[serde(default)]
    pub streams: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(default)]
    pub message_details: bool,
    #[serde(default)]
    pub compression: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_websocket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_test: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_stream: Option<String>,
    #[serde(default)]
    pub broker: BrokerDescriptor,
}

/// The `[endpoint.broker]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BrokerDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_reset: Option<String>,
    #[serde(default)]
    pub allow_query_overrides: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

pub(super) fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Configuration file format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// `.toml` files are TOML; everything else, `config.yaml` included, is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }

    pub fn template(self) -> &'static str {
        match self {
            ConfigFormat::Yaml => YAML_TEMPLATE,
            ConfigFormat::Toml => TOML_TEMPLATE,
        }
    }
}

impl GatewayConfig {
    /// Parses a configuration document in `format`.  Validation happens
    /// later, when the route tables are built.
    pub fn parse(text: &str, format: ConfigFormat) -> Result<Self, ConfigurationError> {
        match format {
            ConfigFormat::Yaml => Self::from_yaml_str(text),
            ConfigFormat::Toml => Self::from_toml_str(text),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigurationError> {
        let document: YamlConfig = serde_yaml::from_str(text)?;
        Ok(document.into())
    }
}
