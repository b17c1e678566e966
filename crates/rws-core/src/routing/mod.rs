//! Configuration descriptors and the per-address route tables built from them.

pub mod descriptor;
pub mod table;
mod yaml;

pub use descriptor::{
    BrokerDescriptor, ConfigFormat, EndpointDescriptor, GatewayConfig, SCHEMA_VERSION,
    TOML_TEMPLATE, YAML_TEMPLATE,
};
pub use table::{build_route_tables, normalize_path, ConfigurationError, Route, RouteTable};
