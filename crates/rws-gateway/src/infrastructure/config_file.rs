//! Reading the configuration file and writing the `--init` template.
//!
//! The format follows the file name: `.toml` is TOML, anything else YAML.

use std::path::{Path, PathBuf};

use rws_core::{build_route_tables, ConfigFormat, ConfigurationError, GatewayConfig, RouteTable};
use thiserror::Error;
use tracing::info;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The file could not be read or written.
    #[error("configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file was read but is not a valid configuration.
    #[error("configuration file {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: ConfigurationError,
    },
}

/// Reads and parses `path`.
///
/// # Errors
///
/// Returns [`ConfigFileError::Io`] if the file cannot be read and
/// [`ConfigFileError::Invalid`] if it does not match the schema of its format.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let format = ConfigFormat::from_path(path);
    GatewayConfig::parse(&text, format).map_err(|source| ConfigFileError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads `path` and validates it into route tables.
///
/// Relative TLS file paths are resolved against the configuration file's
/// directory.
///
/// # Errors
///
/// See [`load_config`]; validation failures are [`ConfigFileError::Invalid`].
pub fn load_route_tables(path: &Path) -> Result<Vec<RouteTable>, ConfigFileError> {
    let mut config = load_config(path)?;
    if let Some(base) = path.parent() {
        for file in [&mut config.tls_cert_file, &mut config.tls_key_file]
            .into_iter()
            .flatten()
        {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
    }
    build_route_tables(&config).map_err(|source| ConfigFileError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes the template configuration for `path`'s format unless a file
/// already exists.
///
/// Returns `true` when the template was written.
///
/// # Errors
///
/// Returns [`ConfigFileError::Io`] for file-system failures.
pub fn write_template(path: &Path) -> Result<bool, ConfigFileError> {
    if path.exists() {
        info!("configuration file {} already exists", path.display());
        return Ok(false);
    }
    let template = ConfigFormat::from_path(path).template();
    std::fs::write(path, template).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("wrote template configuration to {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_template_creates_loadable_file() {
        for name in ["config.yaml", "config.toml"] {
            // Arrange
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join(name);

            // Act
            let written = write_template(&path).unwrap();

            // Assert
            assert!(written);
            let tables = load_route_tables(&path).unwrap();
            assert_eq!(tables.len(), 1, "{name}");
            assert_eq!(tables[0].address(), ":9999", "{name}");
        }
    }

    #[test]
    fn test_default_yaml_template_is_dotted_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        write_template(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("schema.version: \"1.0\""));
        assert!(text.contains("redis.to.websocket:"));
    }

    #[test]
    fn test_existing_yaml_config_loads() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
schema.version: "1.0"
redis.to.websocket:
  - redis.client.config:
      metadata.broker.list: localhost:6379
      group.id: my-redis-group
    redis.default.stream.config:
      auto.offset.reset: latest
    redis.streams:
      - orders
    address: :9999
    endpoint.websocket: ws
  - redis.client.config:
      metadata.broker.list: localhost:6379
    redis.streams:
      - audit
    address: :9999
    endpoint.websocket: audit
    endpoint.test: audit/test
"#,
        )
        .unwrap();

        // Act
        let tables = load_route_tables(&path).unwrap();

        // Assert
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].address(), ":9999");
    }

    #[test]
    fn test_write_template_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "# mine").unwrap();

        let written = write_template(&path).unwrap();

        assert!(!written);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine");
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigFileError::Io { .. })));
    }

    #[test]
    fn test_invalid_yaml_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "redis.to.websocket: [").unwrap();

        assert!(matches!(
            load_config(&path),
            Err(ConfigFileError::Invalid {
                source: ConfigurationError::ParseYaml(_),
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_toml_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "schema_version = [").unwrap();

        assert!(matches!(
            load_config(&path),
            Err(ConfigFileError::Invalid { .. })
        ));
    }

    #[test]
    fn test_relative_tls_files_resolve_next_to_config() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gw.crt"), "cert").unwrap();
        std::fs::write(dir.path().join("gw.key"), "key").unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            tls_cert_file = "gw.crt"
            tls_key_file = "gw.key"

            [[endpoint]]
            address = ":9443"
            streams = ["orders"]

            [endpoint.broker]
            address = "localhost:6379"
            "#,
        )
        .unwrap();

        // Act
        let tables = load_route_tables(&path).unwrap();

        // Assert
        let tls = tables[0].tls().unwrap();
        assert_eq!(tls.cert_file, dir.path().join("gw.crt"));
    }

    #[test]
    fn test_validation_failure_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [[endpoint]]
            address = ":1"
            "#,
        )
        .unwrap();

        let err = load_route_tables(&path).unwrap_err();

        assert!(matches!(
            err,
            ConfigFileError::Invalid {
                source: ConfigurationError::MissingBrokerAddress { .. },
                ..
            }
        ));
    }
}
