//! Relay configuration shared by the daemon and the client.
//!
//! Settings are resolved in precedence order:
//! defaults < TOML config file < environment < command-line flags.
//! The flag layer is applied by the binaries; this module handles the rest.

use std::env;
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default host the relay binds to and clients connect to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 5000;

/// Environment variable overriding the host.
pub const ENV_HOST: &str = "PARLEY_HOST";

/// Environment variable overriding the port.
pub const ENV_PORT: &str = "PARLEY_PORT";

/// Host/port configuration for the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Host or IP the daemon binds to and clients connect to.
    pub host: String,

    /// TCP port.
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl RelayConfig {
    /// Loads configuration from the file and environment layers.
    ///
    /// When `path` is `None`, the well-known location
    /// `<config_dir>/parley/config.toml` is used if it exists; a missing
    /// well-known file is not an error. An explicitly given `path` must be
    /// readable.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Read` if an explicit config file cannot be read
    /// - `ConfigError::Parse` if the file is not valid TOML
    /// - `ConfigError::InvalidPort` if `PARLEY_PORT` is set but not a port
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(explicit) => Self::from_file(explicit)?,
            None => match default_config_path() {
                Some(ref well_known) if well_known.exists() => Self::from_file(well_known)?,
                _ => Self::default(),
            },
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Applies `PARLEY_HOST` / `PARLEY_PORT` overrides.
    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = env::var(ENV_HOST) {
            if !host.trim().is_empty() {
                self.host = host.trim().to_string();
            }
        }
        if let Ok(port) = env::var(ENV_PORT) {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort { value: port })?;
        }
        Ok(())
    }

    /// Resolves the configured host/port to a socket address.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Unresolvable` if the host does not resolve
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let hostport = format!("{}:{}", self.host, self.port);
        hostport
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(ConfigError::Unresolvable { hostport })
    }
}

/// Well-known config file location, `<config_dir>/parley/config.toml`.
///
/// Returns `None` when the platform has no config directory (the daemon
/// then runs on defaults plus environment overrides).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("parley").join("config.toml"))
}

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// `PARLEY_PORT` is set but does not parse as a port number.
    #[error("invalid PARLEY_PORT value: {value:?}")]
    InvalidPort { value: String },

    /// The configured host/port does not resolve to a socket address.
    #[error("cannot resolve {hostport} to a socket address")]
    Unresolvable { hostport: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_loopback_port_5000() {
        let config = RelayConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5000);
    }

    #[test]
    fn default_socket_addr_resolves() {
        let addr = RelayConfig::default().socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:5000");
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = \"0.0.0.0\"\nport = 6000").unwrap();

        let config = RelayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 6000);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 7777").unwrap();

        let config = RelayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7777);
    }

    // Single test for both env behaviors: tests run in parallel and the
    // environment is process-global, so the PARLEY_* variables must only
    // ever be touched from one place.
    #[test]
    fn environment_overrides_the_file_layer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = \"0.0.0.0\"\nport = 6000").unwrap();

        env::set_var(ENV_HOST, "10.0.0.1");
        env::set_var(ENV_PORT, "7000");
        let overridden = RelayConfig::load(Some(file.path()));

        env::set_var(ENV_PORT, "not-a-port");
        let unparsable = RelayConfig::load(Some(file.path()));

        env::remove_var(ENV_HOST);
        env::remove_var(ENV_PORT);

        let config = overridden.unwrap();
        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.port, 7000);
        assert!(matches!(unparsable, Err(ConfigError::InvalidPort { .. })));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();

        let result = RelayConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn missing_explicit_file_is_a_read_error() {
        let result = RelayConfig::from_file(Path::new("/nonexistent/parley.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn unresolvable_host_is_reported() {
        let config = RelayConfig {
            host: "definitely-not-a-real-host.invalid".to_string(),
            port: 5000,
        };
        assert!(matches!(
            config.socket_addr(),
            Err(ConfigError::Unresolvable { .. })
        ));
    }
}
