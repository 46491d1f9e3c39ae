//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via DOCWIRE_CONFIG)
//! 3. Environment variables

use docwire_protocol::{DEFAULT_PORT, MAX_MESSAGE_SIZE, MIN_MESSAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Names the YAML file to load.
pub const CONFIG_ENV: &str = "DOCWIRE_CONFIG";

/// Server configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// TLS configuration.
    pub tls: TlsConfig,
    /// Message limits and reply options.
    pub limits: LimitsConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `DOCWIRE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary variable source. Unparseable
    /// values are ignored.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.network.apply_overrides(&var);
        self.tls.apply_overrides(&var);
        self.limits.apply_overrides(&var);
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tls.validate()?;
        self.limits.validate()
    }
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Idle connection timeout in seconds.
    pub idle_timeout_secs: u64,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            idle_timeout_secs: 300,
            max_connections: 1000,
        }
    }
}

impl NetworkConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("DOCWIRE_BIND").and_then(|v| v.parse().ok()) {
            self.bind_addr = addr;
        }
        if let Some(secs) = var("DOCWIRE_IDLE_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.idle_timeout_secs = secs;
        }
        if let Some(n) = var("DOCWIRE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.max_connections = n;
        }
    }

    /// Returns idle timeout as Duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// TLS configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Enable TLS.
    pub enabled: bool,
    /// Path to PEM-encoded server certificate chain.
    pub cert_path: Option<PathBuf>,
    /// Path to PEM-encoded private key.
    pub key_path: Option<PathBuf>,
}

impl TlsConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(enabled) = var("DOCWIRE_TLS_ENABLED") {
            self.enabled = parse_flag(&enabled);
        }
        if let Some(path) = var("DOCWIRE_TLS_CERT") {
            self.cert_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var("DOCWIRE_TLS_KEY") {
            self.key_path = Some(PathBuf::from(path));
        }
    }

    /// Validates TLS configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.cert_path.is_none() {
            return Err(ConfigError::Validation(
                "TLS enabled but cert_path not set".to_string(),
            ));
        }
        if self.key_path.is_none() {
            return Err(ConfigError::Validation(
                "TLS enabled but key_path not set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Message limits and reply options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted message in bytes.
    pub max_message_size: usize,
    /// Append a CRC32C checksum to every OP_MSG reply.
    pub checksum_replies: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: MAX_MESSAGE_SIZE,
            checksum_replies: false,
        }
    }
}

impl LimitsConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(size) = var("DOCWIRE_MAX_MESSAGE_SIZE").and_then(|v| v.parse().ok()) {
            self.max_message_size = size;
        }
        if let Some(checksum) = var("DOCWIRE_CHECKSUM_REPLIES") {
            self.checksum_replies = parse_flag(&checksum);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_MESSAGE_SIZE..=MAX_MESSAGE_SIZE).contains(&self.max_message_size) {
            return Err(ConfigError::Validation(format!(
                "max_message_size {} outside {}..={}",
                self.max_message_size, MIN_MESSAGE_SIZE, MAX_MESSAGE_SIZE
            )));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Serializes SocketAddr as a string in YAML.
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(addr)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.bind_addr.to_string(), "127.0.0.1:27017");
        assert_eq!(config.network.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.limits.max_message_size, 48_000_000);
        assert!(!config.limits.checksum_replies);
        assert!(!config.tls.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = Config::default();
        config.network.bind_addr = "0.0.0.0:27018".parse().unwrap();
        config.limits.checksum_replies = true;

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "network:\n  bind_addr: \"0.0.0.0:9000\"\nlimits:\n  max_message_size: 1024").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.network.bind_addr.port(), 9000);
        assert_eq!(config.network.max_connections, 1000);
        assert_eq!(config.limits.max_message_size, 1024);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docwire.yaml");
        let mut config = Config::default();
        config.network.max_connections = 7;
        config.save(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_and_malformed_file() {
        let err = Config::from_file("/nonexistent/docwire.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/docwire.yaml"));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "network: [not, a, map]").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vars(&[
            ("DOCWIRE_BIND", "0.0.0.0:27999"),
            ("DOCWIRE_IDLE_TIMEOUT", "5"),
            ("DOCWIRE_MAX_CONNECTIONS", "3"),
            ("DOCWIRE_TLS_ENABLED", "TRUE"),
            ("DOCWIRE_TLS_CERT", "/etc/docwire/cert.pem"),
            ("DOCWIRE_TLS_KEY", "/etc/docwire/key.pem"),
            ("DOCWIRE_MAX_MESSAGE_SIZE", "65536"),
            ("DOCWIRE_CHECKSUM_REPLIES", "1"),
        ]));

        assert_eq!(config.network.bind_addr.port(), 27999);
        assert_eq!(config.network.idle_timeout_secs, 5);
        assert_eq!(config.network.max_connections, 3);
        assert!(config.tls.enabled);
        assert_eq!(
            config.tls.cert_path.as_deref(),
            Some(Path::new("/etc/docwire/cert.pem"))
        );
        assert_eq!(config.limits.max_message_size, 65536);
        assert!(config.limits.checksum_replies);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparseable_overrides_ignored() {
        let mut config = Config::default();
        config.apply_overrides(vars(&[
            ("DOCWIRE_BIND", "not an address"),
            ("DOCWIRE_MAX_CONNECTIONS", "-1"),
        ]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.tls.enabled = true;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = Config::default();
        config.limits.max_message_size = 10;
        assert!(config.validate().is_err());
        config.limits.max_message_size = MAX_MESSAGE_SIZE + 1;
        assert!(config.validate().is_err());
    }
}
