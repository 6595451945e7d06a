//! Configuration for the API server.
//!
//! Configuration is loaded from a YAML file. Every field has a default, so a
//! file only needs the values it changes.
//!
//! ```yaml
//! server:
//!   address: "0.0.0.0:8080"
//!   graceful_shutdown_delay: 5s
//! hypervisor:
//!   uri: "qemu:///system"
//!   image_root: "/var/lib/libvirt/images"
//! logging:
//!   log_level: info
//!   format: json
//! ```

use serde::{Deserialize, Deserializer};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vmapi_core::OrchestratorConfig;
use vmapi_virt::{QemuImg, VirshConnector};

/// Environment variable overriding `server.address`.
pub const ADDRESS_ENV: &str = "SERVER_ADDRESS";

/// Configuration loading error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid SERVER_ADDRESS {value:?}: {source}")]
    InvalidAddress {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("invalid hypervisor settings: {0}")]
    Hypervisor(#[from] vmapi_core::CoreError),
}

/// Complete server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: HttpConfig,
    pub hypervisor: HypervisorConfig,
    pub healthcheck: HealthcheckConfig,
    pub logging: LoggingConfig,
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address (default: `0.0.0.0:8080`).
    pub address: SocketAddr,
    /// How long in-flight requests may run after a shutdown signal.
    #[serde(deserialize_with = "deserialize_duration")]
    pub graceful_shutdown_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080),
            graceful_shutdown_delay: Duration::from_secs(5),
        }
    }
}

/// Hypervisor and image settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HypervisorConfig {
    /// libvirt connection URI.
    pub uri: String,
    /// Directory holding per-VM disk images.
    pub image_root: PathBuf,
    /// libvirt network for VM NICs.
    pub network: String,
    /// `virsh` binary.
    pub virsh_path: PathBuf,
    /// `qemu-img` binary.
    pub qemu_img_path: PathBuf,
}

impl Default for HypervisorConfig {
    fn default() -> Self {
        let core = OrchestratorConfig::default();
        Self {
            uri: core.endpoint_uri,
            image_root: core.image_root,
            network: core.network,
            virsh_path: PathBuf::from("virsh"),
            qemu_img_path: PathBuf::from("qemu-img"),
        }
    }
}

impl HypervisorConfig {
    /// Orchestrator settings for this section.
    pub fn orchestrator(&self) -> Result<OrchestratorConfig, ConfigError> {
        Ok(OrchestratorConfig::builder()
            .endpoint_uri(self.uri.as_str())
            .image_root(self.image_root.as_path())
            .network(self.network.as_str())
            .build()?)
    }

    /// libvirt connector using the configured binaries.
    pub fn connector(&self) -> VirshConnector {
        VirshConnector::new(
            self.virsh_path.as_path(),
            QemuImg::new(self.qemu_img_path.as_path()),
        )
    }
}

/// Health endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HealthcheckConfig {
    /// Serve `GET /health` (default: true).
    pub enabled: bool,
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: LogLevel,
    pub format: LogFormat,
}

/// Minimum level logged when `RUST_LOG` is not set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log line encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl ServerConfig {
    /// Load configuration from `path`, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&raw)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse configuration from YAML text without consulting the environment.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to an empty mapping.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Apply overrides looked up through `lookup`. Empty values are ignored.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ADDRESS_ENV).filter(|v| !v.is_empty()) {
            self.server.address = value
                .parse()
                .map_err(|source| ConfigError::InvalidAddress { value, source })?;
        }
        Ok(())
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.address.port(), 8080);
        assert_eq!(config.server.graceful_shutdown_delay, Duration::from_secs(5));
        assert_eq!(config.hypervisor.uri, "qemu:///system");
        assert_eq!(
            config.hypervisor.image_root,
            PathBuf::from("/var/lib/libvirt/images")
        );
        assert!(config.healthcheck.enabled);
        assert_eq!(config.logging.log_level, LogLevel::Info);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_full_yaml() {
        let config = ServerConfig::from_yaml(
            r#"
server:
  address: "127.0.0.1:9090"
  graceful_shutdown_delay: 1m 30s
hypervisor:
  uri: "qemu+ssh://host/system"
  image_root: "/srv/images"
  network: "isolated"
  virsh_path: "/usr/bin/virsh"
  qemu_img_path: "/usr/bin/qemu-img"
healthcheck:
  enabled: false
logging:
  log_level: warn
  format: text
"#,
        )
        .unwrap();

        assert_eq!(config.server.address, "127.0.0.1:9090".parse::<SocketAddr>().unwrap());
        assert_eq!(config.server.graceful_shutdown_delay, Duration::from_secs(90));
        assert_eq!(config.hypervisor.uri, "qemu+ssh://host/system");
        assert_eq!(config.hypervisor.network, "isolated");
        assert_eq!(config.hypervisor.virsh_path, PathBuf::from("/usr/bin/virsh"));
        assert!(!config.healthcheck.enabled);
        assert_eq!(config.logging.log_level, LogLevel::Warn);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ServerConfig::from_yaml("logging:\n  log_level: debug\n").unwrap();
        assert_eq!(config.logging.log_level, LogLevel::Debug);
        assert_eq!(config.server, HttpConfig::default());
        assert_eq!(config.hypervisor, HypervisorConfig::default());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(ServerConfig::from_yaml("").unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let err = ServerConfig::from_yaml("logging:\n  log_level: verbose\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let err =
            ServerConfig::from_yaml("server:\n  graceful_shutdown_delay: soon\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_address_override() {
        let mut config = ServerConfig::default();
        config
            .apply_overrides(|key| (key == ADDRESS_ENV).then(|| "127.0.0.1:3000".to_string()))
            .unwrap();
        assert_eq!(config.server.address, "127.0.0.1:3000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_empty_override_ignored() {
        let mut config = ServerConfig::default();
        config.apply_overrides(|_| Some(String::new())).unwrap();
        assert_eq!(config.server.address.port(), 8080);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_overrides(|_| Some("not an address".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServerConfig::load(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_orchestrator_config() {
        let mut config = HypervisorConfig::default();
        config.image_root = PathBuf::from("/srv/images");
        let orchestrator = config.orchestrator().unwrap();
        assert_eq!(orchestrator.endpoint_uri, "qemu:///system");
        assert_eq!(orchestrator.image_root, PathBuf::from("/srv/images"));

        config.uri.clear();
        assert!(matches!(
            config.orchestrator(),
            Err(ConfigError::Hypervisor(_))
        ));
    }
}
