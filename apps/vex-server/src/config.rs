//! # Server Configuration
//!
//! ## Load Order
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  1. Built-in defaults          ServerConfig::default()                │
//! │  2. TOML file (optional)       $VEX_CONFIG, else ./vex.toml           │
//! │  3. Environment                VEX_SERVER__PORT=9000                  │
//! │                                VEX_DATABASE__PATH=/var/lib/vex.db     │
//! │                                VEX_PUSH__ENABLED=true                 │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//! Later sources override earlier ones. The merged result is validated
//! before it is returned.
//!
//! ## Example File
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 9000
//!
//! [database]
//! path = "/var/lib/vex/vex.db"
//! queue_order = "command_id"      # or "enqueued"
//! duplicate_policy = "reject"     # or "overwrite"
//!
//! [push]
//! enabled = true
//! cert_path = "/etc/vex/push.pem"
//! key_path = "/etc/vex/push.key"
//! topic = "com.apple.mgmt.External.0000"
//! max_concurrency = 64
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vex_core::{DuplicatePolicy, QueueOrder};
use vex_db::DbConfig;
use vex_push::{ApnsConfig, DispatcherConfig, APNS_PRODUCTION_URL};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "VEX_CONFIG";

/// Config file used when `VEX_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "vex.toml";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 9000;

// =============================================================================
// Sections
// =============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub push: PushSection,
}

/// `[server]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl HttpSection {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `[database]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default)]
    pub queue_order: QueueOrder,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

/// `<data dir>/vex.db`, or `./vex.db` when the platform has no data dir.
fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("io", "Vex", "vex-mdm")
        .map(|dirs| dirs.data_dir().join("vex.db"))
        .unwrap_or_else(|| PathBuf::from("vex.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            queue_order: QueueOrder::default(),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl DatabaseSection {
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.path)
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .queue_order(self.queue_order)
            .duplicate_policy(self.duplicate_policy)
    }
}

/// `[push]`
///
/// Push is off unless enabled; without it commands are still queued and
/// devices pick them up on their next check-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_push_url")]
    pub base_url: String,
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_push_url() -> String {
    APNS_PRODUCTION_URL.to_string()
}

fn default_max_concurrency() -> usize {
    vex_push::DEFAULT_MAX_CONCURRENCY
}

fn default_request_timeout_secs() -> u64 {
    vex_push::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl Default for PushSection {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_push_url(),
            cert_path: None,
            key_path: None,
            topic: None,
            max_concurrency: default_max_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl PushSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_concurrency: self.max_concurrency,
            request_timeout: self.request_timeout(),
        }
    }

    /// APNs client settings, or `None` when push is disabled.
    pub fn apns_config(&self) -> Result<Option<ApnsConfig>, ConfigError> {
        if !self.enabled {
            return Ok(None);
        }
        let (Some(cert_path), Some(key_path)) = (&self.cert_path, &self.key_path) else {
            return Err(ConfigError::MissingPushCredentials);
        };
        Ok(Some(ApnsConfig {
            base_url: self.base_url.clone(),
            cert_path: cert_path.clone(),
            key_path: key_path.clone(),
            topic: self.topic.clone(),
            request_timeout: self.request_timeout(),
        }))
    }
}

// =============================================================================
// Loading
// =============================================================================

impl ServerConfig {
    /// Loads from `$VEX_CONFIG` (or `vex.toml`) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    /// Loads from the given file, if it exists, and the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&ServerConfig::default())?)
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("VEX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::MissingRequired("server.host".to_string()));
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired("database.path".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::InvalidValue(
                "database.min_connections exceeds database.max_connections".to_string(),
            ));
        }
        if self.push.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "push.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.push.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "push.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.push.apns_config()?;
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidValue(String),

    #[error("Push enabled but certificate or key path not provided")]
    MissingPushCredentials,

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vex-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(!config.push.enabled);
        assert_eq!(config.database.queue_order, QueueOrder::CommandId);
        assert_eq!(config.database.duplicate_policy, DuplicatePolicy::Reject);
        assert!(config.database.path.ends_with("vex.db"));
    }

    #[test]
    fn test_bind_address() {
        let section = HttpSection {
            host: "127.0.0.1".to_string(),
            port: 8443,
        };
        assert_eq!(section.bind_address(), "127.0.0.1:8443");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("vex-config-does-not-exist.toml");
        let config = ServerConfig::load_from(&path).unwrap();
        assert_eq!(config.push.max_concurrency, vex_push::DEFAULT_MAX_CONCURRENCY);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = write_temp(
            r#"
            [server]
            port = 8080

            [database]
            path = "/tmp/vex-test.db"
            queue_order = "enqueued"
            duplicate_policy = "overwrite"

            [push]
            max_concurrency = 8
            "#,
        );

        let config = ServerConfig::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.path, PathBuf::from("/tmp/vex-test.db"));
        assert_eq!(config.database.queue_order, QueueOrder::Enqueued);
        assert_eq!(config.database.duplicate_policy, DuplicatePolicy::Overwrite);
        assert_eq!(config.push.max_concurrency, 8);
        assert_eq!(config.push.request_timeout(), vex_push::DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_push_requires_credentials() {
        let mut config = ServerConfig::default();
        config.push.enabled = true;
        assert!(matches!(config.validate(), Err(ConfigError::MissingPushCredentials)));

        config.push.cert_path = Some(PathBuf::from("/etc/vex/push.pem"));
        config.push.key_path = Some(PathBuf::from("/etc/vex/push.key"));
        config.validate().unwrap();

        let apns = config.push.apns_config().unwrap().unwrap();
        assert_eq!(apns.base_url, APNS_PRODUCTION_URL);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = ServerConfig::default();
        config.push.max_concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = ServerConfig::default();
        config.database.min_connections = 10;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }
}
