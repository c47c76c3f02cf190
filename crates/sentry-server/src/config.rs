//! Configuration loading and validation for the sentry server

use crate::aprs::AprsIsSettings;
use crate::types::{MailgunOptions, ServerConfig, StorageBackend};
use liveness::ReaperConfig;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Exactly one storage backend must be configured, found {0}")]
    Storage(usize),

    #[error("Config file {} already exists", .0.display())]
    AlreadyExists(PathBuf),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub aprs: AprsSettings,

    #[serde(default)]
    pub liveness: LivenessSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailgun: Option<MailgunSettings>,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.aprs.validate()?;
        self.liveness.validate()?;
        if let Some(ref mailgun) = self.mailgun {
            mailgun.validate()?;
        }
        self.http.validate()?;
        Ok(())
    }
}

/// APRS-IS connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_backoff"))]
pub struct AprsSettings {
    #[validate(custom = "validate_server_addr")]
    pub server: String,

    #[validate(length(min = 1, max = 9))]
    pub user: String,

    #[validate(length(min = 1))]
    pub passcode: String,

    pub filter: String,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_connect_timeout")]
    pub connect_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub backoff_initial: Duration,

    #[serde(with = "humantime_serde")]
    pub backoff_max: Duration,
}

/// Liveness window and reaper settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LivenessSettings {
    /// Silence after which a node is considered down
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_cutoff")]
    pub cutoff: Duration,

    /// Start reaping immediately instead of after one cutoff period
    pub skip_cooldown: bool,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_sweep_interval")]
    pub sweep_interval: Duration,
}

/// Storage backend selection; exactly one must be present
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemorySettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redb: Option<RedbSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySettings {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedbSettings {
    pub file: PathBuf,

    #[serde(default = "default_open_timeout", with = "humantime_serde")]
    pub open_timeout: Duration,
}

/// Mailgun delivery settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MailgunSettings {
    #[validate(length(min = 1))]
    pub domain: String,

    #[validate(length(min = 1))]
    pub api_key: String,

    #[validate(length(min = 1))]
    pub from_address: String,

    #[serde(default = "default_api_base")]
    #[validate(custom = "validate_api_base")]
    pub api_base: String,

    #[serde(default = "default_mail_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HttpSettings {
    pub enabled: bool,

    #[validate(custom = "validate_listen_addr")]
    pub listen_addr: String,

    #[validate(custom = "validate_listen_addr")]
    pub admin_listen_addr: String,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

// Default implementations

impl Default for AprsSettings {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            server: defaults.aprs.server,
            user: defaults.aprs.user,
            passcode: defaults.aprs.passcode,
            filter: defaults.aprs.filter,
            connect_timeout: defaults.aprs.connect_timeout,
            backoff_initial: defaults.backoff_initial,
            backoff_max: defaults.backoff_max,
        }
    }
}

impl Default for LivenessSettings {
    fn default() -> Self {
        let defaults = ReaperConfig::default();
        Self {
            cutoff: defaults.window,
            skip_cooldown: defaults.skip_cooldown,
            sweep_interval: defaults.interval,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            memory: None,
            redb: Some(RedbSettings {
                file: PathBuf::from("sentry.redb"),
                open_timeout: default_open_timeout(),
            }),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "0.0.0.0:8080".to_string(),
            admin_listen_addr: "127.0.0.1:8081".to_string(),
        }
    }
}

fn default_open_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_api_base() -> String {
    "https://api.mailgun.net/v3".to_string()
}

fn default_mail_timeout() -> Duration {
    Duration::from_secs(10)
}

// Custom validators

fn validate_server_addr(server: &str) -> Result<(), ValidationError> {
    match server.trim().rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok_and(|p| p > 0) => {
            Ok(())
        }
        _ => Err(ValidationError::new("server_addr_invalid_format")),
    }
}

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    addr.parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("listen_addr_invalid"))
}

fn validate_api_base(base: &str) -> Result<(), ValidationError> {
    if base.starts_with("https://") || base.starts_with("http://") {
        Ok(())
    } else {
        Err(ValidationError::new("api_base_invalid_scheme"))
    }
}

fn validate_connect_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if !(100..=120_000).contains(&millis) {
        return Err(ValidationError::new("connect_timeout_out_of_range"));
    }
    Ok(())
}

fn validate_cutoff(cutoff: &Duration) -> Result<(), ValidationError> {
    if cutoff.as_secs() < 1 {
        return Err(ValidationError::new("cutoff_too_small"));
    }
    Ok(())
}

fn validate_sweep_interval(interval: &Duration) -> Result<(), ValidationError> {
    let millis = interval.as_millis();
    if !(10..=3_600_000).contains(&millis) {
        return Err(ValidationError::new("sweep_interval_out_of_range"));
    }
    Ok(())
}

fn validate_backoff(aprs: &AprsSettings) -> Result<(), ValidationError> {
    if aprs.backoff_initial.is_zero() || aprs.backoff_max < aprs.backoff_initial {
        return Err(ValidationError::new("backoff_invalid_range"));
    }
    Ok(())
}

/// Commented sample written by `sentry config create`
pub const SAMPLE_CONFIG: &str = r#"# sentry configuration

aprs:
  server: noam.aprs2.net:14580
  user: MYCALL
  # Receive-only connections may use -1
  passcode: "12345"
  filter: "s//# s//& s/# s/&"
  connect_timeout: 10s
  backoff_initial: 1s
  backoff_max: 60s

liveness:
  # Nodes silent for longer than this are reported down
  cutoff: 25h
  skip_cooldown: false
  sweep_interval: 1s

# Exactly one backend
storage:
  redb:
    file: sentry.redb
    open_timeout: 1s
  # memory: {}

# Remove this section to log notifications instead of sending them
mailgun:
  domain: example.com
  api_key: apikey
  from_address: "Sentry Alert Service <alert@example.com>"

http:
  enabled: true
  listen_addr: 0.0.0.0:8080
  admin_listen_addr: 127.0.0.1:8081

logging:
  level: info
  # format: json
"#;

// Configuration loading implementation

impl Config {
    /// Load from `path` when given, otherwise from the default search paths
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            tracing::info!("Loading configuration from: {}", path.display());
            return Self::load_from_file(path);
        }

        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and fully validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        config.storage.backend()?;
        Ok(config)
    }

    /// Write the sample configuration, refusing to replace an existing file
    pub fn write_sample(path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => ConfigError::AlreadyExists(path.to_path_buf()),
            _ => ConfigError::IoError(e),
        })?;
        file.write_all(SAMPLE_CONFIG.as_bytes())?;
        Ok(())
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/sentry/sentry.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./sentry.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/sentry/sentry.yaml"))
    }

    /// Convert to the runtime view used by the server
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        Ok(ServerConfig {
            aprs: AprsIsSettings {
                server: self.aprs.server.trim().to_string(),
                user: self.aprs.user.clone(),
                passcode: self.aprs.passcode.clone(),
                filter: self.aprs.filter.clone(),
                connect_timeout: self.aprs.connect_timeout,
            },
            backoff_initial: self.aprs.backoff_initial,
            backoff_max: self.aprs.backoff_max,
            reaper: ReaperConfig {
                window: self.liveness.cutoff,
                interval: self.liveness.sweep_interval,
                skip_cooldown: self.liveness.skip_cooldown,
            },
            storage: self.storage.backend()?,
            mailgun: self.mailgun.as_ref().map(|m| MailgunOptions {
                domain: m.domain.clone(),
                api_key: m.api_key.clone(),
                from_address: m.from_address.clone(),
                api_base: m.api_base.clone(),
                timeout: m.timeout,
            }),
            http_enabled: self.http.enabled,
            listen_addr: self.http.listen_addr.clone(),
            admin_listen_addr: self.http.admin_listen_addr.clone(),
        })
    }
}

impl StorageSettings {
    /// The single configured backend
    pub fn backend(&self) -> Result<StorageBackend, ConfigError> {
        match (&self.memory, &self.redb) {
            (Some(_), None) => Ok(StorageBackend::Memory),
            (None, Some(redb)) => Ok(StorageBackend::Redb {
                file: redb.file.clone(),
                open_timeout: redb.open_timeout,
            }),
            (memory, redb) => Err(ConfigError::Storage(
                usize::from(memory.is_some()) + usize::from(redb.is_some()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.storage.backend().is_ok());
    }

    #[test]
    fn test_sample_config_is_valid() {
        let config = Config::from_yaml(SAMPLE_CONFIG).unwrap();

        assert_eq!(config.aprs.user, "MYCALL");
        assert_eq!(config.liveness.cutoff, Duration::from_secs(25 * 60 * 60));
        assert_eq!(
            config.storage.backend().unwrap(),
            StorageBackend::Redb {
                file: PathBuf::from("sentry.redb"),
                open_timeout: Duration::from_secs(1),
            }
        );
        let mailgun = config.mailgun.expect("mailgun section");
        assert_eq!(mailgun.api_base, "https://api.mailgun.net/v3");
        assert_eq!(mailgun.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
aprs:
  user: KF7ABC
storage:
  memory: {}
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.aprs.user, "KF7ABC");
        assert_eq!(config.aprs.server, "noam.aprs2.net:14580");
        assert_eq!(config.aprs.backoff_max, Duration::from_secs(60));
        assert!(config.mailgun.is_none());
        assert!(config.http.enabled);

        let server = config.to_server_config().unwrap();
        assert_eq!(server.storage, StorageBackend::Memory);
        assert_eq!(server.reaper.window, Duration::from_secs(90_000));
        assert!(!server.reaper.skip_cooldown);
    }

    #[test]
    fn test_storage_requires_exactly_one_backend() {
        let none = "storage: {}\n";
        assert!(matches!(Config::from_yaml(none), Err(ConfigError::Storage(0))));

        let both = r#"
storage:
  memory: {}
  redb:
    file: /tmp/sentry.redb
"#;
        assert!(matches!(Config::from_yaml(both), Err(ConfigError::Storage(2))));
    }

    #[test]
    fn test_humantime_serde_parsing() {
        let yaml = r#"
liveness:
  cutoff: 90m
  skip_cooldown: true
  sweep_interval: 250ms
storage:
  memory: {}
"#;

        let server = Config::from_yaml(yaml).unwrap().to_server_config().unwrap();
        assert_eq!(server.reaper.window, Duration::from_secs(90 * 60));
        assert_eq!(server.reaper.interval, Duration::from_millis(250));
        assert!(server.reaper.skip_cooldown);
    }

    #[test]
    fn test_invalid_server_address() {
        for server in ["noam.aprs2.net", ":14580", "host:0", "host:port"] {
            let yaml = format!("aprs:\n  server: \"{server}\"\n");
            let config: Config = serde_yaml::from_str(&yaml).unwrap();
            assert!(config.validate().is_err(), "{server} should be rejected");
        }
        assert!(validate_server_addr("rotate.aprs2.net:14580").is_ok());
        assert!(validate_server_addr("[::1]:14580").is_ok());
    }

    #[test]
    fn test_invalid_backoff_range() {
        let yaml = r#"
aprs:
  backoff_initial: 30s
  backoff_max: 10s
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_sweep_interval() {
        let yaml = r#"
liveness:
  sweep_interval: 5ms
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_listen_addr() {
        let yaml = r#"
http:
  listen_addr: "localhost"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_incomplete_mailgun_section() {
        let yaml = r#"
mailgun:
  domain: example.com
  api_key: ""
  from_address: alert@example.com
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_write_sample_refuses_to_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sentry.yaml");

        Config::write_sample(&path).unwrap();
        assert!(Config::load(Some(path.as_path())).is_ok());

        let err = Config::write_sample(&path).unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyExists(_)));
    }
}
