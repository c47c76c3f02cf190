//! Runtime configuration handed to the server components.

use crate::aprs::AprsIsSettings;
use liveness::ReaperConfig;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Which store backs the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Redb { file: PathBuf, open_timeout: Duration },
}

/// Mailgun credentials and endpoint
#[derive(Clone)]
pub struct MailgunOptions {
    pub domain: String,
    pub api_key: String,
    pub from_address: String,
    /// API root, e.g. `https://api.mailgun.net/v3`
    pub api_base: String,
    pub timeout: Duration,
}

impl fmt::Debug for MailgunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailgunOptions")
            .field("domain", &self.domain)
            .field("api_key", &"<redacted>")
            .field("from_address", &self.from_address)
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// APRS-IS connection
    pub aprs: AprsIsSettings,

    /// First redial delay
    pub backoff_initial: Duration,

    /// Redial delay cap
    pub backoff_max: Duration,

    /// Demotion window, sweep interval and startup cooldown
    pub reaper: ReaperConfig,

    pub storage: StorageBackend,

    /// Mail delivery; `None` logs notifications instead of sending them
    pub mailgun: Option<MailgunOptions>,

    /// Serve the public and admin HTTP listeners
    pub http_enabled: bool,

    /// Public API and metrics listener
    pub listen_addr: String,

    /// Notification target management, keep on loopback
    pub admin_listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            aprs: AprsIsSettings {
                server: "noam.aprs2.net:14580".to_string(),
                user: "N0CALL".to_string(),
                passcode: "-1".to_string(),
                filter: "s//# s//& s/# s/&".to_string(),
                connect_timeout: Duration::from_secs(10),
            },
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            reaper: ReaperConfig::default(),
            storage: StorageBackend::Memory,
            mailgun: None,
            http_enabled: true,
            listen_addr: "0.0.0.0:8080".to_string(),
            admin_listen_addr: "127.0.0.1:8081".to_string(),
        }
    }
}
