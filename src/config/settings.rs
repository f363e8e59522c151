//! Configuration settings structure
//!
//! Defines the main settings structure and loading logic for the monitor.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::TenantConfig;

/// Main configuration settings for the monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server configuration
    pub server: ServerSettings,
    /// Polling configuration
    pub refresh: RefreshSettings,
    /// Relay client configuration
    pub relay: RelaySettings,
    /// OTP escalation configuration
    pub otp: OtpSettings,
    /// Token persistence configuration
    pub storage: StorageSettings,
    /// Dashboard navigation configuration
    pub navigation: NavigationSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
    /// Optional JSON or TOML file listing tenants
    pub sites_file: Option<PathBuf>,
    /// Tenants declared inline
    pub tenants: Vec<TenantConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
}

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    /// Seconds between refresh batches
    pub interval_secs: u64,
    /// `pageNo` sent with every count request
    pub page_no: u32,
    /// `maxResult` sent with every count request
    pub max_result: u32,
}

/// How outbound requests reach the tenants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Call tenant endpoints directly
    Direct,
    /// Go through an external `/api/proxy` relay
    Proxy,
}

/// Relay client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub mode: RelayMode,
    /// Relay endpoint, required in proxy mode
    pub proxy_url: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// User agent presented to the tenants
    pub user_agent: String,
}

/// Where OTP prompts are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OtpMode {
    /// Pending prompts are listed and answered through the HTTP API
    Http,
    /// Prompt on the controlling terminal
    Terminal,
    /// Cancel every prompt
    Disabled,
}

/// OTP escalation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpSettings {
    pub mode: OtpMode,
    /// Seconds to wait for one prompt before failing the login
    pub timeout_secs: u64,
    /// Codes accepted per login before giving up
    pub max_attempts: u32,
}

/// Token persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Keep tokens across restarts
    pub persist: bool,
    /// Token file; defaults to the user cache directory
    pub token_file: Option<PathBuf>,
}

/// Dashboard navigation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationSettings {
    /// Program used to open tenant dashboards
    pub open_command: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level
    pub level: String,
    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4417,
        }
    }
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            page_no: 1,
            max_result: 50,
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            mode: RelayMode::Direct,
            proxy_url: None,
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36".to_string(),
        }
    }
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            mode: OtpMode::Http,
            timeout_secs: 300,
            max_attempts: 3,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            persist: true,
            token_file: None,
        }
    }
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            open_command: "xdg-open".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbose: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            refresh: RefreshSettings::default(),
            relay: RelaySettings::default(),
            otp: OtpSettings::default(),
            storage: StorageSettings::default(),
            navigation: NavigationSettings::default(),
            logging: LoggingSettings::default(),
            sites_file: None,
            tenants: Vec::new(),
        }
    }
}

impl RefreshSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn page(&self) -> crate::types::Page {
        crate::types::Page::new(self.page_no, self.max_result)
    }
}

impl RelaySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl OtpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    /// Create new settings with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&contents)?;
        Ok(settings)
    }

    /// Load settings from environment variables
    pub fn from_env() -> crate::Result<Self> {
        Self::default().merge_with_env()
    }

    /// Apply `MONITOR_*` environment overrides
    pub fn merge_with_env(mut self) -> crate::Result<Self> {
        if let Ok(host) = std::env::var("MONITOR_SERVER_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("MONITOR_SERVER_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid port: {}", e)))?;
        }

        if let Ok(interval) = std::env::var("MONITOR_REFRESH_INTERVAL") {
            self.refresh.interval_secs = interval
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid refresh interval: {}", e)))?;
        }

        if let Ok(timeout) = std::env::var("MONITOR_OTP_TIMEOUT") {
            self.otp.timeout_secs = timeout
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid OTP timeout: {}", e)))?;
        }

        if let Ok(path) = std::env::var("MONITOR_SITES_FILE") {
            self.sites_file = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("MONITOR_TOKEN_FILE") {
            self.storage.token_file = Some(PathBuf::from(path));
        }

        if let Ok(url) = std::env::var("MONITOR_PROXY_URL") {
            self.relay.mode = RelayMode::Proxy;
            self.relay.proxy_url = Some(url);
        }

        Ok(self)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.refresh.interval_secs == 0 {
            return Err(crate::Error::config("refresh.interval_secs must be positive"));
        }
        if self.refresh.page_no == 0 || self.refresh.max_result == 0 {
            return Err(crate::Error::config(
                "refresh.page_no and refresh.max_result must be positive",
            ));
        }
        if self.otp.max_attempts == 0 {
            return Err(crate::Error::config("otp.max_attempts must be at least 1"));
        }
        if self.otp.timeout_secs == 0 {
            return Err(crate::Error::config("otp.timeout_secs must be positive"));
        }
        if self.relay.mode == RelayMode::Proxy {
            let Some(proxy_url) = &self.relay.proxy_url else {
                return Err(crate::Error::config("relay.proxy_url is required in proxy mode"));
            };
            url::Url::parse(proxy_url)?;
        }
        Ok(())
    }
}
