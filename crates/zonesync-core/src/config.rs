//! Configuration types for zone synchronisation
//!
//! The configuration is a `config.toml` file in the configuration directory.
//! Section and key names follow the layout operators already use:
//!
//! ```toml
//! [Re2o]
//! hostname = "re2o.example.org"
//! username = "dns-bot"
//! password = "secret"
//! use_TLS = true
//!
//! [Gandi]
//! API_KEY = "default-key"
//!
//! [Gandi.zone."example.org"]
//! API_KEY = "zone-specific-key"
//! ttl = 300
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the configuration file inside the configuration directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source of truth
    #[serde(rename = "Re2o")]
    pub re2o: Re2oConfig,

    /// Hosted zones
    #[serde(rename = "Gandi")]
    pub gandi: GandiConfig,

    /// Ledger storage
    #[serde(default)]
    pub state: StateConfig,

    /// HTTP client behaviour shared by both adapters
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self, crate::Error> {
        toml::from_str(raw)
            .map_err(|e| crate::Error::config(format!("Invalid {}: {}", CONFIG_FILE_NAME, e)))
    }

    /// Load `config.toml` from a configuration directory
    pub fn load_from_dir(config_dir: &Path) -> Result<Self, crate::Error> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            crate::Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.re2o.validate()?;
        self.gandi.validate()?;
        self.http.validate()?;
        Ok(())
    }

    /// Settings of a configured zone
    pub fn zone(&self, name: &str) -> Option<&ZoneConfig> {
        self.gandi.zone.get(name)
    }

    /// Directory holding the ledgers, relative paths resolved against `config_dir`
    pub fn state_directory(&self, config_dir: &Path) -> PathBuf {
        match &self.state.directory {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => config_dir.join(dir),
            None => config_dir.to_path_buf(),
        }
    }
}

/// Re2o API configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct Re2oConfig {
    /// Host name of the Re2o instance (no scheme)
    pub hostname: String,

    /// API user
    pub username: String,

    /// API password
    pub password: String,

    /// Whether to use HTTPS
    #[serde(rename = "use_TLS", default = "default_use_tls")]
    pub use_tls: bool,

    /// Service whose regeneration flag is cleared after a successful run
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Re2oConfig {
    /// Validate the Re2o section
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.hostname.trim().is_empty() {
            return Err(crate::Error::config("Re2o hostname cannot be empty"));
        }
        if self.hostname.contains("://") {
            return Err(crate::Error::config(
                "Re2o hostname must not include a scheme; use use_TLS instead",
            ));
        }
        if self.username.is_empty() || self.password.is_empty() {
            return Err(crate::Error::config("Re2o username and password are required"));
        }
        Ok(())
    }

    /// Base URL of the Re2o REST API
    pub fn api_base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}/api", scheme, self.hostname.trim_end_matches('/'))
    }
}

impl std::fmt::Debug for Re2oConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Re2oConfig")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("use_tls", &self.use_tls)
            .field("service_name", &self.service_name)
            .finish()
    }
}

fn default_use_tls() -> bool {
    true
}

fn default_service_name() -> String {
    "dns".to_string()
}

/// Gandi LiveDNS configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct GandiConfig {
    /// API key used for zones without their own
    #[serde(rename = "API_KEY", default)]
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_gandi_api_url")]
    pub api_url: String,

    /// Per-zone settings, keyed by zone name without leading dot
    #[serde(default)]
    pub zone: BTreeMap<String, ZoneConfig>,
}

impl GandiConfig {
    /// Validate the Gandi section
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.zone.is_empty() {
            return Err(crate::Error::config("No zones configured under [Gandi.zone]"));
        }
        if !self.api_url.starts_with("https://") && !self.api_url.starts_with("http://") {
            return Err(crate::Error::config(format!(
                "Gandi api_url must use HTTP or HTTPS scheme. Got: {}",
                self.api_url
            )));
        }
        for (name, zone) in &self.zone {
            if name.starts_with('.') || name.is_empty() {
                return Err(crate::Error::config(format!(
                    "Zone name '{}' must be given without a leading dot",
                    name
                )));
            }
            if self.api_key_for(name).is_none() {
                return Err(crate::Error::config(format!(
                    "No API key for zone {}: set Gandi.API_KEY or Gandi.zone.\"{}\".API_KEY",
                    name, name
                )));
            }
            if zone.ttl == Some(0) {
                return Err(crate::Error::config(format!("Zone {} has a zero ttl", name)));
            }
        }
        Ok(())
    }

    /// API key for `zone`, falling back to the default key
    pub fn api_key_for(&self, zone: &str) -> Option<&str> {
        self.zone
            .get(zone)
            .and_then(|z| z.api_key.as_deref())
            .or(self.api_key.as_deref())
            .filter(|key| !key.is_empty())
    }
}

impl std::fmt::Debug for GandiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GandiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .field("api_url", &self.api_url)
            .field("zone", &self.zone)
            .finish()
    }
}

fn default_gandi_api_url() -> String {
    "https://api.gandi.net/v5".to_string()
}

/// Per-zone settings
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// API key overriding the default key
    #[serde(rename = "API_KEY", default)]
    pub api_key: Option<String>,

    /// TTL given to records of this zone; provider default when unset
    #[serde(default)]
    pub ttl: Option<u32>,
}

impl std::fmt::Debug for ZoneConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Ledger storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// Directory for ledger files; the configuration directory when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout of a single request (in seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries of idempotent reads; mutating requests are never retried
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between read retries (in seconds)
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl HttpConfig {
    /// Validate numeric ranges
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !(1..=300).contains(&self.timeout_secs) {
            return Err(crate::Error::config(format!(
                "http.timeout_secs must be between 1 and 300. Got: {}",
                self.timeout_secs
            )));
        }
        if self.max_retries > 10 {
            return Err(crate::Error::config(format!(
                "http.max_retries must be between 0 and 10. Got: {}",
                self.max_retries
            )));
        }
        Ok(())
    }

    /// Request timeout
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }

    /// Delay between read retries
    pub fn retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_secs() -> u64 {
    2
}
