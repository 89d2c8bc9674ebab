//! Configuration types for the device integrity agent.

use crate::cache::DEFAULT_VERDICT_TTL;
use crate::whitelist::DEFAULT_COUNTRIES;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// IP extraction configuration.
    #[serde(default)]
    pub ip_extraction: IpExtractionConfig,

    /// Country signal and whitelist seed.
    #[serde(default)]
    pub country: CountryConfig,

    /// vpnapi.io reputation lookups.
    #[serde(default)]
    pub vpnapi: VpnApiConfig,

    /// Reputation verdict cache.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Audit trail destinations.
    #[serde(default)]
    pub audit: AuditConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

/// IP extraction configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IpExtractionConfig {
    /// Headers to check for client IP, in order of preference.
    #[serde(default = "default_ip_headers")]
    pub headers: Vec<String>,

    /// Use first IP from X-Forwarded-For (true) or last IP (false).
    #[serde(default = "default_true")]
    pub use_first_ip: bool,
}

impl Default for IpExtractionConfig {
    fn default() -> Self {
        Self {
            headers: default_ip_headers(),
            use_first_ip: true,
        }
    }
}

fn default_ip_headers() -> Vec<String> {
    vec!["x-forwarded-for".to_string(), "x-real-ip".to_string()]
}

/// Country signal configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CountryConfig {
    /// Trusted header carrying the client's country code.
    #[serde(default = "default_country_header")]
    pub header: String,

    /// Countries seeded into an empty whitelist at startup.
    #[serde(default = "default_whitelist")]
    pub default_whitelist: Vec<String>,
}

impl Default for CountryConfig {
    fn default() -> Self {
        Self {
            header: default_country_header(),
            default_whitelist: default_whitelist(),
        }
    }
}

fn default_country_header() -> String {
    "cf-ipcountry".to_string()
}

fn default_whitelist() -> Vec<String> {
    DEFAULT_COUNTRIES.iter().map(|c| c.to_string()).collect()
}

/// vpnapi.io provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VpnApiConfig {
    /// API key (supports ${ENV_VAR} syntax). Blank means lookups are skipped.
    /// Defaults to the `VPNAPI_KEY` environment variable.
    #[serde(default = "default_api_key")]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// How long verdicts are cached.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for VpnApiConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
            base_url: default_base_url(),
            timeout_ms: default_timeout(),
            cache_ttl_seconds: default_cache_ttl(),
            user_agent: default_user_agent(),
        }
    }
}

/// Environment variable read when no API key is configured.
pub const VPNAPI_KEY_ENV: &str = "VPNAPI_KEY";

fn default_api_key() -> Option<String> {
    std::env::var(VPNAPI_KEY_ENV).ok()
}

impl VpnApiConfig {
    /// The API key, if one is set and not blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

fn default_base_url() -> String {
    "https://vpnapi.io".to_string()
}

fn default_timeout() -> u64 {
    5000
}

fn default_cache_ttl() -> u64 {
    DEFAULT_VERDICT_TTL.as_secs()
}

fn default_user_agent() -> String {
    format!("device-integrity/{}", env!("CARGO_PKG_VERSION"))
}

/// Verdict cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

fn default_max_entries() -> usize {
    100_000
}

/// Audit trail configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Destinations, written in order.
    #[serde(default = "default_destinations")]
    pub destinations: Vec<AuditDestinationKind>,

    /// JSON lines file for the `file` destination.
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            destinations: default_destinations(),
            file_path: None,
        }
    }
}

fn default_destinations() -> Vec<AuditDestinationKind> {
    vec![AuditDestinationKind::Database]
}

/// Audit destination kinds.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditDestinationKind {
    /// Persistent audit store.
    Database,
    /// Structured tracing events.
    Log,
    /// JSON lines file.
    File,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.listen.parse::<SocketAddr>().is_err() {
            anyhow::bail!("Invalid server.listen address: {}", self.server.listen);
        }

        if self.country.header.trim().is_empty() {
            anyhow::bail!("country.header must not be empty");
        }

        for code in &self.country.default_whitelist {
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                anyhow::bail!("Invalid country code in default_whitelist: {}", code);
            }
        }

        if self.vpnapi.timeout_ms == 0 {
            anyhow::bail!("vpnapi.timeout_ms must be greater than 0");
        }

        if self.vpnapi.cache_ttl_seconds == 0 {
            anyhow::bail!("vpnapi.cache_ttl_seconds must be greater than 0");
        }

        if !self.vpnapi.base_url.starts_with("http://")
            && !self.vpnapi.base_url.starts_with("https://")
        {
            anyhow::bail!("vpnapi.base_url must be an http(s) URL: {}", self.vpnapi.base_url);
        }

        if self.cache.max_entries == 0 {
            anyhow::bail!("cache.max_entries must be greater than 0");
        }

        if self.audit.destinations.contains(&AuditDestinationKind::File)
            && self.audit.file_path.is_none()
        {
            anyhow::bail!("audit.file_path is required for the file destination");
        }

        Ok(())
    }

    /// Generate example configuration YAML.
    pub fn example() -> String {
        r#"# Device Integrity Agent Configuration

server:
  listen: "0.0.0.0:3000"

# Client IP extraction from request headers
ip_extraction:
  headers:
    - "x-forwarded-for"
    - "x-real-ip"
  use_first_ip: true           # Use first IP from X-Forwarded-For

# Country signal (set by the CDN) and whitelist seed
country:
  header: "cf-ipcountry"
  default_whitelist: [US, CA, GB, DE, FR, AU, NL, SE, NO, DK, FI, CH, AT, BE, IE, NZ, SG, JP, KR]

# VPN / proxy / Tor / relay detection
vpnapi:
  api_key: "${VPNAPI_KEY}"     # Lookups are skipped when empty
  base_url: "https://vpnapi.io"
  timeout_ms: 5000
  cache_ttl_seconds: 86400     # Cache verdicts for 24 hours

cache:
  max_entries: 100000

# Audit trail destinations, written in order
audit:
  destinations:
    - database
    - log
  # file_path: "/var/log/device-integrity/audit.jsonl"
"#
        .to_string()
    }
}

/// Expand environment variables in the format ${VAR_NAME}.
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        let var_value = std::env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
