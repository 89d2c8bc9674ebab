//! IP reputation providers.

pub mod vpnapi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Reputation verdict for a single IP, as stored in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allowed,
    Banned,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allowed => "allowed",
            Verdict::Banned => "banned",
        }
    }

    pub fn is_banned(&self) -> bool {
        matches!(self, Verdict::Banned)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anonymization signals reported for an IP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFlags {
    #[serde(default)]
    pub vpn: bool,
    #[serde(default)]
    pub proxy: bool,
    #[serde(default)]
    pub tor: bool,
    #[serde(default)]
    pub relay: bool,
}

impl RiskFlags {
    /// True if any signal is raised.
    pub fn any(&self) -> bool {
        self.vpn || self.proxy || self.tor || self.relay
    }

    pub fn verdict(&self) -> Verdict {
        if self.any() {
            Verdict::Banned
        } else {
            Verdict::Allowed
        }
    }
}

/// Error from a reputation provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    /// Remote answered with a non-success status.
    #[error("Unexpected status {0}")]
    Status(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No API credential configured.
    #[error("Provider not configured")]
    NotConfigured,
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Http(e)
        }
    }
}

/// Trait for remote IP reputation providers.
#[async_trait]
pub trait ReputationProvider: Send + Sync {
    /// Look up the anonymization signals of an IP address.
    async fn check(&self, ip: &str) -> Result<RiskFlags, ProviderError>;

    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Whether this provider has what it needs to make a call.
    fn is_enabled(&self) -> bool;
}
