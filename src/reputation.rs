//! Cached, fail-open IP reputation lookups.

use crate::cache::VerdictCache;
use crate::providers::{ProviderError, ReputationProvider, RiskFlags, Verdict};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one reputation lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReputationOutcome {
    pub verdict: Verdict,
    /// Whether the verdict came from the cache.
    pub cached: bool,
    /// Signals from a successful remote call. `None` for cache hits and
    /// fail-open outcomes.
    pub flags: Option<RiskFlags>,
}

impl ReputationOutcome {
    fn skipped() -> Self {
        Self {
            verdict: Verdict::Allowed,
            cached: false,
            flags: None,
        }
    }
}

/// Reputation lookup fronted by a verdict cache.
///
/// Every failure resolves to [`Verdict::Allowed`].
pub struct ReputationService {
    provider: Arc<dyn ReputationProvider>,
    cache: Arc<dyn VerdictCache>,
    ttl: Duration,
}

impl ReputationService {
    pub fn new(
        provider: Arc<dyn ReputationProvider>,
        cache: Arc<dyn VerdictCache>,
        ttl: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            ttl,
        }
    }

    /// Verdict for `ip`.
    pub async fn lookup(&self, ip: &str) -> Verdict {
        self.check(ip).await.verdict
    }

    /// Verdict for `ip`, with where it came from.
    ///
    /// A blank or unparseable address is allowed without touching the cache
    /// or the provider.
    pub async fn check(&self, ip: &str) -> ReputationOutcome {
        let ip = ip.trim();
        if ip.is_empty() {
            return ReputationOutcome::skipped();
        }
        let addr = match ip.parse::<IpAddr>() {
            Ok(addr) => addr.to_string(),
            Err(_) => {
                warn!(ip = %ip, "Not an IP address, skipping reputation lookup");
                return ReputationOutcome::skipped();
            }
        };
        let ip = addr.as_str();

        match self.cache.get(ip).await {
            Ok(Some(verdict)) => {
                debug!(ip = %ip, verdict = %verdict, "Reputation cache hit");
                return ReputationOutcome {
                    verdict,
                    cached: true,
                    flags: None,
                };
            }
            Ok(None) => debug!(ip = %ip, "Reputation cache miss"),
            Err(e) => warn!(ip = %ip, error = %e, "Reputation cache read failed"),
        }

        let (verdict, flags) = match self.provider.check(ip).await {
            Ok(flags) => (flags.verdict(), Some(flags)),
            Err(ProviderError::NotConfigured) => {
                debug!(provider = self.provider.name(), "No API key configured, allowing");
                (Verdict::Allowed, None)
            }
            Err(e) => {
                warn!(
                    provider = self.provider.name(),
                    ip = %ip,
                    error = %e,
                    "Reputation lookup failed, allowing"
                );
                (Verdict::Allowed, None)
            }
        };

        match self.cache.set(ip, verdict, self.ttl).await {
            Ok(()) => info!(
                ip = %ip,
                verdict = %verdict,
                ttl_seconds = self.ttl.as_secs(),
                "Cached reputation verdict"
            ),
            Err(e) => warn!(ip = %ip, error = %e, "Reputation cache write failed"),
        }

        ReputationOutcome {
            verdict,
            cached: false,
            flags,
        }
    }
}
