//! Ordered risk checks for a device identity.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. stored ban state
//! 2. country whitelist
//! 3. rooted device flag
//! 4. IP reputation (remote, cached)
//!
//! The order is part of the contract: it decides which lookups are skipped,
//! and in particular whether a remote call is made at all. Failures of the
//! whitelist store or the reputation lookup pass the check.

use crate::context::RequestContext;
use crate::identity::{BanState, Identity};
use crate::providers::RiskFlags;
use crate::reputation::ReputationService;
use crate::whitelist::{normalize_country, CountryWhitelist};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The check that produced a `banned` verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskCheck {
    StoredState,
    Country,
    RootedDevice,
    Reputation,
}

impl RiskCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCheck::StoredState => "stored_state",
            RiskCheck::Country => "country",
            RiskCheck::RootedDevice => "rooted_device",
            RiskCheck::Reputation => "reputation",
        }
    }
}

impl fmt::Display for RiskCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub ban_state: BanState,
    /// Set when a check failed.
    pub failed_check: Option<RiskCheck>,
    /// Signals from a fresh reputation lookup, if one was made.
    pub risk_flags: Option<RiskFlags>,
}

impl Evaluation {
    fn banned(check: RiskCheck) -> Self {
        Self {
            ban_state: BanState::Banned,
            failed_check: Some(check),
            risk_flags: None,
        }
    }

    fn passed(ban_state: BanState, risk_flags: Option<RiskFlags>) -> Self {
        Self {
            ban_state,
            failed_check: None,
            risk_flags,
        }
    }
}

/// Runs the risk checks against an identity.
pub struct RiskEvaluator {
    whitelist: Arc<dyn CountryWhitelist>,
    reputation: Arc<ReputationService>,
}

impl RiskEvaluator {
    pub fn new(whitelist: Arc<dyn CountryWhitelist>, reputation: Arc<ReputationService>) -> Self {
        Self {
            whitelist,
            reputation,
        }
    }

    /// Evaluate `identity` against the request signals.
    ///
    /// Has no side effects besides reading the whitelist and the reputation
    /// service (which may populate its cache).
    pub async fn evaluate(&self, identity: &Identity, ctx: &RequestContext) -> Evaluation {
        debug!(identifier = %identity.identifier, "Running security checks");

        if identity.ban_state.is_banned() {
            debug!(identifier = %identity.identifier, "Identity already banned");
            return Evaluation::banned(RiskCheck::StoredState);
        }

        if !self.country_allowed(ctx.country.as_deref()).await {
            return self.fail(identity, RiskCheck::Country, None);
        }

        if ctx.rooted_device {
            return self.fail(identity, RiskCheck::RootedDevice, None);
        }

        let mut risk_flags = None;
        if let Some(ip) = ctx.ip.as_deref() {
            let outcome = self.reputation.check(ip).await;
            risk_flags = outcome.flags;
            if outcome.verdict.is_banned() {
                return self.fail(identity, RiskCheck::Reputation, outcome.flags);
            }
        }

        Evaluation::passed(identity.ban_state, risk_flags)
    }

    /// A missing or blank signal passes. A whitelist store error passes.
    async fn country_allowed(&self, country: Option<&str>) -> bool {
        let Some(code) = country.and_then(normalize_country) else {
            return true;
        };

        match self.whitelist.contains(&code).await {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(country = %code, error = %e, "Country whitelist lookup failed, allowing");
                true
            }
        }
    }

    fn fail(
        &self,
        identity: &Identity,
        check: RiskCheck,
        risk_flags: Option<RiskFlags>,
    ) -> Evaluation {
        info!(identifier = %identity.identifier, check = %check, "Security check failed");
        Evaluation {
            risk_flags,
            ..Evaluation::banned(check)
        }
    }
}
