//! Device integrity agent: identity resolution, evaluation, and the
//! resulting state transition.

use crate::audit::{AuditEventType, AuditSink, MemoryAuditStore};
use crate::cache::ReputationCache;
use crate::config::Config;
use crate::context::RequestContext;
use crate::error::CheckStatusError;
use crate::evaluator::{Evaluation, RiskEvaluator};
use crate::identity::{BanState, Identity, IdentityError, IdentityStore, MemoryIdentityStore};
use crate::providers::vpnapi::VpnApiProvider;
use crate::providers::ReputationProvider;
use crate::reputation::ReputationService;
use crate::whitelist::{seed_defaults, CountryWhitelist, MemoryCountryWhitelist};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Response of a status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckStatusResponse {
    pub ban_state: BanState,
}

/// Device integrity agent.
pub struct IntegrityAgent {
    identities: Arc<dyn IdentityStore>,
    evaluator: RiskEvaluator,
    audit: Arc<AuditSink>,
}

/// Stores built by [`IntegrityAgent::from_config`], for callers that manage
/// or inspect them.
pub struct AgentStores {
    pub identities: Arc<MemoryIdentityStore>,
    pub whitelist: Arc<MemoryCountryWhitelist>,
    pub cache: Arc<ReputationCache>,
    pub audit_log: Arc<MemoryAuditStore>,
}

impl IntegrityAgent {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        evaluator: RiskEvaluator,
        audit: Arc<AuditSink>,
    ) -> Self {
        Self {
            identities,
            evaluator,
            audit,
        }
    }

    /// Create an agent backed by in-memory stores, with the whitelist seeded
    /// and the audit destinations taken from `config`.
    pub async fn from_config(config: &Config) -> anyhow::Result<(Self, AgentStores)> {
        let stores = AgentStores {
            identities: Arc::new(MemoryIdentityStore::new()),
            whitelist: Arc::new(MemoryCountryWhitelist::new()),
            cache: Arc::new(ReputationCache::new(config.cache.max_entries)),
            audit_log: Arc::new(MemoryAuditStore::new()),
        };

        // A whitelist that cannot be seeded still serves requests
        if let Err(e) = seed_defaults(stores.whitelist.as_ref(), &config.country.default_whitelist).await {
            warn!(error = %e, "Could not initialize country whitelist");
        }

        let provider = VpnApiProvider::new(config.vpnapi.clone())?;
        if provider.is_enabled() {
            info!(provider = provider.name(), "Reputation provider enabled");
        } else {
            warn!(provider = provider.name(), "No API key configured, reputation checks will allow");
        }

        let reputation = Arc::new(ReputationService::new(
            Arc::new(provider),
            stores.cache.clone(),
            config.vpnapi.cache_ttl(),
        ));
        let whitelist: Arc<dyn CountryWhitelist> = stores.whitelist.clone();
        let evaluator = RiskEvaluator::new(whitelist, reputation);
        let audit = Arc::new(AuditSink::from_config(&config.audit, stores.audit_log.clone()));

        info!(
            audit_destinations = ?audit.destination_names(),
            "Device integrity agent initialized"
        );

        Ok((Self::new(stores.identities.clone(), evaluator, audit), stores))
    }

    /// The audit sink, for adding or removing destinations at runtime.
    pub fn audit(&self) -> &Arc<AuditSink> {
        &self.audit
    }

    /// Resolve `identifier` to a ban decision.
    pub async fn check_status(
        &self,
        identifier: &str,
        ctx: &RequestContext,
    ) -> Result<CheckStatusResponse, CheckStatusError> {
        if identifier.trim().is_empty() {
            return Err(CheckStatusError::MissingParameter("idfa"));
        }

        let identity = self.find_or_create(identifier, ctx).await?;
        let evaluation = self.evaluator.evaluate(&identity, ctx).await;
        self.apply_verdict(&identity, &evaluation, ctx).await;

        Ok(CheckStatusResponse {
            ban_state: evaluation.ban_state,
        })
    }

    async fn find_or_create(
        &self,
        identifier: &str,
        ctx: &RequestContext,
    ) -> Result<Identity, CheckStatusError> {
        if let Some(identity) = self.find(identifier).await? {
            return Ok(identity);
        }

        match self.identities.create(identifier, BanState::NotBanned).await {
            Ok(identity) => {
                info!(identifier = %identifier, "Created identity");
                self.audit
                    .record(&identity, AuditEventType::IdentityCreation, json!({}), ctx)
                    .await;
                Ok(identity)
            }
            Err(IdentityError::Validation(messages)) => {
                warn!(identifier = %identifier, errors = ?messages, "Identity failed validation");
                Err(CheckStatusError::Validation(messages))
            }
            Err(IdentityError::UniquenessViolation(_)) => {
                // A concurrent request created it first; continue with its record
                warn!(identifier = %identifier, "Identity created concurrently, re-reading");
                self.find(identifier)
                    .await?
                    .ok_or_else(|| CheckStatusError::Conflict(identifier.to_string()))
            }
            Err(e) => {
                error!(identifier = %identifier, error = %e, "Failed to create identity");
                Err(CheckStatusError::Internal(e.to_string()))
            }
        }
    }

    async fn find(&self, identifier: &str) -> Result<Option<Identity>, CheckStatusError> {
        self.identities
            .find_by_identifier(identifier)
            .await
            .map_err(|e| {
                error!(identifier = %identifier, error = %e, "Identity lookup failed");
                CheckStatusError::Internal(e.to_string())
            })
    }

    /// Persist a new `banned` state and audit it. A failed persist writes no
    /// audit record.
    async fn apply_verdict(&self, identity: &Identity, evaluation: &Evaluation, ctx: &RequestContext) {
        if !evaluation.ban_state.is_banned() || identity.ban_state.is_banned() {
            return;
        }

        let old_ban_state = identity.ban_state;
        let updated = match self.identities.update_state(identity, BanState::Banned).await {
            Ok(updated) => updated,
            Err(e) => {
                error!(identifier = %identity.identifier, error = %e, "Failed to update ban state");
                return;
            }
        };

        info!(
            identifier = %updated.identifier,
            check = ?evaluation.failed_check.map(|c| c.as_str()),
            "Identity banned"
        );

        let mut audit_ctx = ctx.clone();
        if let Some(flags) = evaluation.risk_flags {
            audit_ctx.proxy |= flags.proxy;
            audit_ctx.vpn |= flags.vpn;
        }

        self.audit
            .record(
                &updated,
                AuditEventType::BanStateChange,
                json!({
                    "old_ban_status": old_ban_state,
                    "new_ban_status": updated.ban_state,
                }),
                &audit_ctx,
            )
            .await;
    }
}
