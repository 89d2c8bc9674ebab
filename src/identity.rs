//! Device identities and the store that owns them.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, RwLock};
use thiserror::Error;

/// Persisted risk classification of a device.
///
/// Serialized by name so new states can be added without touching stored
/// values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum BanState {
    #[default]
    NotBanned,
    Banned,
}

impl BanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BanState::NotBanned => "not_banned",
            BanState::Banned => "banned",
        }
    }

    pub fn is_banned(&self) -> bool {
        matches!(self, BanState::Banned)
    }
}

impl fmt::Display for BanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One device, keyed by its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique, immutable device identifier (UUID shaped).
    pub identifier: String,
    pub ban_state: BanState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    fn new(identifier: &str, ban_state: BanState) -> Self {
        let now = Utc::now();
        Self {
            identifier: identifier.to_string(),
            ban_state,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Error from an identity store write.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The record failed one or more validations.
    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// Another record already holds this identifier.
    #[error("identifier {0} has already been taken")]
    UniquenessViolation(String),

    /// Update of a record the store does not know.
    #[error("identity {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn uuid_format() -> &'static Regex {
    static UUID_FORMAT: OnceLock<Regex> = OnceLock::new();
    UUID_FORMAT.get_or_init(|| {
        Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
            .expect("identifier pattern compiles")
    })
}

/// Validate an identifier, returning every failed rule.
pub fn validate_identifier(identifier: &str) -> Result<(), Vec<String>> {
    if identifier.trim().is_empty() {
        return Err(vec!["Identifier can't be blank".to_string()]);
    }
    if !uuid_format().is_match(identifier) {
        return Err(vec!["Identifier must be a valid UUID format".to_string()]);
    }
    Ok(())
}

/// Storage for device identities.
///
/// `create` must be an atomic insert that fails with
/// [`IdentityError::UniquenessViolation`] when the identifier already exists.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Identity>, StoreError>;

    async fn create(&self, identifier: &str, ban_state: BanState) -> Result<Identity, IdentityError>;

    /// Persist a new ban state, returning the updated record.
    async fn update_state(
        &self,
        identity: &Identity,
        ban_state: BanState,
    ) -> Result<Identity, IdentityError>;
}

/// In-memory identity store.
#[derive(Default)]
pub struct MemoryIdentityStore {
    identities: RwLock<HashMap<String, Identity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities.
    pub fn len(&self) -> usize {
        self.identities.read().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Identity>, StoreError> {
        let identities = self.identities.read().map_err(|_| StoreError::Poisoned)?;
        Ok(identities.get(identifier).cloned())
    }

    async fn create(&self, identifier: &str, ban_state: BanState) -> Result<Identity, IdentityError> {
        validate_identifier(identifier).map_err(IdentityError::Validation)?;

        let mut identities = self.identities.write().map_err(|_| StoreError::Poisoned)?;
        if identities.contains_key(identifier) {
            return Err(IdentityError::UniquenessViolation(identifier.to_string()));
        }

        let identity = Identity::new(identifier, ban_state);
        identities.insert(identifier.to_string(), identity.clone());
        Ok(identity)
    }

    async fn update_state(
        &self,
        identity: &Identity,
        ban_state: BanState,
    ) -> Result<Identity, IdentityError> {
        let mut identities = self.identities.write().map_err(|_| StoreError::Poisoned)?;
        let stored = identities
            .get_mut(&identity.identifier)
            .ok_or_else(|| IdentityError::NotFound(identity.identifier.clone()))?;

        stored.ban_state = ban_state;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }
}
