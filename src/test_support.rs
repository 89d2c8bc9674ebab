//! Test doubles for the pipeline's collaborators.

use crate::audit::{AuditDestination, AuditRecord};
use crate::cache::VerdictCache;
use crate::error::StoreError;
use crate::identity::{BanState, Identity, IdentityError, IdentityStore};
use crate::providers::{ProviderError, ReputationProvider, RiskFlags, Verdict};
use crate::whitelist::{CountryWhitelist, MemoryCountryWhitelist};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn identity(identifier: &str, ban_state: BanState) -> Identity {
    let now = Utc::now();
    Identity {
        identifier: identifier.to_string(),
        ban_state,
        created_at: now,
        updated_at: now,
    }
}

/// Provider returning fixed flags or a fixed error, counting calls.
pub struct StubProvider {
    result: Result<RiskFlags, fn() -> ProviderError>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn flags(flags: RiskFlags) -> Self {
        Self {
            result: Ok(flags),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: fn() -> ProviderError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReputationProvider for StubProvider {
    async fn check(&self, _ip: &str) -> Result<RiskFlags, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.map_err(|error| error())
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Cache whose every operation fails.
pub struct FailingCache;

#[async_trait]
impl VerdictCache for FailingCache {
    async fn get(&self, _ip: &str) -> Result<Option<Verdict>, StoreError> {
        Err(StoreError::Unavailable("cache down".to_string()))
    }

    async fn set(&self, _ip: &str, _verdict: Verdict, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("cache down".to_string()))
    }

    async fn delete(&self, _ip: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("cache down".to_string()))
    }
}

/// In-memory whitelist that counts membership tests.
pub struct CountingWhitelist {
    inner: MemoryCountryWhitelist,
    calls: AtomicUsize,
}

impl CountingWhitelist {
    pub fn new(countries: &[&str]) -> Self {
        Self {
            inner: MemoryCountryWhitelist::with_countries(countries),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CountryWhitelist for CountingWhitelist {
    async fn contains(&self, code: &str) -> Result<bool, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.contains(code).await
    }

    async fn add(&self, codes: &[&str]) -> Result<(), StoreError> {
        self.inner.add(codes).await
    }

    async fn remove(&self, codes: &[&str]) -> Result<(), StoreError> {
        self.inner.remove(codes).await
    }

    async fn members(&self) -> Result<Vec<String>, StoreError> {
        self.inner.members().await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear().await
    }

    async fn len(&self) -> Result<usize, StoreError> {
        self.inner.len().await
    }
}

/// Whitelist whose every operation fails.
pub struct FailingWhitelist;

#[async_trait]
impl CountryWhitelist for FailingWhitelist {
    async fn contains(&self, _code: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("whitelist down".to_string()))
    }

    async fn add(&self, _codes: &[&str]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("whitelist down".to_string()))
    }

    async fn remove(&self, _codes: &[&str]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("whitelist down".to_string()))
    }

    async fn members(&self) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("whitelist down".to_string()))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("whitelist down".to_string()))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("whitelist down".to_string()))
    }
}

/// Destination that keeps what it receives.
pub struct RecordingDestination {
    name: String,
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingDestination {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditDestination for RecordingDestination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Destination whose writes always fail.
pub struct FailingDestination {
    name: String,
}

impl FailingDestination {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl AuditDestination for FailingDestination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, _record: &AuditRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database down".to_string()))
    }
}

/// Identity store with scripted failures around a real in-memory store.
#[derive(Default)]
pub struct ScriptedIdentityStore {
    pub inner: crate::identity::MemoryIdentityStore,
    /// `find_by_identifier` fails.
    pub fail_find: bool,
    /// `create` reports a uniqueness violation after inserting a record, as
    /// if a concurrent request won the race.
    pub lose_creation_race: bool,
    /// `create` reports a uniqueness violation and nothing is stored.
    pub phantom_conflict: bool,
    /// `update_state` fails.
    pub fail_update: bool,
    pub creates: AtomicUsize,
}

#[async_trait]
impl IdentityStore for ScriptedIdentityStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Identity>, StoreError> {
        if self.fail_find {
            return Err(StoreError::Unavailable("identity store down".to_string()));
        }
        self.inner.find_by_identifier(identifier).await
    }

    async fn create(&self, identifier: &str, ban_state: BanState) -> Result<Identity, IdentityError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.lose_creation_race {
            self.inner.create(identifier, ban_state).await?;
            return Err(IdentityError::UniquenessViolation(identifier.to_string()));
        }
        if self.phantom_conflict {
            return Err(IdentityError::UniquenessViolation(identifier.to_string()));
        }
        self.inner.create(identifier, ban_state).await
    }

    async fn update_state(
        &self,
        identity: &Identity,
        ban_state: BanState,
    ) -> Result<Identity, IdentityError> {
        if self.fail_update {
            return Err(IdentityError::Store(StoreError::Unavailable(
                "identity store down".to_string(),
            )));
        }
        self.inner.update_state(identity, ban_state).await
    }
}
