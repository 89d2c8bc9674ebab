//! TTL-based cache for IP reputation verdicts.

use crate::error::StoreError;
use crate::providers::Verdict;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// How long a verdict stays cached unless configured otherwise.
pub const DEFAULT_VERDICT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Key-value store of reputation verdicts by IP.
///
/// Callers treat every error as a miss (reads) or drop it (writes).
#[async_trait]
pub trait VerdictCache: Send + Sync {
    async fn get(&self, ip: &str) -> Result<Option<Verdict>, StoreError>;

    async fn set(&self, ip: &str, verdict: Verdict, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, ip: &str) -> Result<(), StoreError>;
}

/// Cached verdict.
#[derive(Debug, Clone)]
pub struct CachedVerdict {
    pub verdict: Verdict,
    /// When this entry was cached.
    pub cached_at: Instant,
    /// TTL for this entry.
    pub ttl: Duration,
}

impl CachedVerdict {
    /// Check if this cache entry has expired.
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Thread-safe in-memory verdict cache with a capacity bound.
pub struct ReputationCache {
    cache: RwLock<HashMap<String, CachedVerdict>>,
    max_entries: usize,
}

impl ReputationCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    /// Remove expired entries from the cache.
    pub fn cleanup(&self) {
        if let Ok(mut cache) = self.cache.write() {
            evict_expired_entries(&mut cache);
        }
    }

    /// Get the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}

fn evict_expired_entries(cache: &mut HashMap<String, CachedVerdict>) {
    cache.retain(|_, v| !v.is_expired());
}

#[async_trait]
impl VerdictCache for ReputationCache {
    async fn get(&self, ip: &str) -> Result<Option<Verdict>, StoreError> {
        let cache = self.cache.read().map_err(|_| StoreError::Poisoned)?;
        // Expired entries are left for cleanup to avoid taking the write lock here
        Ok(cache
            .get(ip)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.verdict))
    }

    async fn set(&self, ip: &str, verdict: Verdict, ttl: Duration) -> Result<(), StoreError> {
        let entry = CachedVerdict {
            verdict,
            cached_at: Instant::now(),
            ttl,
        };

        let mut cache = self.cache.write().map_err(|_| StoreError::Poisoned)?;
        if cache.len() >= self.max_entries && !cache.contains_key(ip) {
            evict_expired_entries(&mut cache);

            // Still full: drop the oldest entry
            if cache.len() >= self.max_entries {
                if let Some(oldest_ip) = cache
                    .iter()
                    .min_by_key(|(_, v)| v.cached_at)
                    .map(|(k, _)| k.clone())
                {
                    cache.remove(&oldest_ip);
                }
            }
        }

        cache.insert(ip.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, ip: &str) -> Result<(), StoreError> {
        self.cache.write().map_err(|_| StoreError::Poisoned)?.remove(ip);
        Ok(())
    }
}
