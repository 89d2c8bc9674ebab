//! Country whitelist.
//!
//! Membership is keyed by uppercased ISO country code.

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;
use tracing::info;

/// Countries seeded into an empty whitelist at startup.
pub const DEFAULT_COUNTRIES: &[&str] = &[
    "US", "CA", "GB", "DE", "FR", "AU", "NL", "SE", "NO", "DK", "FI", "CH", "AT", "BE", "IE",
    "NZ", "SG", "JP", "KR",
];

/// Trim and uppercase a country code. Blank input yields `None`.
pub fn normalize_country(code: &str) -> Option<String> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Set of country codes treated as low risk.
#[async_trait]
pub trait CountryWhitelist: Send + Sync {
    /// Membership test. Implementations normalize the code before lookup.
    async fn contains(&self, code: &str) -> Result<bool, StoreError>;

    async fn add(&self, codes: &[&str]) -> Result<(), StoreError>;

    async fn remove(&self, codes: &[&str]) -> Result<(), StoreError>;

    /// All members, sorted.
    async fn members(&self) -> Result<Vec<String>, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;
}

/// Populate `whitelist` with `defaults` if it is empty.
///
/// Returns the number of codes added (zero when the whitelist was already
/// populated).
pub async fn seed_defaults(
    whitelist: &dyn CountryWhitelist,
    defaults: &[String],
) -> Result<usize, StoreError> {
    let existing = whitelist.len().await?;
    if existing > 0 {
        info!(countries = existing, "Country whitelist already initialized");
        return Ok(0);
    }

    let codes: Vec<&str> = defaults.iter().map(String::as_str).collect();
    whitelist.add(&codes).await?;

    let seeded = whitelist.len().await?;
    info!(countries = seeded, "Initialized country whitelist with defaults");
    Ok(seeded)
}

/// In-memory country whitelist.
#[derive(Default)]
pub struct MemoryCountryWhitelist {
    countries: RwLock<HashSet<String>>,
}

impl MemoryCountryWhitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a whitelist pre-populated with `codes`.
    pub fn with_countries(codes: &[&str]) -> Self {
        Self {
            countries: RwLock::new(codes.iter().filter_map(|c| normalize_country(c)).collect()),
        }
    }
}

#[async_trait]
impl CountryWhitelist for MemoryCountryWhitelist {
    async fn contains(&self, code: &str) -> Result<bool, StoreError> {
        let Some(code) = normalize_country(code) else {
            return Ok(false);
        };
        let countries = self.countries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(countries.contains(&code))
    }

    async fn add(&self, codes: &[&str]) -> Result<(), StoreError> {
        let mut countries = self.countries.write().map_err(|_| StoreError::Poisoned)?;
        countries.extend(codes.iter().filter_map(|c| normalize_country(c)));
        Ok(())
    }

    async fn remove(&self, codes: &[&str]) -> Result<(), StoreError> {
        let mut countries = self.countries.write().map_err(|_| StoreError::Poisoned)?;
        for code in codes.iter().filter_map(|c| normalize_country(c)) {
            countries.remove(&code);
        }
        Ok(())
    }

    async fn members(&self) -> Result<Vec<String>, StoreError> {
        let countries = self.countries.read().map_err(|_| StoreError::Poisoned)?;
        let mut members: Vec<String> = countries.iter().cloned().collect();
        members.sort();
        Ok(members)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.countries.write().map_err(|_| StoreError::Poisoned)?.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.countries.read().map_err(|_| StoreError::Poisoned)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_country() {
        assert_eq!(normalize_country("us"), Some("US".to_string()));
        assert_eq!(normalize_country(" gb "), Some("GB".to_string()));
        assert_eq!(normalize_country(""), None);
        assert_eq!(normalize_country("   "), None);
    }

    #[tokio::test]
    async fn test_contains_is_case_insensitive() {
        let whitelist = MemoryCountryWhitelist::with_countries(&["US"]);
        assert!(whitelist.contains("US").await.unwrap());
        assert!(whitelist.contains("us").await.unwrap());
        assert!(whitelist.contains("Us").await.unwrap());
        assert!(!whitelist.contains("CN").await.unwrap());
        assert!(!whitelist.contains("").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let whitelist = MemoryCountryWhitelist::new();
        whitelist.add(&["us", "ca", "gb"]).await.unwrap();
        assert_eq!(whitelist.len().await.unwrap(), 3);

        whitelist.remove(&["Ca"]).await.unwrap();
        assert_eq!(whitelist.members().await.unwrap(), vec!["GB", "US"]);

        whitelist.clear().await.unwrap();
        assert_eq!(whitelist.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seed_defaults_when_empty() {
        let whitelist = MemoryCountryWhitelist::new();
        let defaults: Vec<String> = DEFAULT_COUNTRIES.iter().map(|c| c.to_string()).collect();

        let seeded = seed_defaults(&whitelist, &defaults).await.unwrap();
        assert_eq!(seeded, DEFAULT_COUNTRIES.len());
        assert!(whitelist.contains("jp").await.unwrap());
    }

    #[tokio::test]
    async fn test_seed_defaults_keeps_existing() {
        let whitelist = MemoryCountryWhitelist::with_countries(&["US"]);
        let defaults: Vec<String> = DEFAULT_COUNTRIES.iter().map(|c| c.to_string()).collect();

        let seeded = seed_defaults(&whitelist, &defaults).await.unwrap();
        assert_eq!(seeded, 0);
        assert_eq!(whitelist.members().await.unwrap(), vec!["US"]);
    }
}
