//! Append-only audit trail of identity lifecycle events.
//!
//! Every record is fanned out to each configured destination in order. A
//! destination failure is logged and never reaches the caller, and never
//! stops the remaining destinations from being tried.

use crate::config::{AuditConfig, AuditDestinationKind};
use crate::context::{detect_country_from_ip, RequestContext};
use crate::error::StoreError;
use crate::identity::{BanState, Identity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Placeholder for signals that could not be resolved.
pub const UNKNOWN: &str = "Unknown";

/// Name of the persistent destination whose record `record` returns.
pub const DATABASE: &str = "database";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    IdentityCreation,
    BanStateChange,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::IdentityCreation => "identity_creation",
            AuditEventType::BanStateChange => "ban_state_change",
        }
    }
}

/// Event metadata attached to every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalInfo {
    pub event_type: AuditEventType,
    pub event_data: Value,
    pub logged_at: DateTime<Utc>,
}

/// One immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub identifier: String,
    pub ban_state: BanState,
    pub ip: String,
    pub rooted_device: bool,
    pub country: String,
    pub proxy: bool,
    pub vpn: bool,
    #[serde(default)]
    pub additional_info: Option<AdditionalInfo>,
}

impl AuditRecord {
    /// Build a record from the identity's current state and the request
    /// signals, filling unresolved fields with their defaults.
    pub fn build(
        identity: &Identity,
        event_type: AuditEventType,
        event_data: Value,
        ctx: &RequestContext,
    ) -> Self {
        let ip = ctx
            .ip
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string);
        let country = ctx
            .country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_uppercase)
            .or_else(|| detect_country_from_ip(ip.as_deref()));

        Self {
            identifier: identity.identifier.clone(),
            ban_state: identity.ban_state,
            ip: ip.unwrap_or_else(|| UNKNOWN.to_string()),
            rooted_device: ctx.rooted_device,
            country: country.unwrap_or_else(|| UNKNOWN.to_string()),
            proxy: ctx.proxy,
            vpn: ctx.vpn,
            additional_info: Some(AdditionalInfo {
                event_type,
                event_data,
                logged_at: Utc::now(),
            }),
        }
    }

    pub fn event_type(&self) -> Option<AuditEventType> {
        self.additional_info.as_ref().map(|info| info.event_type)
    }
}

/// A place audit records are written to.
#[async_trait]
pub trait AuditDestination: Send + Sync {
    /// Unique destination name, used for add/remove and logging.
    fn name(&self) -> &str;

    async fn write(&self, record: &AuditRecord) -> Result<(), StoreError>;
}

/// In-memory append-only audit store (the `database` destination).
#[derive(Default)]
pub struct MemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    /// Records for one identifier, oldest first.
    pub fn for_identifier(&self, identifier: &str) -> Vec<AuditRecord> {
        self.records
            .read()
            .map(|r| {
                r.iter()
                    .filter(|record| record.identifier == identifier)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditDestination for MemoryAuditStore {
    fn name(&self) -> &str {
        DATABASE
    }

    async fn write(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .push(record.clone());
        Ok(())
    }
}

/// Emits each record as a structured `tracing` event.
pub struct LogAuditDestination;

#[async_trait]
impl AuditDestination for LogAuditDestination {
    fn name(&self) -> &str {
        "log"
    }

    async fn write(&self, record: &AuditRecord) -> Result<(), StoreError> {
        let event_type = record.event_type().map(|e| e.as_str()).unwrap_or("unknown");
        info!(
            target: "integrity_audit",
            identifier = %record.identifier,
            ban_state = %record.ban_state,
            ip = %record.ip,
            country = %record.country,
            rooted_device = record.rooted_device,
            proxy = record.proxy,
            vpn = record.vpn,
            event_type,
            "Audit event"
        );
        Ok(())
    }
}

/// Appends each record as one JSON line to a file.
pub struct FileAuditDestination {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAuditDestination {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditDestination for FileAuditDestination {
    fn name(&self) -> &str {
        "file"
    }

    async fn write(&self, record: &AuditRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Fans audit records out to an ordered, runtime-mutable set of destinations.
pub struct AuditSink {
    destinations: RwLock<Vec<Arc<dyn AuditDestination>>>,
}

impl AuditSink {
    pub fn new(destinations: Vec<Arc<dyn AuditDestination>>) -> Self {
        Self {
            destinations: RwLock::new(destinations),
        }
    }

    /// Build the configured destinations. `database` is the store the caller
    /// queries afterwards.
    pub fn from_config(config: &AuditConfig, database: Arc<MemoryAuditStore>) -> Self {
        let mut destinations: Vec<Arc<dyn AuditDestination>> = Vec::new();
        for kind in &config.destinations {
            let destination: Arc<dyn AuditDestination> = match kind {
                AuditDestinationKind::Database => database.clone(),
                AuditDestinationKind::Log => Arc::new(LogAuditDestination),
                AuditDestinationKind::File => match &config.file_path {
                    Some(path) => Arc::new(FileAuditDestination::new(path.clone())),
                    None => {
                        warn!("File audit destination configured without file_path, skipping");
                        continue;
                    }
                },
            };
            if destinations.iter().any(|d| d.name() == destination.name()) {
                continue;
            }
            destinations.push(destination);
        }
        Self::new(destinations)
    }

    /// Add a destination at the end. Returns false if one with the same name
    /// is already present.
    pub fn add_destination(&self, destination: Arc<dyn AuditDestination>) -> bool {
        let Ok(mut destinations) = self.destinations.write() else {
            return false;
        };
        if destinations.iter().any(|d| d.name() == destination.name()) {
            return false;
        }
        destinations.push(destination);
        true
    }

    /// Remove a destination by name. Returns whether one was removed.
    pub fn remove_destination(&self, name: &str) -> bool {
        let Ok(mut destinations) = self.destinations.write() else {
            return false;
        };
        let before = destinations.len();
        destinations.retain(|d| d.name() != name);
        destinations.len() != before
    }

    pub fn destination_names(&self) -> Vec<String> {
        self.destinations
            .read()
            .map(|d| d.iter().map(|dest| dest.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Write one event to every destination.
    ///
    /// Returns the record when the `database` destination is configured and
    /// accepted it.
    pub async fn record(
        &self,
        identity: &Identity,
        event_type: AuditEventType,
        event_data: Value,
        ctx: &RequestContext,
    ) -> Option<AuditRecord> {
        let record = AuditRecord::build(identity, event_type, event_data, ctx);

        // Snapshot so no lock is held across the writes
        let destinations = match self.destinations.read() {
            Ok(d) => d.clone(),
            Err(_) => {
                error!(event_type = event_type.as_str(), "Audit destinations unavailable");
                return None;
            }
        };

        if destinations.is_empty() {
            debug!(event_type = event_type.as_str(), "No audit destinations configured");
            return None;
        }

        let mut persisted = None;
        for destination in destinations {
            match destination.write(&record).await {
                Ok(()) => {
                    if destination.name() == DATABASE {
                        persisted = Some(record.clone());
                    }
                }
                Err(e) => {
                    error!(
                        destination = destination.name(),
                        identifier = %record.identifier,
                        event_type = event_type.as_str(),
                        error = %e,
                        "Failed to write audit record"
                    );
                }
            }
        }

        persisted
    }
}
