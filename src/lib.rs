//! Device integrity agent.
//!
//! Resolves a device identifier to a ban decision by running a fixed chain
//! of risk checks, persisting the outcome, and auditing every lifecycle
//! event.
//!
//! # Checks
//!
//! In order, stopping at the first failure:
//!
//! - **Stored state** - an identity that is already banned stays banned
//! - **Country whitelist** - the trusted country header must be whitelisted
//! - **Rooted device** - rooted devices are banned
//! - **IP reputation** - VPN, proxy, Tor and relay IPs are banned, via a
//!   cached vpnapi.io lookup
//!
//! Every external failure (whitelist store, cache, remote lookup, audit
//! destination) fails open.
//!
//! # Example Configuration
//!
//! ```yaml
//! country:
//!   header: "cf-ipcountry"
//!
//! vpnapi:
//!   api_key: "${VPNAPI_KEY}"
//!   timeout_ms: 5000
//!   cache_ttl_seconds: 86400
//!
//! audit:
//!   destinations: [database, log]
//! ```

pub mod agent;
pub mod api;
pub mod audit;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod identity;
pub mod providers;
pub mod reputation;
pub mod whitelist;

#[cfg(test)]
mod test_support;

pub use agent::{CheckStatusResponse, IntegrityAgent};
pub use config::Config;
pub use context::RequestContext;
pub use error::CheckStatusError;
pub use identity::BanState;
