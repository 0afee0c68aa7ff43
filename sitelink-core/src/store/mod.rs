//! State storage for the connection core
//!
//! The core keeps three kinds of state, each behind its own capability trait:
//! - the bearer credential issued by the collector ([`CredentialStore`])
//! - short-lived values with an expiry, such as the handshake verification
//!   token and the reconnect throttle lock ([`EphemeralStore`])
//! - the persisted count of connection attempts ([`AttemptStore`])
//!
//! Two backends implement all three: [`MemoryStore`] for tests and embedding,
//! and [`SqliteStore`] for state that must survive process restarts.
//!
//! Reads and writes are atomic per key. Concurrent processes sharing one
//! backend may interleave increments; the core tolerates that.

mod memory;
mod schema;
mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

pub use memory::MemoryStore;
pub use schema::{get_schema_version, run_migrations, SCHEMA_VERSION};
pub use sqlite::SqliteStore;

/// Holds the opaque bearer token issued by the collector.
pub trait CredentialStore: Send + Sync {
    /// Current token, if any
    fn get(&self) -> Result<Option<String>>;
    /// Replace the token
    fn set(&self, token: &str) -> Result<()>;
    /// Forget the token
    fn delete(&self) -> Result<()>;
}

/// Key-value storage whose entries expire.
///
/// Expired entries read as absent.
pub trait EphemeralStore: Send + Sync {
    /// Value for `key` if present and unexpired
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Store `value` under `key` for `ttl`
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    /// Remove `key`
    fn delete(&self, key: &str) -> Result<()>;
}

/// Persisted counter of connection attempts.
pub trait AttemptStore: Send + Sync {
    /// Current count (0 when never recorded)
    fn attempts(&self) -> Result<u32>;
    /// Increment, persist, and return the new count
    fn record_attempt(&self) -> Result<u32>;
}

/// The three stores the connection core needs, usually one shared backend.
#[derive(Clone)]
pub struct StateStores {
    pub credentials: Arc<dyn CredentialStore>,
    pub transients: Arc<dyn EphemeralStore>,
    pub attempts: Arc<dyn AttemptStore>,
}

impl StateStores {
    /// Use one backend for all three kinds of state.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: CredentialStore + EphemeralStore + AttemptStore + 'static,
    {
        Self {
            credentials: store.clone(),
            transients: store.clone(),
            attempts: store,
        }
    }
}

/// Absolute expiry for an entry written now with `ttl`.
pub(crate) fn expiry_from_now(ttl: Duration) -> Result<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| Error::Store(format!("ttl out of range: {}", e)))?;

    Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| Error::Store("ttl out of range".to_string()))
}
