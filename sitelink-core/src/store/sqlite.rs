//! SQLite-backed store
//!
//! Credential and attempt counter live in `options`; verification tokens and
//! the throttle lock live in `transients` with an absolute expiry.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{expiry_from_now, AttemptStore, CredentialStore, EphemeralStore};
use crate::error::{Error, Result};

const CREDENTIAL_OPTION: &str = "credential";
const ATTEMPTS_OPTION: &str = "connection_attempts";

/// Store handle (single connection)
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path and bring its schema up to date
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Several processes may share the file; WAL keeps readers from blocking.
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        super::schema::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        super::schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Expiry of an unexpired transient.
    pub fn expires_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.connection()?;
        let millis: Option<i64> = conn
            .query_row(
                "SELECT expires_at FROM transients WHERE name = ?1 AND expires_at > ?2",
                params![key, Utc::now().timestamp_millis()],
                |r| r.get(0),
            )
            .optional()?;

        Ok(millis.and_then(|m| Utc.timestamp_millis_opt(m).single()))
    }

    /// Drop every expired transient, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let conn = self.connection()?;
        let removed = conn.execute(
            "DELETE FROM transients WHERE expires_at <= ?1",
            params![Utc::now().timestamp_millis()],
        )?;
        Ok(removed)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Store("state store lock poisoned".to_string()))
    }

    fn get_option(&self, name: &str) -> Result<Option<String>> {
        let conn = self.connection()?;
        let value = conn
            .query_row(
                "SELECT value FROM options WHERE name = ?1",
                params![name],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_option(&self, name: &str, value: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO options (name, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![name, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete_option(&self, name: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM options WHERE name = ?1", params![name])?;
        Ok(())
    }
}

impl CredentialStore for SqliteStore {
    fn get(&self) -> Result<Option<String>> {
        self.get_option(CREDENTIAL_OPTION)
    }

    fn set(&self, token: &str) -> Result<()> {
        self.set_option(CREDENTIAL_OPTION, token)
    }

    fn delete(&self) -> Result<()> {
        self.delete_option(CREDENTIAL_OPTION)
    }
}

impl EphemeralStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connection()?;
        let now = Utc::now().timestamp_millis();

        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, expires_at FROM transients WHERE name = ?1",
                params![key],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        match row {
            Some((value, expires_at)) if expires_at > now => Ok(Some(value)),
            Some(_) => {
                conn.execute(
                    "DELETE FROM transients WHERE name = ?1 AND expires_at <= ?2",
                    params![key, now],
                )?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = expiry_from_now(ttl)?.timestamp_millis();
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO transients (name, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expires_at],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM transients WHERE name = ?1", params![key])?;
        Ok(())
    }
}

impl AttemptStore for SqliteStore {
    fn attempts(&self) -> Result<u32> {
        // Unparseable values count as zero.
        Ok(self
            .get_option(ATTEMPTS_OPTION)?
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(0))
    }

    fn record_attempt(&self) -> Result<u32> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row(
            "INSERT INTO options (name, value, updated_at) VALUES (?1, '1', ?2)
             ON CONFLICT(name) DO UPDATE
                SET value = CAST(CAST(options.value AS INTEGER) + 1 AS TEXT),
                    updated_at = excluded.updated_at
             RETURNING CAST(value AS INTEGER)",
            params![ATTEMPTS_OPTION, Utc::now().to_rfc3339()],
            |r| r.get(0),
        )?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_credential_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(CredentialStore::get(&store).unwrap().is_none());

        CredentialStore::set(&store, "first").unwrap();
        CredentialStore::set(&store, "second").unwrap();
        assert_eq!(CredentialStore::get(&store).unwrap().as_deref(), Some("second"));

        CredentialStore::delete(&store).unwrap();
        assert!(CredentialStore::get(&store).unwrap().is_none());
    }

    #[test]
    fn test_transient_expiry() {
        let store = SqliteStore::open_in_memory().unwrap();

        EphemeralStore::set(&store, "live", "yes", Duration::from_secs(3600)).unwrap();
        EphemeralStore::set(&store, "dead", "yes", Duration::ZERO).unwrap();

        assert_eq!(EphemeralStore::get(&store, "live").unwrap().as_deref(), Some("yes"));
        assert!(EphemeralStore::get(&store, "dead").unwrap().is_none());

        let expires_at = store.expires_at("live").unwrap().unwrap();
        let remaining = expires_at - Utc::now();
        assert!(remaining.num_seconds() > 3500 && remaining.num_seconds() <= 3600);
    }

    #[test]
    fn test_purge_expired() {
        let store = SqliteStore::open_in_memory().unwrap();
        EphemeralStore::set(&store, "a", "1", Duration::ZERO).unwrap();
        EphemeralStore::set(&store, "b", "1", Duration::ZERO).unwrap();
        EphemeralStore::set(&store, "c", "1", Duration::from_secs(60)).unwrap();

        assert_eq!(store.purge_expired().unwrap(), 2);
        assert!(EphemeralStore::get(&store, "c").unwrap().is_some());
    }

    #[test]
    fn test_attempts_increment() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.attempts().unwrap(), 0);
        assert_eq!(store.record_attempt().unwrap(), 1);
        assert_eq!(store.record_attempt().unwrap(), 2);
        assert_eq!(store.attempts().unwrap(), 2);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/state.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            CredentialStore::set(&store, "persisted").unwrap();
            store.record_attempt().unwrap();
            EphemeralStore::set(&store, "lock", "1", Duration::from_secs(60)).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(CredentialStore::get(&store).unwrap().as_deref(), Some("persisted"));
        assert_eq!(store.attempts().unwrap(), 1);
        assert!(EphemeralStore::get(&store, "lock").unwrap().is_some());
    }
}
