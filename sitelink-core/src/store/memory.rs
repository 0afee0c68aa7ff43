//! In-process store

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{expiry_from_now, AttemptStore, CredentialStore, EphemeralStore};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    credential: Option<String>,
    transients: HashMap<String, (String, DateTime<Utc>)>,
    attempts: u32,
}

/// Store that keeps everything in memory.
///
/// State lives as long as the value; share it with `Arc` to hand the same
/// state to several components.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a credential already present.
    pub fn with_credential(token: &str) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.credential = Some(token.to_string());
        }
        store
    }

    /// Expiry of an unexpired transient.
    pub fn expires_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let inner = self.lock()?;
        Ok(inner
            .transients
            .get(key)
            .map(|(_, expires_at)| *expires_at)
            .filter(|expires_at| *expires_at > Utc::now()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".to_string()))
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self) -> Result<Option<String>> {
        Ok(self.lock()?.credential.clone())
    }

    fn set(&self, token: &str) -> Result<()> {
        self.lock()?.credential = Some(token.to_string());
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        self.lock()?.credential = None;
        Ok(())
    }
}

impl EphemeralStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut inner = self.lock()?;

        match inner.transients.get(key) {
            Some((value, expires_at)) if *expires_at > Utc::now() => Ok(Some(value.clone())),
            Some(_) => {
                inner.transients.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = expiry_from_now(ttl)?;
        self.lock()?
            .transients
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.transients.remove(key);
        Ok(())
    }
}

impl AttemptStore for MemoryStore {
    fn attempts(&self) -> Result<u32> {
        Ok(self.lock()?.attempts)
    }

    fn record_attempt(&self) -> Result<u32> {
        let mut inner = self.lock()?;
        inner.attempts = inner.attempts.saturating_add(1);
        Ok(inner.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_roundtrip() {
        let store = MemoryStore::new();
        assert!(CredentialStore::get(&store).unwrap().is_none());

        CredentialStore::set(&store, "abc").unwrap();
        assert_eq!(CredentialStore::get(&store).unwrap().as_deref(), Some("abc"));

        CredentialStore::delete(&store).unwrap();
        assert!(CredentialStore::get(&store).unwrap().is_none());
    }

    #[test]
    fn test_transient_expiry() {
        let store = MemoryStore::new();

        EphemeralStore::set(&store, "live", "1", Duration::from_secs(60)).unwrap();
        EphemeralStore::set(&store, "dead", "1", Duration::ZERO).unwrap();

        assert_eq!(EphemeralStore::get(&store, "live").unwrap().as_deref(), Some("1"));
        assert!(EphemeralStore::get(&store, "dead").unwrap().is_none());
        assert!(store.expires_at("live").unwrap().is_some());
        assert!(store.expires_at("dead").unwrap().is_none());
    }

    #[test]
    fn test_attempts_increment() {
        let store = MemoryStore::new();
        assert_eq!(store.attempts().unwrap(), 0);
        assert_eq!(store.record_attempt().unwrap(), 1);
        assert_eq!(store.record_attempt().unwrap(), 2);
        assert_eq!(store.attempts().unwrap(), 2);
    }

    #[test]
    fn test_with_credential() {
        let store = MemoryStore::with_credential("appear-connected");
        assert_eq!(
            CredentialStore::get(&store).unwrap().as_deref(),
            Some("appear-connected")
        );
    }
}
