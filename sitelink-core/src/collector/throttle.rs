//! Connection throttle lock
//!
//! A single transient entry marks connection attempts as disallowed until it
//! expires. Its lifetime comes from the backoff schedule for the current
//! attempt count.

use std::sync::Arc;
use std::time::Duration;

use super::backoff::throttle_interval;
use crate::error::Result;
use crate::store::{AttemptStore, EphemeralStore};

/// Transient key holding the throttle lock
pub const THROTTLE_KEY: &str = "connection_throttle";

/// Gate consulted before every handshake.
#[derive(Clone)]
pub struct ThrottleGate {
    transients: Arc<dyn EphemeralStore>,
    attempts: Arc<dyn AttemptStore>,
}

impl ThrottleGate {
    pub fn new(transients: Arc<dyn EphemeralStore>, attempts: Arc<dyn AttemptStore>) -> Self {
        Self {
            transients,
            attempts,
        }
    }

    /// Whether a connection attempt is currently disallowed.
    ///
    /// An unreadable lock counts as held.
    pub fn is_throttled(&self) -> bool {
        match self.transients.get(THROTTLE_KEY) {
            Ok(lock) => lock.is_some(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read throttle lock, treating as throttled");
                true
            }
        }
    }

    /// Take the lock for the interval matching the current attempt count.
    ///
    /// Returns the interval the lock was set for.
    pub fn throttle(&self) -> Result<Duration> {
        let interval = self.interval()?;
        self.transients.set(THROTTLE_KEY, "1", interval)?;

        tracing::debug!(interval_secs = interval.as_secs(), "Connection throttle set");
        Ok(interval)
    }

    /// Backoff interval for the current attempt count.
    pub fn interval(&self) -> Result<Duration> {
        Ok(throttle_interval(self.attempts.attempts()?))
    }

    /// Recorded connection attempts.
    pub fn attempts(&self) -> Result<u32> {
        self.attempts.attempts()
    }

    /// Increment and persist the attempt counter.
    pub(crate) fn record_attempt(&self) -> Result<u32> {
        self.attempts.record_attempt()
    }
}
