// ============================
// crates/backend-lib/src/auth/brute_force.rs
// ============================
//! Failed-login counting and lockout.
//!
//! Each identifier gets an expiring counter. Every failure bumps the count and
//! restarts the full lockout window, so a sustained attack keeps the lock in
//! place instead of letting it lapse mid-attack. A successful login deletes
//! the counter.
//!
//! When the cache cannot be reached the guard logs the error and reports the
//! identifier as unlocked. Lockout is one layer of defence and must not take
//! every login down with it.
use crate::cache::{CounterCache, CounterEntry};
use crate::config::AuthSettings;
use chrono::Duration;
use std::sync::Arc;
use tracing::{error, warn};

const KEY_PREFIX: &str = "login_attempts:";

/// Lockout guard over a `CounterCache`
#[derive(Clone)]
pub struct BruteForceGuard {
    cache: Arc<dyn CounterCache>,
    /// Failures that trigger a lockout
    max_attempts: u32,
    /// Counter TTL, reset on every failure
    window: Duration,
}

impl BruteForceGuard {
    pub fn new(cache: Arc<dyn CounterCache>, settings: &AuthSettings) -> Self {
        Self {
            cache,
            max_attempts: settings.max_attempts,
            window: settings.lockout_duration(),
        }
    }

    fn key(identifier: &str) -> String {
        format!("{KEY_PREFIX}{}", identifier.trim().to_lowercase())
    }

    fn entry(&self, identifier: &str) -> Option<CounterEntry> {
        match self.cache.get(&Self::key(identifier)) {
            Ok(entry) => entry,
            Err(e) => {
                error!(error = %e, "brute-force counter unavailable, treating as unlocked");
                None
            }
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Record a failed attempt and return the new count (0 if the cache failed)
    pub fn record_failure(&self, identifier: &str) -> u32 {
        match self.cache.incr_with_ttl(&Self::key(identifier), self.window) {
            Ok(count) => {
                warn!(
                    identifier = %identifier,
                    attempts = count,
                    max_attempts = self.max_attempts,
                    "failed login attempt"
                );
                count
            }
            Err(e) => {
                error!(error = %e, identifier = %identifier, "could not record failed login");
                0
            }
        }
    }

    /// Forget all failures for the identifier
    pub fn record_success(&self, identifier: &str) {
        if let Err(e) = self.cache.delete(&Self::key(identifier)) {
            error!(error = %e, identifier = %identifier, "could not reset login attempts");
        }
    }

    pub fn is_locked(&self, identifier: &str) -> bool {
        self.entry(identifier)
            .is_some_and(|e| e.count >= self.max_attempts)
    }

    pub fn remaining_attempts(&self, identifier: &str) -> u32 {
        let count = self.entry(identifier).map_or(0, |e| e.count);
        self.max_attempts.saturating_sub(count)
    }

    /// Seconds until the counter expires, rounded up; 0 when not locked
    pub fn lockout_seconds_remaining(&self, identifier: &str) -> u64 {
        match self.entry(identifier) {
            Some(entry) if entry.count >= self.max_attempts => {
                let millis = entry.ttl.num_milliseconds().max(0) as u64;
                millis.div_ceil(1000)
            }
            _ => 0,
        }
    }
}
