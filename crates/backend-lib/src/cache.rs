// ============================
// crates/backend-lib/src/cache.rs
// ============================
//! Expiring counters for ephemeral security state.
//!
//! Counters live in a TTL cache rather than the store: they heal on their own
//! after inactivity and never need a cleanup migration.
use crate::time::TimeProvider;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Live counter value and the time it has left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    pub count: u32,
    pub ttl: Duration,
}

/// Counter store with per-key expiry
pub trait CounterCache: Send + Sync {
    /// Increment the counter and reset its expiry to `ttl` from now.
    /// Expired counters restart at 1.
    fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u32, CacheError>;

    /// Current value, or `None` if absent or expired
    fn get(&self, key: &str) -> Result<Option<CounterEntry>, CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Drop expired counters, returning how many were removed
    fn purge_expired(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u32,
    expires_at: DateTime<Utc>,
}

/// Process-local `CounterCache`
#[derive(Debug, Clone)]
pub struct MemoryCache {
    slots: Arc<DashMap<String, Slot>>,
    clock: TimeProvider,
}

impl MemoryCache {
    pub fn new(clock: TimeProvider) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            clock,
        }
    }
}

impl CounterCache for MemoryCache {
    fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u32, CacheError> {
        let now = self.clock.now();
        let mut slot = self.slots.entry(key.to_string()).or_insert(Slot {
            count: 0,
            expires_at: now,
        });
        if slot.expires_at <= now {
            slot.count = 0;
        }
        slot.count = slot.count.saturating_add(1);
        slot.expires_at = now + ttl;
        Ok(slot.count)
    }

    fn get(&self, key: &str) -> Result<Option<CounterEntry>, CacheError> {
        let now = self.clock.now();
        Ok(self.slots.get(key).and_then(|slot| {
            (slot.expires_at > now).then(|| CounterEntry {
                count: slot.count,
                ttl: slot.expires_at - now,
            })
        }))
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.slots.remove(key);
        Ok(())
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.expires_at > now);
        before.saturating_sub(self.slots.len())
    }
}
