// ============================
// crates/backend-lib/src/time.rs
// ============================
//! An overridable clock shared by every component that reasons about expiry.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Wall clock that tests can pin and step forward.
///
/// Clones share the same override, so fixing the time on one handle moves
/// every component holding a clone.
#[derive(Debug, Clone, Default)]
pub struct TimeProvider {
    fixed: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl TimeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider pinned at `at`
    pub fn fixed(at: DateTime<Utc>) -> Self {
        let provider = Self::default();
        provider.fix(Some(at));
        provider
    }

    pub fn now(&self) -> DateTime<Utc> {
        match *self.fixed.read() {
            Some(fixed) => fixed,
            None => Utc::now(),
        }
    }

    /// Pin the clock, or release it with `None`
    pub fn fix(&self, fixed: Option<DateTime<Utc>>) {
        *self.fixed.write() = fixed;
    }

    /// Move a pinned clock forward. Pins the clock first if it was live.
    pub fn advance(&self, by: Duration) {
        let mut fixed = self.fixed.write();
        let base = fixed.unwrap_or_else(Utc::now);
        *fixed = Some(base + by);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_override() {
        let start = Utc::now();
        let clock = TimeProvider::fixed(start);
        let other = clock.clone();

        clock.advance(Duration::seconds(30));
        assert_eq!(other.now(), start + Duration::seconds(30));

        other.fix(None);
        assert!(clock.now() >= start);
    }
}
