// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Authentication core of the talent-auth server: brute-force guard,
//! password reset tokens, credential/session lifecycle and the HTTP gateway.

pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod router;
pub mod storage;
pub mod time;
pub mod validation;

use crate::auth::{
    AuthService, BruteForceGuard, DefaultAuth, LifecycleManager, ResetTokenIssuer, SessionManager,
};
use crate::cache::{CounterCache, MemoryCache};
use crate::config::Settings;
use crate::mailer::{LogMailer, Mailer};
use crate::middleware::RateLimiter;
use crate::storage::Storage;
use crate::time::TimeProvider;
use anyhow::anyhow;
use std::sync::Arc;
use tracing::debug;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState<S> {
    /// Authentication gateway
    pub auth: Arc<dyn AuthService>,
    /// Storage backend
    pub storage: S,
    pub settings: Arc<Settings>,
    /// Cookie sessions
    pub sessions: SessionManager,
    /// Per-client request throttling
    pub rate_limiter: Arc<RateLimiter>,
    /// Brute-force counters
    pub cache: Arc<dyn CounterCache>,
    pub clock: TimeProvider,
}

impl<S: Storage + Clone> AppState<S> {
    /// Create a new application state with the system clock and the logging
    /// mail transport
    pub fn new(storage: S, settings: Settings) -> anyhow::Result<Self> {
        Self::with_parts(storage, settings, TimeProvider::new(), Arc::new(LogMailer))
    }

    /// Create a new application state from explicit parts
    pub fn with_parts(
        storage: S,
        settings: Settings,
        clock: TimeProvider,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        let settings = Arc::new(settings);
        let cache: Arc<dyn CounterCache> = Arc::new(MemoryCache::new(clock.clone()));
        let sessions = SessionManager::new();

        let guard = BruteForceGuard::new(cache.clone(), &settings.auth);
        let lifecycle = LifecycleManager::new(
            storage.clone(),
            guard,
            sessions.clone(),
            &settings,
            clock.clone(),
        );
        let issuer = ResetTokenIssuer::new(
            storage.clone(),
            settings.secret_key.as_bytes(),
            &settings.auth,
            clock.clone(),
        )
        .map_err(|e| anyhow!("invalid secret key: {e}"))?;
        let auth = Arc::new(DefaultAuth::new(
            lifecycle,
            issuer,
            storage.clone(),
            mailer,
            settings.clone(),
            clock.clone(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(&settings.rate_limit, clock.clone()));

        Ok(Self {
            auth,
            storage,
            settings,
            sessions,
            rate_limiter,
            cache,
            clock,
        })
    }

    /// One maintenance sweep: expired credential records, idle sessions,
    /// lapsed counters and rate-limit windows
    pub async fn purge_expired(&self) -> Result<(), error::AppError> {
        let report = self.auth.purge_expired().await?;
        let counters = self.cache.purge_expired();
        let windows = self.rate_limiter.purge();
        debug!(
            credentials = report.credentials,
            sessions = report.sessions,
            counters,
            windows,
            "maintenance sweep"
        );
        Ok(())
    }
}
