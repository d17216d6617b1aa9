// ============================
// crates/backend-lib/src/auth/session.rs
// ============================
//! Server-side cookie sessions.
//!
//! A session is an opaque id mapping to a small key/value bag. Handlers talk
//! to it through [`Session`], which exposes `get`, `set` and `flush` only.
use crate::auth::token_generator::generate_secure_token;
use crate::metrics::{SESSION_ACTIVE, SESSION_CREATED, SESSION_EXPIRED};
use crate::models::AccountId;
use dashmap::DashMap;
use metrics::{counter, gauge};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "sessionid";

/// Owning account id
pub const KEY_ACCOUNT_ID: &str = "account_id";
/// Unix millis of the last authenticated request
pub const KEY_LAST_ACTIVITY: &str = "last_activity";
/// `last_password_change` of the account when the session was opened
pub const KEY_PASSWORD_GENERATION: &str = "password_generation";

type SessionData = HashMap<String, Value>;

/// Store of live sessions
#[derive(Clone, Default)]
pub struct SessionManager {
    sessions: Arc<DashMap<String, SessionData>>,
}

/// Handle on one session
#[derive(Clone)]
pub struct Session {
    id: String,
    manager: SessionManager,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.manager
            .sessions
            .get(&self.id)
            .and_then(|data| data.get(key).cloned())
    }

    /// Set a key. A flushed session stays flushed.
    pub fn set(&self, key: &str, value: Value) {
        if let Some(mut data) = self.manager.sessions.get_mut(&self.id) {
            data.insert(key.to_string(), value);
        }
    }

    /// Destroy the session and all of its data
    pub fn flush(&self) {
        self.manager.remove(&self.id);
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.get(KEY_ACCOUNT_ID).and_then(|v| v.as_u64())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }
}

impl SessionManager {
    /// Create a new session manager
    pub fn new() -> Self {
        Self::default()
    }

    fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            gauge!(SESSION_ACTIVE).set(self.sessions.len() as f64);
        }
        removed
    }

    /// Open a new, empty session
    pub fn create(&self) -> Session {
        let id = generate_secure_token();
        self.sessions.insert(id.clone(), SessionData::new());

        counter!(SESSION_CREATED).increment(1);
        gauge!(SESSION_ACTIVE).set(self.sessions.len() as f64);

        Session {
            id,
            manager: self.clone(),
        }
    }

    /// Handle on an existing session
    pub fn open(&self, id: &str) -> Option<Session> {
        self.sessions.contains_key(id).then(|| Session {
            id: id.to_string(),
            manager: self.clone(),
        })
    }

    /// Flush every session owned by the account. Returns how many were dropped.
    pub fn flush_account(&self, account_id: AccountId) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, data| {
            data.get(KEY_ACCOUNT_ID).and_then(Value::as_u64) != Some(account_id)
        });
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            gauge!(SESSION_ACTIVE).set(self.sessions.len() as f64);
        }
        removed
    }

    /// Drop sessions whose last activity is before `cutoff_millis`
    pub fn purge_idle(&self, cutoff_millis: i64) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, data| {
            data.get(KEY_LAST_ACTIVITY)
                .and_then(Value::as_i64)
                .is_some_and(|last| last >= cutoff_millis)
        });
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            counter!(SESSION_EXPIRED).increment(removed as u64);
            gauge!(SESSION_ACTIVE).set(self.sessions.len() as f64);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
