// ============================
// crates/backend-lib/src/models.rs
// ============================
//! Persistent records owned by the authentication core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
pub use talent_auth_common::AccountId;
use talent_auth_common::UserSummary;

/// A registered identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Always stored lower-case
    pub email: String,
    pub username: Option<String>,
    pub name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    /// Lockout mirror maintained by the login path
    pub is_locked: bool,
    pub lockout_until: Option<DateTime<Utc>>,
    pub failed_login_attempts: u32,
    pub last_failed_login: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub last_password_change: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

impl Account {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }

    /// Set a new credential hash and move the password generation forward
    pub fn set_password_hash(&mut self, hash: String, at: DateTime<Utc>) {
        self.password_hash = hash;
        self.last_password_change = Some(at);
    }

    pub fn clear_lockout(&mut self) {
        self.is_locked = false;
        self.lockout_until = None;
        self.failed_login_attempts = 0;
        self.last_failed_login = None;
    }
}

/// Request origin recorded alongside security events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Fields needed to create an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub username: Option<String>,
    pub name: String,
    pub password_hash: String,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

/// Persisted password reset token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetToken {
    pub token: String,
    pub account_id: AccountId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl PasswordResetToken {
    /// Unused and not yet expired
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.used && now < self.expires_at
    }
}

/// Security log event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEvent {
    Registration,
    LoginSuccess,
    LoginFailed,
    AccountLocked,
    Logout,
    LogoutAllDevices,
    TokenRefresh,
    PasswordChange,
    PasswordResetRequested,
    PasswordReset,
}

impl SecurityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEvent::Registration => "registration",
            SecurityEvent::LoginSuccess => "login_success",
            SecurityEvent::LoginFailed => "login_failed",
            SecurityEvent::AccountLocked => "account_locked",
            SecurityEvent::Logout => "logout",
            SecurityEvent::LogoutAllDevices => "logout_all_devices",
            SecurityEvent::TokenRefresh => "token_refresh",
            SecurityEvent::PasswordChange => "password_change",
            SecurityEvent::PasswordResetRequested => "password_reset_requested",
            SecurityEvent::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityLog {
    pub event_type: SecurityEvent,
    pub account_id: Option<AccountId>,
    pub email: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Access or refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Access,
    Refresh,
}

/// Why a credential was revoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    Logout,
    LogoutAll,
    /// A newer login replaced it
    Superseded,
    PasswordChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    pub reason: RevocationReason,
    pub at: DateTime<Utc>,
}

/// Record of an issued access or refresh token, keyed by its `jti`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedCredential {
    pub jti: String,
    pub account_id: AccountId,
    pub kind: CredentialKind,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: Option<Revocation>,
}

/// Lifecycle position of an issued credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Active,
    Expired,
    Revoked(RevocationReason),
}

impl IssuedCredential {
    /// Revocation wins over expiry so a revoked credential never reads as merely expired.
    pub fn state(&self, now: DateTime<Utc>) -> CredentialState {
        match self.revoked {
            Some(revocation) => CredentialState::Revoked(revocation.reason),
            None if now >= self.expires_at => CredentialState::Expired,
            None => CredentialState::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Warning,
    Alert,
    Security,
    Account,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Warning => "warning",
            NotificationKind::Alert => "alert",
            NotificationKind::Security => "security",
            NotificationKind::Account => "account",
            NotificationKind::System => "system",
        }
    }
}

/// User-facing notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub account_id: AccountId,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationKind,
    pub read: bool,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub account_id: AccountId,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationKind,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn credential(expires_in: i64) -> (IssuedCredential, DateTime<Utc>) {
        let now = Utc::now();
        let cred = IssuedCredential {
            jti: "abc".into(),
            account_id: 1,
            kind: CredentialKind::Access,
            issued_at: now,
            expires_at: now + Duration::seconds(expires_in),
            revoked: None,
        };
        (cred, now)
    }

    #[test]
    fn credential_expires_at_boundary() {
        let (cred, now) = credential(60);
        assert_eq!(cred.state(now), CredentialState::Active);
        assert_eq!(cred.state(now + Duration::seconds(59)), CredentialState::Active);
        assert_eq!(cred.state(now + Duration::seconds(60)), CredentialState::Expired);
    }

    #[test]
    fn revoked_is_reported_before_expired() {
        let (mut cred, now) = credential(60);
        cred.revoked = Some(Revocation {
            reason: RevocationReason::PasswordChanged,
            at: now,
        });
        assert_eq!(
            cred.state(now + Duration::hours(1)),
            CredentialState::Revoked(RevocationReason::PasswordChanged)
        );
    }

    #[test]
    fn reset_token_activity() {
        let now = Utc::now();
        let mut token = PasswordResetToken {
            token: "t".into(),
            account_id: 1,
            created_at: now,
            expires_at: now + Duration::hours(24),
            used: false,
            ip_address: None,
            user_agent: None,
        };
        assert!(token.is_active(now));
        assert!(!token.is_active(now + Duration::hours(24)));
        token.used = true;
        assert!(!token.is_active(now));
    }
}
