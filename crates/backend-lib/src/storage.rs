// ============================
// crates/backend-lib/src/storage.rs
// ============================
//! Storage abstraction with an in-memory implementation.
//!
//! The trait is the seam for a durable backend. `MemoryStorage` keeps every
//! table in concurrent maps and enforces the uniqueness rules the rest of
//! the core relies on: unique email and username, at most one active reset
//! token per account, and absorbing credential revocation.
use crate::models::{
    Account, AccountId, IssuedCredential, NewAccount, NewNotification, Notification,
    PasswordResetToken, Revocation, SecurityLog,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a storage backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness rule would be violated
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The backend could not be reached
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for storage backends
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Create an account. Email (case-insensitive) and username must be unused.
    async fn create_account(&self, new: NewAccount) -> StoreResult<Account>;

    async fn account(&self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Case-insensitive email lookup
    async fn account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    async fn account_by_username(&self, username: &str) -> StoreResult<Option<Account>>;

    /// Overwrite an existing account
    async fn save_account(&self, account: &Account) -> StoreResult<()>;

    /// Stamp `last_login` and clear the lockout mirror, but only while the
    /// stored hash is still `password_hash`. Other fields are left as stored.
    /// Returns the updated row, or `None` when the row is gone or the
    /// password moved on.
    async fn record_login(
        &self,
        id: AccountId,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Account>>;

    /// Count a failed login on the lockout mirror. `attempts` replaces the
    /// stored count; `None` bumps it.
    async fn record_failed_login(
        &self,
        id: AccountId,
        attempts: Option<u32>,
        at: DateTime<Utc>,
        locked_until: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    /// Replace the password hash and move `last_password_change` to `at`.
    /// Returns the row after the update.
    async fn update_password(
        &self,
        id: AccountId,
        password_hash: String,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Account>>;

    async fn delete_account(&self, id: AccountId) -> StoreResult<()>;

    async fn staff_accounts(&self) -> StoreResult<Vec<Account>>;

    /// Insert a reset token. Fails with `Conflict` while the account still has
    /// an active token at `now`.
    async fn insert_reset_token(
        &self,
        token: PasswordResetToken,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Mark every active token of the account used. Returns how many changed.
    async fn invalidate_reset_tokens(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> StoreResult<usize>;

    async fn reset_token(&self, token: &str) -> StoreResult<Option<PasswordResetToken>>;

    /// Compare-and-set `used` from false to true. Returns false when the token
    /// is unknown or was already used.
    async fn consume_reset_token(&self, token: &str) -> StoreResult<bool>;

    async fn insert_credential(&self, credential: IssuedCredential) -> StoreResult<()>;

    async fn credential(&self, jti: &str) -> StoreResult<Option<IssuedCredential>>;

    /// Revoke one credential. A credential that is already revoked keeps its
    /// first revocation; the return value says whether this call changed it.
    async fn revoke_credential(&self, jti: &str, revocation: Revocation) -> StoreResult<bool>;

    /// Revoke every unrevoked credential of the account, returning the
    /// credentials this call revoked.
    async fn revoke_account_credentials(
        &self,
        account_id: AccountId,
        revocation: Revocation,
    ) -> StoreResult<Vec<IssuedCredential>>;

    /// Drop credential records that expired before `cutoff`
    async fn purge_credentials(&self, cutoff: DateTime<Utc>) -> StoreResult<usize>;

    async fn append_security_log(&self, entry: SecurityLog) -> StoreResult<()>;

    /// Security log entries, oldest first, optionally for a single account
    async fn security_logs(&self, account_id: Option<AccountId>) -> StoreResult<Vec<SecurityLog>>;

    async fn insert_notification(&self, new: NewNotification) -> StoreResult<Notification>;

    /// Notifications of an account, newest first
    async fn notifications(&self, account_id: AccountId) -> StoreResult<Vec<Notification>>;

    /// Returns false when the notification does not exist or belongs to someone else
    async fn mark_notification_read(&self, account_id: AccountId, id: u64) -> StoreResult<bool>;

    /// Mark every unread notification of the account read, returning how many changed
    async fn mark_all_notifications_read(&self, account_id: AccountId) -> StoreResult<usize>;

    async fn unread_notifications(&self, account_id: AccountId) -> StoreResult<usize>;
}

#[derive(Default)]
struct Tables {
    accounts: DashMap<AccountId, Account>,
    /// Serialises account creation so the uniqueness checks and insert are atomic
    account_writes: Mutex<()>,
    /// Reset tokens live under one lock: the one-active-token rule spans rows
    reset_tokens: Mutex<HashMap<String, PasswordResetToken>>,
    credentials: DashMap<String, IssuedCredential>,
    security_log: Mutex<Vec<SecurityLog>>,
    notifications: DashMap<u64, Notification>,
    next_account_id: AtomicU64,
    next_notification_id: AtomicU64,
}

/// In-memory implementation of the Storage trait
#[derive(Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_account(&self, predicate: impl Fn(&Account) -> bool) -> Option<Account> {
        self.tables
            .accounts
            .iter()
            .find(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
    }

    /// Apply `change` to one row while holding its entry lock
    fn update_account(&self, id: AccountId, change: impl FnOnce(&mut Account)) -> Option<Account> {
        let mut entry = self.tables.accounts.get_mut(&id)?;
        change(entry.value_mut());
        Some(entry.value().clone())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_account(&self, new: NewAccount) -> StoreResult<Account> {
        let email = new.email.trim().to_lowercase();
        let _guard = self.tables.account_writes.lock();

        if self.find_account(|a| a.email == email).is_some() {
            return Err(StoreError::Conflict(format!("email {email} already registered")));
        }
        if let Some(username) = new.username.as_deref() {
            if self
                .find_account(|a| a.username.as_deref() == Some(username))
                .is_some()
            {
                return Err(StoreError::Conflict(format!("username {username} already taken")));
            }
        }

        let id = self.tables.next_account_id.fetch_add(1, Ordering::SeqCst) + 1;
        let account = Account {
            id,
            email,
            username: new.username,
            name: new.name,
            password_hash: new.password_hash,
            is_active: true,
            is_staff: new.is_staff,
            is_locked: false,
            lockout_until: None,
            failed_login_attempts: 0,
            last_failed_login: None,
            last_login: None,
            last_password_change: None,
            date_joined: new.date_joined,
        };
        self.tables.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.tables.accounts.get(&id).map(|a| a.value().clone()))
    }

    async fn account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let email = email.trim().to_lowercase();
        Ok(self.find_account(|a| a.email == email))
    }

    async fn account_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        Ok(self.find_account(|a| a.username.as_deref() == Some(username)))
    }

    async fn save_account(&self, account: &Account) -> StoreResult<()> {
        match self.tables.accounts.get_mut(&account.id) {
            Some(mut existing) => {
                *existing = account.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("account {}", account.id))),
        }
    }

    async fn record_login(
        &self,
        id: AccountId,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Account>> {
        let Some(mut entry) = self.tables.accounts.get_mut(&id) else {
            return Ok(None);
        };
        if entry.password_hash != password_hash {
            return Ok(None);
        }
        entry.clear_lockout();
        entry.last_login = Some(at);
        Ok(Some(entry.value().clone()))
    }

    async fn record_failed_login(
        &self,
        id: AccountId,
        attempts: Option<u32>,
        at: DateTime<Utc>,
        locked_until: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        self.update_account(id, |account| {
            account.failed_login_attempts =
                attempts.unwrap_or_else(|| account.failed_login_attempts.saturating_add(1));
            account.last_failed_login = Some(at);
            if locked_until.is_some() {
                account.is_locked = true;
                account.lockout_until = locked_until;
            }
        });
        Ok(())
    }

    async fn update_password(
        &self,
        id: AccountId,
        password_hash: String,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Account>> {
        Ok(self.update_account(id, |account| account.set_password_hash(password_hash, at)))
    }

    async fn delete_account(&self, id: AccountId) -> StoreResult<()> {
        self.tables.accounts.remove(&id);
        Ok(())
    }

    async fn staff_accounts(&self) -> StoreResult<Vec<Account>> {
        Ok(self
            .tables
            .accounts
            .iter()
            .filter(|a| a.is_staff && a.is_active)
            .map(|a| a.value().clone())
            .collect())
    }

    async fn insert_reset_token(
        &self,
        token: PasswordResetToken,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tokens = self.tables.reset_tokens.lock();
        let has_active = tokens
            .values()
            .any(|t| t.account_id == token.account_id && t.is_active(now));
        if has_active {
            return Err(StoreError::Conflict(format!(
                "account {} already has an active reset token",
                token.account_id
            )));
        }
        if tokens.contains_key(&token.token) {
            return Err(StoreError::Conflict("duplicate reset token".to_string()));
        }
        tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn invalidate_reset_tokens(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let mut tokens = self.tables.reset_tokens.lock();
        let mut changed = 0;
        for token in tokens.values_mut() {
            if token.account_id == account_id && token.is_active(now) {
                token.used = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn reset_token(&self, token: &str) -> StoreResult<Option<PasswordResetToken>> {
        Ok(self.tables.reset_tokens.lock().get(token).cloned())
    }

    async fn consume_reset_token(&self, token: &str) -> StoreResult<bool> {
        let mut tokens = self.tables.reset_tokens.lock();
        match tokens.get_mut(token) {
            Some(record) if !record.used => {
                record.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_credential(&self, credential: IssuedCredential) -> StoreResult<()> {
        match self.tables.credentials.entry(credential.jti.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::Conflict(format!("credential {} exists", credential.jti)))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(credential);
                Ok(())
            }
        }
    }

    async fn credential(&self, jti: &str) -> StoreResult<Option<IssuedCredential>> {
        Ok(self.tables.credentials.get(jti).map(|c| c.value().clone()))
    }

    async fn revoke_credential(&self, jti: &str, revocation: Revocation) -> StoreResult<bool> {
        match self.tables.credentials.get_mut(jti) {
            Some(mut credential) if credential.revoked.is_none() => {
                credential.revoked = Some(revocation);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_account_credentials(
        &self,
        account_id: AccountId,
        revocation: Revocation,
    ) -> StoreResult<Vec<IssuedCredential>> {
        let mut changed = Vec::new();
        for mut credential in self.tables.credentials.iter_mut() {
            if credential.account_id == account_id && credential.revoked.is_none() {
                credential.revoked = Some(revocation);
                changed.push(credential.value().clone());
            }
        }
        Ok(changed)
    }

    async fn purge_credentials(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let before = self.tables.credentials.len();
        self.tables.credentials.retain(|_, c| c.expires_at >= cutoff);
        Ok(before.saturating_sub(self.tables.credentials.len()))
    }

    async fn append_security_log(&self, entry: SecurityLog) -> StoreResult<()> {
        self.tables.security_log.lock().push(entry);
        Ok(())
    }

    async fn security_logs(&self, account_id: Option<AccountId>) -> StoreResult<Vec<SecurityLog>> {
        let log = self.tables.security_log.lock();
        Ok(log
            .iter()
            .filter(|e| account_id.is_none() || e.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn insert_notification(&self, new: NewNotification) -> StoreResult<Notification> {
        let id = self.tables.next_notification_id.fetch_add(1, Ordering::SeqCst) + 1;
        let notification = Notification {
            id,
            account_id: new.account_id,
            title: new.title,
            message: new.message,
            notification_type: new.notification_type,
            read: false,
            link: new.link,
            created_at: new.created_at,
        };
        self.tables.notifications.insert(id, notification.clone());
        Ok(notification)
    }

    async fn notifications(&self, account_id: AccountId) -> StoreResult<Vec<Notification>> {
        let mut list: Vec<Notification> = self
            .tables
            .notifications
            .iter()
            .filter(|n| n.account_id == account_id)
            .map(|n| n.value().clone())
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(list)
    }

    async fn mark_notification_read(&self, account_id: AccountId, id: u64) -> StoreResult<bool> {
        match self.tables.notifications.get_mut(&id) {
            Some(mut n) if n.account_id == account_id => {
                n.read = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_notifications_read(&self, account_id: AccountId) -> StoreResult<usize> {
        let mut marked = 0;
        for mut n in self.tables.notifications.iter_mut() {
            if n.account_id == account_id && !n.read {
                n.read = true;
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn unread_notifications(&self, account_id: AccountId) -> StoreResult<usize> {
        Ok(self
            .tables
            .notifications
            .iter()
            .filter(|n| n.account_id == account_id && !n.read)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CredentialKind, RevocationReason};
    use chrono::Duration;

    fn new_account(email: &str, username: Option<&str>) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            username: username.map(str::to_string),
            name: "Test".to_string(),
            password_hash: "hash".to_string(),
            is_staff: false,
            date_joined: Utc::now(),
        }
    }

    fn reset_token(token: &str, account_id: AccountId, now: DateTime<Utc>) -> PasswordResetToken {
        PasswordResetToken {
            token: token.to_string(),
            account_id,
            created_at: now,
            expires_at: now + Duration::hours(24),
            used: false,
            ip_address: None,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn email_is_unique_ignoring_case() {
        let store = MemoryStorage::new();
        let account = store
            .create_account(new_account("User@Example.com", Some("user")))
            .await
            .unwrap();
        assert_eq!(account.email, "user@example.com");

        let dup = store.create_account(new_account("USER@example.com", None)).await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));

        let dup = store.create_account(new_account("other@example.com", Some("user"))).await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));

        let found = store.account_by_email(" user@EXAMPLE.com").await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(account.id));
    }

    #[tokio::test]
    async fn login_stamps_leave_the_password_alone() {
        let store = MemoryStorage::new();
        let account = store.create_account(new_account("a@example.com", None)).await.unwrap();
        let now = Utc::now();

        store
            .record_failed_login(account.id, None, now, Some(now + Duration::minutes(15)))
            .await
            .unwrap();
        let changed = store
            .update_password(account.id, "new-hash".into(), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(changed.failed_login_attempts, 1);
        assert!(changed.is_locked);

        // a login that verified against the old hash cannot stamp the new one
        assert!(store.record_login(account.id, "hash", now).await.unwrap().is_none());
        assert!(store.account(account.id).await.unwrap().unwrap().last_login.is_none());

        let stamped = store.record_login(account.id, "new-hash", now).await.unwrap().unwrap();
        assert_eq!(stamped.password_hash, "new-hash");
        assert_eq!(stamped.last_password_change, Some(now));
        assert_eq!(stamped.last_login, Some(now));
        assert!(!stamped.is_locked);
        assert_eq!(stamped.failed_login_attempts, 0);

        assert!(store.record_login(999, "new-hash", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_active_reset_token_conflicts() {
        let store = MemoryStorage::new();
        let now = Utc::now();
        store.insert_reset_token(reset_token("a", 1, now), now).await.unwrap();

        let err = store.insert_reset_token(reset_token("b", 1, now), now).await;
        assert!(matches!(err, Err(StoreError::Conflict(_))));

        // other accounts are unaffected
        store.insert_reset_token(reset_token("c", 2, now), now).await.unwrap();

        assert_eq!(store.invalidate_reset_tokens(1, now).await.unwrap(), 1);
        store.insert_reset_token(reset_token("b", 1, now), now).await.unwrap();
    }

    #[tokio::test]
    async fn consume_is_compare_and_set() {
        let store = MemoryStorage::new();
        let now = Utc::now();
        store.insert_reset_token(reset_token("a", 1, now), now).await.unwrap();

        assert!(store.consume_reset_token("a").await.unwrap());
        assert!(!store.consume_reset_token("a").await.unwrap());
        assert!(!store.consume_reset_token("missing").await.unwrap());
    }

    #[tokio::test]
    async fn revocation_keeps_first_reason() {
        let store = MemoryStorage::new();
        let now = Utc::now();
        store
            .insert_credential(IssuedCredential {
                jti: "j1".into(),
                account_id: 1,
                kind: CredentialKind::Access,
                issued_at: now,
                expires_at: now + Duration::hours(1),
                revoked: None,
            })
            .await
            .unwrap();

        let first = Revocation { reason: RevocationReason::Logout, at: now };
        let second = Revocation { reason: RevocationReason::PasswordChanged, at: now };
        assert!(store.revoke_credential("j1", first).await.unwrap());
        assert!(!store.revoke_credential("j1", second).await.unwrap());
        assert!(store.revoke_account_credentials(1, second).await.unwrap().is_empty());

        let stored = store.credential("j1").await.unwrap().unwrap();
        assert_eq!(stored.revoked, Some(first));
    }

    #[tokio::test]
    async fn notifications_are_scoped_to_owner() {
        let store = MemoryStorage::new();
        let n = store
            .insert_notification(NewNotification {
                account_id: 1,
                title: "t".into(),
                message: "m".into(),
                notification_type: crate::models::NotificationKind::Security,
                link: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(!store.mark_notification_read(2, n.id).await.unwrap());
        assert!(store.mark_notification_read(1, n.id).await.unwrap());
        assert!(store.notifications(1).await.unwrap()[0].read);
        assert!(store.notifications(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_all_read_counts_only_unread_of_owner() {
        let store = MemoryStorage::new();
        let notify = |account_id| NewNotification {
            account_id,
            title: "t".into(),
            message: "m".into(),
            notification_type: crate::models::NotificationKind::Security,
            link: None,
            created_at: Utc::now(),
        };
        let first = store.insert_notification(notify(1)).await.unwrap();
        for account_id in [1, 1, 2] {
            store.insert_notification(notify(account_id)).await.unwrap();
        }
        store.mark_notification_read(1, first.id).await.unwrap();

        assert_eq!(store.unread_notifications(1).await.unwrap(), 2);
        assert_eq!(store.mark_all_notifications_read(1).await.unwrap(), 2);
        assert_eq!(store.unread_notifications(1).await.unwrap(), 0);
        assert_eq!(store.mark_all_notifications_read(1).await.unwrap(), 0);
        assert_eq!(store.unread_notifications(2).await.unwrap(), 1);
    }
}
