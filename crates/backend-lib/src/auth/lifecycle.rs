// ============================
// crates/backend-lib/src/auth/lifecycle.rs
// ============================
//! Credential and session lifecycle.
//!
//! Every issued access or refresh token has a record keyed by its `jti` and
//! moves `ISSUED -> ACTIVE -> {EXPIRED | REVOKED}`. Revocation is absorbing.
//! On top of per-record revocation, `last_password_change` acts as a
//! generation fence: anything issued before it is refused even if it was
//! never revoked individually.
//!
//! Security-relevant events revoke explicitly here. Nothing happens behind the
//! caller's back.
use crate::audit::AuditTrail;
use crate::auth::brute_force::BruteForceGuard;
use crate::auth::jwt::{Claims, TokenCodec};
use crate::auth::password::{
    hash_in_background, validate_password_strength, verify_in_background,
};
use crate::auth::session::{
    Session, SessionManager, KEY_ACCOUNT_ID, KEY_LAST_ACTIVITY, KEY_PASSWORD_GENERATION,
};
use crate::config::{AuthSettings, PasswordRequirements, Settings};
use crate::error::{AppError, CredentialError, FieldErrors};
use crate::metrics::{
    ACCOUNT_LOCKED, CREDENTIAL_ISSUED, CREDENTIAL_REJECTED, CREDENTIAL_REVOKED, LOGIN_FAILED,
    LOGIN_SUCCESS, PASSWORD_CHANGED, SESSION_EXPIRED,
};
use crate::models::{
    Account, AccountId, ClientMeta, CredentialKind, CredentialState, IssuedCredential, Revocation,
    RevocationReason, SecurityEvent,
};
use crate::notifications::Notifier;
use crate::storage::Storage;
use crate::time::TimeProvider;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

/// Checked against when the identifier matches no account
const DUMMY_PASSWORD: &str = "talent-auth-unknown-account";

/// Freshly issued access + refresh credentials
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    /// Access lifetime in seconds
    pub expires_in: u64,
}

/// Result of a successful login
pub struct LoginOutcome {
    pub account: Account,
    pub tokens: TokenPair,
    /// Cookie session opened alongside the tokens
    pub session: Session,
}

/// Result of a password change or reset
#[derive(Debug, Clone)]
pub struct PasswordUpdate {
    pub account: Account,
    pub credentials_revoked: usize,
    pub sessions_flushed: usize,
}

/// Issues, rotates and revokes credentials
#[derive(Clone)]
pub struct LifecycleManager<S> {
    storage: S,
    guard: BruteForceGuard,
    codec: TokenCodec,
    sessions: SessionManager,
    audit: AuditTrail<S>,
    notifier: Notifier<S>,
    settings: AuthSettings,
    requirements: PasswordRequirements,
    hash_cost: u8,
    /// Scrypt hash with the configured cost, built on first use
    dummy_hash: Arc<OnceCell<String>>,
    clock: TimeProvider,
}

fn millis(at: Option<DateTime<Utc>>) -> i64 {
    at.map_or(0, |t| t.timestamp_millis())
}

fn rejected(err: CredentialError) -> AppError {
    counter!(CREDENTIAL_REJECTED, "reason" => err.code()).increment(1);
    AppError::Credential(err)
}

impl<S: Storage + Clone> LifecycleManager<S> {
    pub fn new(
        storage: S,
        guard: BruteForceGuard,
        sessions: SessionManager,
        settings: &Settings,
        clock: TimeProvider,
    ) -> Self {
        Self {
            audit: AuditTrail::new(storage.clone(), clock.clone()),
            notifier: Notifier::new(storage.clone(), clock.clone()),
            storage,
            guard,
            codec: TokenCodec::new(settings.secret_key.as_bytes()),
            sessions,
            settings: settings.auth.clone(),
            requirements: settings.password_requirements.clone(),
            hash_cost: settings.password_hash_cost,
            dummy_hash: Arc::new(OnceCell::new()),
            clock,
        }
    }

    pub fn guard(&self) -> &BruteForceGuard {
        &self.guard
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn audit(&self) -> &AuditTrail<S> {
        &self.audit
    }

    pub fn notifier(&self) -> &Notifier<S> {
        &self.notifier
    }

    /// Email (any case) or username
    pub async fn resolve_account(&self, identifier: &str) -> Result<Option<Account>, AppError> {
        let identifier = identifier.trim();
        if identifier.contains('@') {
            return Ok(self.storage.account_by_email(identifier).await?);
        }
        match self.storage.account_by_username(identifier).await? {
            Some(account) => Ok(Some(account)),
            None => Ok(self.storage.account_by_email(identifier).await?),
        }
    }

    /// Authenticate and issue a fresh credential pair.
    ///
    /// A locked identifier is refused before the password is looked at, so the
    /// correct password does not help during a lockout. Success revokes every
    /// credential the account held before.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        meta: &ClientMeta,
    ) -> Result<LoginOutcome, AppError> {
        self.login_as(identifier, password, meta, false).await
    }

    /// Like [`login`](Self::login), but only staff accounts get credentials.
    /// Non-staff are refused after their password checks out, so nothing of
    /// theirs is revoked.
    pub async fn login_staff(
        &self,
        identifier: &str,
        password: &str,
        meta: &ClientMeta,
    ) -> Result<LoginOutcome, AppError> {
        self.login_as(identifier, password, meta, true).await
    }

    async fn login_as(
        &self,
        identifier: &str,
        password: &str,
        meta: &ClientMeta,
        staff_only: bool,
    ) -> Result<LoginOutcome, AppError> {
        let account = self.resolve_account(identifier).await?;
        let guard_key = account
            .as_ref()
            .map_or_else(|| identifier.trim().to_lowercase(), |a| a.email.clone());

        if self.guard.is_locked(&guard_key) {
            warn!(identifier = %guard_key, "login blocked, identifier locked");
            return Err(AppError::AccountLocked {
                retry_after_secs: self.guard.lockout_seconds_remaining(&guard_key),
            });
        }

        let verified = match &account {
            Some(a) => verify_in_background(a.password_hash.clone(), password.to_string()).await,
            None => {
                self.verify_dummy(password).await;
                false
            }
        };
        let account = match account {
            Some(account) if verified => account,
            other => {
                self.login_failed(&guard_key, other, meta).await;
                return Err(AppError::InvalidCredentials);
            }
        };

        if !account.is_active {
            warn!(account_id = account.id, "login attempt for inactive account");
            return Err(AppError::Auth("Account is inactive.".to_string()));
        }
        if staff_only && !account.is_staff {
            warn!(account_id = account.id, "non-staff account tried the admin login");
            return Err(AppError::Forbidden(
                "You do not have permission to access the admin panel.".to_string(),
            ));
        }

        let now = self.clock.now();
        let superseded = self
            .revoke_all(account.id, RevocationReason::Superseded, now)
            .await?;
        self.sessions.flush_account(account.id);
        let tokens = self.issue_pair(&account, now).await?;

        // the pair is only good if the hash we verified is still the current one
        let Some(account) = self
            .storage
            .record_login(account.id, &account.password_hash, now)
            .await?
        else {
            self.withdraw(&tokens, now).await?;
            warn!(account_id = account.id, "password changed during login");
            return Err(AppError::InvalidCredentials);
        };
        self.guard.record_success(&guard_key);

        self.audit
            .record(
                SecurityEvent::LoginSuccess,
                Some(account.id),
                Some(&account.email),
                meta,
                json!({ "success": true, "superseded": superseded.len() }),
            )
            .await;
        self.notifier.login(&account, meta).await;
        counter!(LOGIN_SUCCESS).increment(1);
        info!(account_id = account.id, "login succeeded");

        let session = self.open_session(&account, now);
        Ok(LoginOutcome {
            account,
            tokens,
            session,
        })
    }

    async fn login_failed(&self, guard_key: &str, account: Option<Account>, meta: &ClientMeta) {
        let count = self.guard.record_failure(guard_key);
        let locked = count >= self.guard.max_attempts();
        counter!(LOGIN_FAILED).increment(1);

        let Some(account) = account else {
            self.audit
                .record(
                    SecurityEvent::LoginFailed,
                    None,
                    Some(guard_key),
                    meta,
                    json!({ "reason": "user_not_found" }),
                )
                .await;
            return;
        };

        let now = self.clock.now();
        let locked_until = locked.then(|| now + self.settings.lockout_duration());
        if let Err(e) = self
            .storage
            .record_failed_login(account.id, (count > 0).then_some(count), now, locked_until)
            .await
        {
            error!(error = %e, account_id = account.id, "could not update lockout state");
        }

        self.audit
            .record(
                SecurityEvent::LoginFailed,
                Some(account.id),
                Some(&account.email),
                meta,
                json!({ "reason": "invalid_credentials", "attempts": count }),
            )
            .await;

        if locked {
            counter!(ACCOUNT_LOCKED).increment(1);
            warn!(account_id = account.id, attempts = count, "account locked");
            self.audit
                .record(
                    SecurityEvent::AccountLocked,
                    Some(account.id),
                    Some(&account.email),
                    meta,
                    json!({ "lockout_seconds": self.settings.lockout_duration_secs }),
                )
                .await;
        }
    }

    /// Spend the same scrypt work a real account costs, so an unknown
    /// identifier is not answered measurably faster
    async fn verify_dummy(&self, password: &str) {
        let cost = self.hash_cost;
        let hash = self
            .dummy_hash
            .get_or_try_init(|| hash_in_background(DUMMY_PASSWORD.to_string(), cost))
            .await;
        match hash {
            Ok(hash) => {
                verify_in_background(hash.clone(), password.to_string()).await;
            }
            Err(e) => error!(error = %e, "could not build the placeholder password hash"),
        }
    }

    /// Revoke a pair that was issued but never handed out
    async fn withdraw(&self, tokens: &TokenPair, at: DateTime<Utc>) -> Result<(), AppError> {
        let revocation = Revocation {
            reason: RevocationReason::PasswordChanged,
            at,
        };
        for token in [&tokens.access, &tokens.refresh] {
            let claims = self.codec.decode(token).map_err(rejected)?;
            if self.storage.revoke_credential(&claims.jti, revocation).await? {
                counter!(CREDENTIAL_REVOKED).increment(1);
            }
        }
        Ok(())
    }

    async fn issue(
        &self,
        account: &Account,
        kind: CredentialKind,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let lifetime = match kind {
            CredentialKind::Access => self.settings.access_lifetime(),
            CredentialKind::Refresh => self.settings.refresh_lifetime(),
        };
        let claims = Claims::new(account, kind, now, now + lifetime);
        let token = self
            .codec
            .encode(&claims)
            .map_err(|e| AppError::Internal(format!("token encoding failed: {e}")))?;

        self.storage
            .insert_credential(IssuedCredential {
                jti: claims.jti,
                account_id: account.id,
                kind,
                issued_at: now,
                expires_at: now + lifetime,
                revoked: None,
            })
            .await?;
        counter!(CREDENTIAL_ISSUED).increment(1);
        Ok(token)
    }

    /// Issue and record a new access + refresh pair
    pub async fn issue_pair(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access: self.issue(account, CredentialKind::Access, now).await?,
            refresh: self.issue(account, CredentialKind::Refresh, now).await?,
            expires_in: self.settings.access_lifetime_secs,
        })
    }

    /// Issue and record a lone access credential
    pub async fn issue_access(&self, account: &Account) -> Result<String, AppError> {
        self.issue(account, CredentialKind::Access, self.clock.now())
            .await
    }

    async fn revoke_all(
        &self,
        account_id: AccountId,
        reason: RevocationReason,
        at: DateTime<Utc>,
    ) -> Result<Vec<IssuedCredential>, AppError> {
        let revoked = self
            .storage
            .revoke_account_credentials(account_id, Revocation { reason, at })
            .await?;
        if !revoked.is_empty() {
            counter!(CREDENTIAL_REVOKED).increment(revoked.len() as u64);
        }
        Ok(revoked)
    }

    /// Checks shared by request validation and refresh, in order: known
    /// record, not revoked, not expired, live account, not older than the
    /// last password change.
    async fn check_claims(
        &self,
        claims: &Claims,
        kind: CredentialKind,
    ) -> Result<Account, AppError> {
        if claims.token_type != kind {
            return Err(rejected(CredentialError::Invalid));
        }
        let record = match self.storage.credential(&claims.jti).await? {
            Some(record)
                if record.kind == kind && Some(record.account_id) == claims.account_id() =>
            {
                record
            }
            _ => return Err(rejected(CredentialError::Invalid)),
        };

        match record.state(self.clock.now()) {
            CredentialState::Revoked(RevocationReason::PasswordChanged) => {
                return Err(rejected(CredentialError::PasswordChanged))
            }
            CredentialState::Revoked(_) => return Err(rejected(CredentialError::Invalidated)),
            CredentialState::Expired => return Err(rejected(CredentialError::Expired)),
            CredentialState::Active => {}
        }

        let account = match self.storage.account(record.account_id).await? {
            Some(account) if account.is_active => account,
            _ => return Err(rejected(CredentialError::UserNotFound)),
        };

        if account
            .last_password_change
            .is_some_and(|changed| record.issued_at < changed)
        {
            return Err(rejected(CredentialError::PasswordChanged));
        }
        Ok(account)
    }

    /// Resolve the account behind an access credential
    pub async fn validate_request_credential(&self, token: &str) -> Result<Account, AppError> {
        let claims = self.codec.decode(token).map_err(rejected)?;
        self.check_claims(&claims, CredentialKind::Access).await
    }

    /// Check a credential of either kind
    pub async fn verify(&self, token: &str) -> Result<Account, AppError> {
        let claims = self.codec.decode(token).map_err(rejected)?;
        self.check_claims(&claims, claims.token_type).await
    }

    /// Trade a refresh credential for a new access credential
    pub async fn refresh(&self, refresh_token: &str, meta: &ClientMeta) -> Result<String, AppError> {
        let claims = self.codec.decode(refresh_token).map_err(rejected)?;
        let account = self.check_claims(&claims, CredentialKind::Refresh).await?;

        let access = self
            .issue(&account, CredentialKind::Access, self.clock.now())
            .await?;
        self.audit
            .record(
                SecurityEvent::TokenRefresh,
                Some(account.id),
                Some(&account.email),
                meta,
                json!({}),
            )
            .await;
        Ok(access)
    }

    /// Check the new password against the current one and the complexity rules
    pub async fn check_new_password(&self, account: &Account, new: &str) -> Result<(), AppError> {
        if verify_in_background(account.password_hash.clone(), new.to_string()).await {
            return Err(AppError::field(
                "new_password",
                "New password must be different from the current password.",
            ));
        }
        self.check_strength(new)
    }

    fn check_strength(&self, new: &str) -> Result<(), AppError> {
        validate_password_strength(new, &self.requirements).map_err(|problems| {
            let mut errors = FieldErrors::new();
            errors.insert("new_password".to_string(), problems);
            AppError::Validation(errors)
        })
    }

    /// Store a new password hash and kill everything issued before it
    pub async fn set_password(
        &self,
        account: Account,
        new: &str,
    ) -> Result<PasswordUpdate, AppError> {
        let hash = hash_in_background(new.to_string(), self.hash_cost)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let now = self.clock.now();
        let account = self
            .storage
            .update_password(account.id, hash, now)
            .await?
            .ok_or(AppError::Credential(CredentialError::UserNotFound))?;

        let revoked = self
            .revoke_all(account.id, RevocationReason::PasswordChanged, now)
            .await?;
        let flushed = self.sessions.flush_account(account.id);
        counter!(PASSWORD_CHANGED).increment(1);
        info!(
            account_id = account.id,
            credentials_revoked = revoked.len(),
            sessions_flushed = flushed,
            "password updated"
        );

        Ok(PasswordUpdate {
            account,
            credentials_revoked: revoked.len(),
            sessions_flushed: flushed,
        })
    }

    /// Authenticated password change
    pub async fn change_password(
        &self,
        account_id: AccountId,
        old: &str,
        new: &str,
        meta: &ClientMeta,
    ) -> Result<PasswordUpdate, AppError> {
        let account = match self.storage.account(account_id).await? {
            Some(account) if account.is_active => account,
            _ => return Err(CredentialError::UserNotFound.into()),
        };
        if !verify_in_background(account.password_hash.clone(), old.to_string()).await {
            return Err(AppError::BadRequest("Invalid old password".to_string()));
        }
        if old == new {
            return Err(AppError::field(
                "new_password",
                "New password must be different from the current password.",
            ));
        }
        self.check_strength(new)?;

        let update = self.set_password(account, new).await?;
        self.audit
            .record(
                SecurityEvent::PasswordChange,
                Some(update.account.id),
                Some(&update.account.email),
                meta,
                json!({ "credentials_revoked": update.credentials_revoked }),
            )
            .await;
        self.notifier.password_changed(&update.account, meta).await;
        Ok(update)
    }

    /// Revoke the presented credentials and flush the session. Revoking what
    /// is already revoked or expired is fine; a token that is not ours is not.
    pub async fn logout(
        &self,
        access: Option<&str>,
        refresh: Option<&str>,
        session_id: Option<&str>,
        meta: &ClientMeta,
    ) -> Result<usize, AppError> {
        let now = self.clock.now();
        let mut owner: Option<AccountId> = None;
        let mut revoked = 0;

        for token in [access, refresh].into_iter().flatten() {
            let claims = self.codec.decode(token).map_err(rejected)?;
            let account_id = claims.account_id();
            if owner.is_some() && owner != account_id {
                warn!("logout presented credentials of two accounts, ignoring the second");
                continue;
            }
            owner = owner.or(account_id);
            let revocation = Revocation {
                reason: RevocationReason::Logout,
                at: now,
            };
            if self.storage.revoke_credential(&claims.jti, revocation).await? {
                revoked += 1;
            }
        }
        if revoked > 0 {
            counter!(CREDENTIAL_REVOKED).increment(revoked as u64);
        }

        if let Some(session) = session_id.and_then(|id| self.sessions.open(id)) {
            owner = owner.or(session.account_id());
            session.flush();
        }

        if owner.is_some() {
            self.audit
                .record(
                    SecurityEvent::Logout,
                    owner,
                    None,
                    meta,
                    json!({ "credentials_revoked": revoked }),
                )
                .await;
        }
        Ok(revoked)
    }

    /// Revoke every credential and session of the account. Returns the number
    /// of login sessions terminated (one per outstanding refresh credential).
    pub async fn logout_all(&self, account: &Account, meta: &ClientMeta) -> Result<usize, AppError> {
        let now = self.clock.now();
        let revoked = self
            .revoke_all(account.id, RevocationReason::LogoutAll, now)
            .await?;
        let flushed = self.sessions.flush_account(account.id);
        let terminated = revoked
            .iter()
            .filter(|c| c.kind == CredentialKind::Refresh && c.expires_at > now)
            .count();

        self.audit
            .record(
                SecurityEvent::LogoutAllDevices,
                Some(account.id),
                Some(&account.email),
                meta,
                json!({
                    "credentials_revoked": revoked.len(),
                    "sessions_flushed": flushed,
                    "sessions_terminated": terminated,
                }),
            )
            .await;
        info!(account_id = account.id, terminated, "logged out of all devices");
        Ok(terminated)
    }

    fn open_session(&self, account: &Account, now: DateTime<Utc>) -> Session {
        let session = self.sessions.create();
        session.set(KEY_ACCOUNT_ID, json!(account.id));
        session.set(KEY_LAST_ACTIVITY, json!(now.timestamp_millis()));
        session.set(
            KEY_PASSWORD_GENERATION,
            json!(millis(account.last_password_change)),
        );
        session
    }

    /// Resolve a cookie session, enforcing the idle timeout. Each successful
    /// call slides the idle window forward.
    pub async fn validate_session(&self, session_id: &str) -> Result<Account, AppError> {
        let session = self
            .sessions
            .open(session_id)
            .ok_or(AppError::SessionExpired)?;

        let now = self.clock.now().timestamp_millis();
        let idle_limit = self.settings.session_idle_timeout().num_milliseconds();
        let idle = session
            .get_i64(KEY_LAST_ACTIVITY)
            .map_or(i64::MAX, |last| now.saturating_sub(last));
        if idle > idle_limit {
            session.flush();
            counter!(SESSION_EXPIRED).increment(1);
            return Err(AppError::SessionExpired);
        }

        let Some(account_id) = session.account_id() else {
            session.flush();
            return Err(AppError::SessionExpired);
        };
        let account = match self.storage.account(account_id).await? {
            Some(account) if account.is_active => account,
            _ => {
                session.flush();
                return Err(rejected(CredentialError::UserNotFound));
            }
        };
        if session.get_i64(KEY_PASSWORD_GENERATION) != Some(millis(account.last_password_change)) {
            session.flush();
            return Err(rejected(CredentialError::PasswordChanged));
        }

        session.set(KEY_LAST_ACTIVITY, json!(now));
        Ok(account)
    }

    /// Drop expired credential records and idle sessions
    pub async fn purge_expired(&self) -> Result<(usize, usize), AppError> {
        let now = self.clock.now();
        let credentials = self.storage.purge_credentials(now).await?;
        let idle_cutoff = now - self.settings.session_idle_timeout();
        let sessions = self.sessions.purge_idle(idle_cutoff.timestamp_millis());
        Ok((credentials, sessions))
    }
}
