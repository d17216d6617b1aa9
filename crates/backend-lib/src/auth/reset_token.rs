// ============================
// crates/backend-lib/src/auth/reset_token.rs
// ============================
//! Password reset tokens.
//!
//! A token is `<hex timestamp millis>-<hex nonce>-<hex hmac>`. The MAC covers
//! the account id, the timestamp, the nonce and the parts of account state
//! that change when the token should die: password hash, last login and the
//! active flag. Resetting the password therefore invalidates the token on its
//! own.
//! The persisted record is a second layer: it carries the `used` flag and
//! enforces one active token per account.
use crate::config::AuthSettings;
use crate::models::{Account, ClientMeta, PasswordResetToken};
use crate::storage::{Storage, StoreError};
use crate::time::TimeProvider;
use chrono::Duration;
use hmac::{digest::InvalidLength, Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use tracing::{error, info};

type HmacSha256 = Hmac<Sha256>;

/// Domain separation for reset-token MACs
const KEY_SALT: &str = "talent_auth.password_reset";

/// Issues, validates and invalidates password reset tokens
#[derive(Clone)]
pub struct ResetTokenIssuer<S> {
    storage: S,
    mac: HmacSha256,
    lifetime: Duration,
    clock: TimeProvider,
}

struct ParsedToken<'a> {
    timestamp: i64,
    nonce: &'a str,
    signature: Vec<u8>,
}

fn parse(token: &str) -> Option<ParsedToken<'_>> {
    let mut parts = token.split('-');
    let (ts, nonce, sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || nonce.is_empty() {
        return None;
    }
    let timestamp = i64::from_str_radix(ts, 16).ok()?;
    let signature = hex::decode(sig).ok()?;
    Some(ParsedToken {
        timestamp,
        nonce,
        signature,
    })
}

impl<S: Storage + Clone> ResetTokenIssuer<S> {
    pub fn new(
        storage: S,
        secret: &[u8],
        settings: &AuthSettings,
        clock: TimeProvider,
    ) -> Result<Self, InvalidLength> {
        Ok(Self {
            storage,
            mac: HmacSha256::new_from_slice(secret)?,
            lifetime: settings.reset_token_lifetime(),
            clock,
        })
    }

    fn keyed(&self, account: &Account, timestamp: i64, nonce: &str) -> HmacSha256 {
        let last_login = account
            .last_login
            .map_or_else(String::new, |t| t.timestamp_micros().to_string());
        let mut mac = self.mac.clone();
        mac.update(
            format!(
                "{KEY_SALT}|{}|{timestamp}|{nonce}|{}|{last_login}|{}",
                account.id, account.password_hash, account.is_active
            )
            .as_bytes(),
        );
        mac
    }

    /// Cryptographic check alone: well-formed, signed for this account's
    /// current state, and younger than the lifetime.
    pub fn check_signature(&self, account: &Account, token: &str) -> bool {
        let Some(parsed) = parse(token) else {
            return false;
        };
        let age = self.clock.now().timestamp_millis() - parsed.timestamp;
        if age < 0 || age >= self.lifetime.num_milliseconds() {
            return false;
        }
        self.keyed(account, parsed.timestamp, parsed.nonce)
            .verify_slice(&parsed.signature)
            .is_ok()
    }

    /// Issue a new token, retiring any the account still holds.
    ///
    /// Fails with `StoreError::Conflict` when a concurrent request slipped an
    /// active token in between the retire and the insert.
    pub async fn issue(&self, account: &Account, meta: &ClientMeta) -> Result<String, StoreError> {
        let now = self.clock.now();
        let retired = self.storage.invalidate_reset_tokens(account.id, now).await?;

        let timestamp = now.timestamp_millis();
        let nonce = format!("{:016x}", OsRng.next_u64());
        let signature = self.keyed(account, timestamp, &nonce).finalize().into_bytes();
        let token = format!("{timestamp:x}-{nonce}-{}", hex::encode(signature));

        self.storage
            .insert_reset_token(
                PasswordResetToken {
                    token: token.clone(),
                    account_id: account.id,
                    created_at: now,
                    expires_at: now + self.lifetime,
                    used: false,
                    ip_address: meta.ip_address.clone(),
                    user_agent: meta.user_agent.clone(),
                },
                now,
            )
            .await?;

        info!(account_id = account.id, retired, "password reset token issued");
        Ok(token)
    }

    /// True only if the signature checks out and the persisted record exists,
    /// belongs to the account, is unused and unexpired. Never errors.
    pub async fn validate(&self, account: &Account, token: &str) -> bool {
        if !self.check_signature(account, token) {
            return false;
        }
        match self.storage.reset_token(token).await {
            Ok(Some(record)) => {
                record.account_id == account.id && record.is_active(self.clock.now())
            }
            Ok(None) => false,
            Err(e) => {
                error!(error = %e, account_id = account.id, "reset token lookup failed");
                false
            }
        }
    }

    /// Mark the record used. Returns false if another request consumed it first.
    pub async fn invalidate(&self, record: &PasswordResetToken) -> Result<bool, StoreError> {
        let consumed = self.storage.consume_reset_token(&record.token).await?;
        if consumed {
            info!(account_id = record.account_id, "password reset token invalidated");
        }
        Ok(consumed)
    }

    /// Fetch the persisted record for a token
    pub async fn record(&self, token: &str) -> Result<Option<PasswordResetToken>, StoreError> {
        self.storage.reset_token(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAccount;
    use crate::storage::MemoryStorage;
    use chrono::{TimeZone, Utc};

    const SECRET: &[u8] = b"reset-token-test-secret-0123456789abcdef";

    async fn setup() -> (ResetTokenIssuer<MemoryStorage>, MemoryStorage, Account, TimeProvider) {
        let clock = TimeProvider::fixed(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let storage = MemoryStorage::new();
        let account = storage
            .create_account(NewAccount {
                email: "u@example.com".into(),
                username: None,
                name: "U".into(),
                password_hash: "$scrypt$original".into(),
                is_staff: false,
                date_joined: clock.now(),
            })
            .await
            .unwrap();
        let issuer =
            ResetTokenIssuer::new(storage.clone(), SECRET, &AuthSettings::default(), clock.clone())
                .unwrap();
        (issuer, storage, account, clock)
    }

    #[tokio::test]
    async fn fresh_token_validates() {
        let (issuer, _, account, _) = setup().await;
        let token = issuer.issue(&account, &ClientMeta::default()).await.unwrap();
        assert_eq!(token.split('-').count(), 3);
        assert!(issuer.validate(&account, &token).await);
    }

    #[tokio::test]
    async fn second_issue_retires_the_first() {
        let (issuer, _, account, _) = setup().await;
        let first = issuer.issue(&account, &ClientMeta::default()).await.unwrap();
        let second = issuer.issue(&account, &ClientMeta::default()).await.unwrap();
        assert_ne!(first, second);
        assert!(!issuer.validate(&account, &first).await);
        assert!(issuer.validate(&account, &second).await);
    }

    #[tokio::test]
    async fn expires_exactly_at_lifetime() {
        let (issuer, _, account, clock) = setup().await;
        let token = issuer.issue(&account, &ClientMeta::default()).await.unwrap();

        clock.advance(Duration::hours(24) - Duration::seconds(1));
        assert!(issuer.validate(&account, &token).await);

        clock.advance(Duration::seconds(1));
        assert!(!issuer.validate(&account, &token).await);
    }

    #[tokio::test]
    async fn lifetime_is_measured_to_the_millisecond() {
        let clock = TimeProvider::fixed(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::milliseconds(900),
        );
        let (_, storage, account, _) = setup().await;
        let issuer =
            ResetTokenIssuer::new(storage, SECRET, &AuthSettings::default(), clock.clone())
                .unwrap();
        let token = issuer.issue(&account, &ClientMeta::default()).await.unwrap();

        // crosses a whole-second boundary but is still inside the lifetime
        clock.advance(Duration::hours(24) - Duration::milliseconds(500));
        assert!(issuer.check_signature(&account, &token));
        assert!(issuer.validate(&account, &token).await);

        clock.advance(Duration::milliseconds(500));
        assert!(!issuer.check_signature(&account, &token));
        assert!(!issuer.validate(&account, &token).await);
    }

    #[tokio::test]
    async fn account_state_change_invalidates() {
        let (issuer, _, mut account, clock) = setup().await;
        let token = issuer.issue(&account, &ClientMeta::default()).await.unwrap();

        let mut relogged = account.clone();
        relogged.last_login = Some(clock.now());
        assert!(!issuer.check_signature(&relogged, &token));

        account.password_hash = "$scrypt$changed".into();
        assert!(!issuer.validate(&account, &token).await);
    }

    #[tokio::test]
    async fn wrong_account_and_garbage_are_rejected() {
        let (issuer, storage, account, clock) = setup().await;
        let other = storage
            .create_account(NewAccount {
                email: "o@example.com".into(),
                username: None,
                name: "O".into(),
                password_hash: "$scrypt$other".into(),
                is_staff: false,
                date_joined: clock.now(),
            })
            .await
            .unwrap();
        let token = issuer.issue(&account, &ClientMeta::default()).await.unwrap();

        assert!(!issuer.validate(&other, &token).await);
        for garbage in ["", "abc", "zz-1-00", "1-2-3-4", "663218c0--deadbeef"] {
            assert!(!issuer.validate(&account, garbage).await, "{garbage}");
        }
    }

    #[tokio::test]
    async fn used_record_fails_even_with_valid_signature() {
        let (issuer, _, account, _) = setup().await;
        let token = issuer.issue(&account, &ClientMeta::default()).await.unwrap();
        let record = issuer.record(&token).await.unwrap().unwrap();

        assert!(issuer.invalidate(&record).await.unwrap());
        assert!(!issuer.invalidate(&record).await.unwrap());
        assert!(issuer.check_signature(&account, &token));
        assert!(!issuer.validate(&account, &token).await);
    }

    #[tokio::test]
    async fn racing_insert_surfaces_conflict() {
        let (issuer, storage, account, clock) = setup().await;
        let now = clock.now();
        storage
            .insert_reset_token(
                PasswordResetToken {
                    token: "planted".into(),
                    account_id: account.id,
                    created_at: now,
                    expires_at: now + Duration::hours(24),
                    used: false,
                    ip_address: None,
                    user_agent: None,
                },
                now,
            )
            .await
            .unwrap();

        // issue retires "planted" first, so it succeeds
        assert!(issuer.issue(&account, &ClientMeta::default()).await.is_ok());

        // a token inserted after the retire step collides
        let token = issuer.issue(&account, &ClientMeta::default()).await.unwrap();
        let record = issuer.record(&token).await.unwrap().unwrap();
        let dup = storage
            .insert_reset_token(
                PasswordResetToken {
                    token: "late".into(),
                    ..record
                },
                now,
            )
            .await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
    }
}
