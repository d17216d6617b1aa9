// ============================
// crates/backend-lib/src/auth/jwt.rs
// ============================
//! HS256 access and refresh credentials.
//!
//! The codec only proves a token was signed by this server and parses its
//! claims. Expiry, revocation and the password-generation fence are decided by
//! the lifecycle manager against the issued-credential record, so `exp` is not
//! checked here.
use crate::error::CredentialError;
use crate::models::{Account, AccountId, CredentialKind};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Account id
    pub sub: String,
    /// Unique token id, key of the issued-credential record
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub token_type: CredentialKind,
    pub email: String,
    pub name: String,
}

impl Claims {
    pub fn new(
        account: &Account,
        kind: CredentialKind,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sub: account.id.to_string(),
            jti: Uuid::new_v4().simple().to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            token_type: kind,
            email: account.email.clone(),
            name: account.name.clone(),
        }
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.sub.parse().ok()
    }
}

/// Signs and verifies credentials with the server secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = false;
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(JWT_ALGORITHM), claims, &self.encoding)
    }

    /// Verify the signature and parse the claims. Any failure is `Invalid`.
    pub fn decode(&self, token: &str) -> Result<Claims, CredentialError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| CredentialError::Invalid)?;
        if data.claims.account_id().is_none() {
            return Err(CredentialError::Invalid);
        }
        Ok(data.claims)
    }
}
