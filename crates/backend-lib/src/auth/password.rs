// ============================
// crates/backend-lib/src/auth/password.rs
// ============================
//! Password hashing and verification.
//!
//! New hashes are scrypt PHC strings. Verification also accepts argon2 hashes
//! so accounts imported from elsewhere keep working.
use crate::config::PasswordRequirements;
use argon2::Argon2;
use scrypt::{
    password_hash::{
        self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Params, Scrypt,
};
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("invalid scrypt cost {0}")]
    Cost(u8),

    #[error("hashing failed: {0}")]
    Hash(#[from] password_hash::Error),

    #[error("hashing task failed")]
    Worker,
}

/// Hash a password using scrypt with `log_n = cost`
pub fn hash_password(plain: &str, cost: u8) -> Result<String, PasswordError> {
    let params = Params::new(cost, 8, 1, 32)
        .map_err(|_| PasswordError::Cost(cost))?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Scrypt
        .hash_password_customized(plain.as_bytes(), None, None, params, &salt)?
        .to_string();
    Ok(hash)
}

/// Verify a password against a stored hash. Unparseable hashes never match.
pub fn verify_password(hash: &str, plain: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    let argon2 = Argon2::default();
    let verifiers: [&dyn PasswordVerifier; 2] = [&Scrypt, &argon2];
    parsed_hash.verify_password(&verifiers, plain).is_ok()
}

/// Securely hash a password and zeroize the original
pub fn hash_password_secure(plain: &mut String, cost: u8) -> Result<String, PasswordError> {
    let hash = hash_password(plain, cost);
    plain.zeroize();
    hash
}

/// Hash on the blocking pool; scrypt is deliberately slow
pub async fn hash_in_background(mut plain: String, cost: u8) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password_secure(&mut plain, cost))
        .await
        .map_err(|_| PasswordError::Worker)?
}

/// Verify on the blocking pool
pub async fn verify_in_background(hash: String, mut plain: String) -> bool {
    tokio::task::spawn_blocking(move || {
        let ok = verify_password(&hash, &plain);
        plain.zeroize();
        ok
    })
    .await
    .unwrap_or(false)
}

/// Check a password against the complexity requirements, collecting every
/// rule it breaks
pub fn validate_password_strength(
    password: &str,
    requirements: &PasswordRequirements,
) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();

    if password.chars().count() < requirements.min_length {
        problems.push(format!(
            "Password must be at least {} characters long",
            requirements.min_length
        ));
    }

    if requirements.require_uppercase && !password.chars().any(char::is_uppercase) {
        problems.push("Password must contain at least one uppercase letter".to_string());
    }

    if requirements.require_lowercase && !password.chars().any(char::is_lowercase) {
        problems.push("Password must contain at least one lowercase letter".to_string());
    }

    if requirements.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("Password must contain at least one digit".to_string());
    }

    if requirements.require_special && password.chars().all(char::is_alphanumeric) {
        problems.push("Password must contain at least one special character".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}
