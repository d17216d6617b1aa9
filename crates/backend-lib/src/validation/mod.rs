// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Request validation.
//!
//! Field checks return [`ValidationError`]; request-level validators collect
//! them into [`FieldErrors`] so the client sees every problem at once.

use crate::auth::password::validate_password_strength;
use crate::config::PasswordRequirements;
use crate::error::FieldErrors;
use regex::Regex;
use std::sync::LazyLock;
use talent_auth_common::RegisterRequest;
use thiserror::Error;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321 SMTP limit
const MAX_NAME_LENGTH: usize = 255;
const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 150;

pub const REQUIRED: &str = "This field is required.";

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex")
});
static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("username regex"));

/// Possible validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0}")]
    InvalidEmail(String),

    #[error("{0}")]
    InvalidName(String),

    #[error("{0}")]
    InvalidUsername(String),

    #[error("{0}")]
    InvalidPassword(String),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Registration input after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRegistration {
    /// Lower-cased
    pub email: String,
    pub name: String,
    pub username: Option<String>,
    pub password: String,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Validate an email address
pub fn validate_email(email: &str) -> ValidationResult<&str> {
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::InvalidEmail(format!(
            "Ensure this field has no more than {MAX_EMAIL_LENGTH} characters."
        )));
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::InvalidEmail(
            "Enter a valid email address.".to_string(),
        ));
    }
    Ok(email)
}

pub fn validate_name(name: &str) -> ValidationResult<&str> {
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::InvalidName(format!(
            "Ensure this field has no more than {MAX_NAME_LENGTH} characters."
        )));
    }
    Ok(name)
}

pub fn validate_username(username: &str) -> ValidationResult<&str> {
    let len = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&len) {
        return Err(ValidationError::InvalidUsername(format!(
            "Username must be between {MIN_USERNAME_LENGTH} and {MAX_USERNAME_LENGTH} characters."
        )));
    }
    // @ would make a username indistinguishable from an email at login
    if username.contains('@') || !USERNAME_REGEX.is_match(username) {
        return Err(ValidationError::InvalidUsername(
            "Enter a valid username. This value may contain only letters, numbers, and ./+/-/_ characters."
                .to_string(),
        ));
    }
    Ok(username)
}

/// Validate a registration body. Uniqueness is left to the store.
pub fn validate_registration(
    req: &RegisterRequest,
    requirements: &PasswordRequirements,
) -> Result<ValidRegistration, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut push = |field: &str, message: String| {
        errors.entry(field.to_string()).or_default().push(message);
    };

    let email = match present(req.email.as_deref()) {
        None => {
            push("email", REQUIRED.to_string());
            None
        }
        Some(email) => match validate_email(email) {
            Ok(email) => Some(email.to_lowercase()),
            Err(e) => {
                push("email", e.to_string());
                None
            }
        },
    };

    let name = match present(req.name.as_deref()) {
        None => {
            push("name", REQUIRED.to_string());
            None
        }
        Some(name) => match validate_name(name) {
            Ok(name) => Some(name.to_string()),
            Err(e) => {
                push("name", e.to_string());
                None
            }
        },
    };

    let username = match present(req.username.as_deref()).map(validate_username) {
        None => None,
        Some(Ok(username)) => Some(username.to_string()),
        Some(Err(e)) => {
            push("username", e.to_string());
            None
        }
    };

    let password = match req.password.as_deref().filter(|p| !p.is_empty()) {
        None => {
            push("password", REQUIRED.to_string());
            None
        }
        Some(password) => match validate_password_strength(password, requirements) {
            Ok(()) => Some(password.to_string()),
            Err(problems) => {
                for problem in problems {
                    push("password", problem);
                }
                None
            }
        },
    };

    match (email, name, password) {
        (Some(email), Some(name), Some(password)) if errors.is_empty() => Ok(ValidRegistration {
            email,
            name,
            username,
            password,
        }),
        _ => Err(errors),
    }
}
