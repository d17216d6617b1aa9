// ============================
// crates/backend-lib/src/error.rs
// ============================
//! Central error type + Axum integration.
use crate::storage::StoreError;
use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::BTreeMap;
use talent_auth_common::ErrorBody;
use thiserror::Error;
use tracing::error;

/// Field name to messages, rendered as `{"field": ["message", ...]}`
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Why a presented access or refresh credential was refused.
///
/// The categories are deliberately coarse: a tampered token and a token for
/// another deployment both read as `Invalid`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Invalid authentication token. Please log in again.")]
    Invalid,

    #[error("This session has been invalidated. Please log in again.")]
    Invalidated,

    #[error("Your session has expired. Please log in again.")]
    Expired,

    #[error("Your password has been changed. Please log in again.")]
    PasswordChanged,

    #[error("User account is inactive or not found.")]
    UserNotFound,
}

impl CredentialError {
    pub fn code(&self) -> &'static str {
        match self {
            CredentialError::Invalid => "token_not_valid",
            CredentialError::Invalidated => "token_blacklisted",
            CredentialError::Expired => "token_expired",
            CredentialError::PasswordChanged => "password_changed",
            CredentialError::UserNotFound => "user_not_found",
        }
    }
}

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(FieldErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid credentials.")]
    InvalidCredentials,

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("{0}")]
    Auth(String),

    #[error("Session expired. Please login again.")]
    SessionExpired,

    #[error("{0}")]
    Forbidden(String),

    #[error("Account temporarily locked. Please try again later.")]
    AccountLocked { retry_after_secs: u64 },

    #[error("Too many requests. Please slow down.")]
    RateLimitExceeded,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Single-field validation error
    pub fn field(name: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(name.to_string(), vec![message.into()]);
        AppError::Validation(errors)
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) | AppError::InvalidCredentials => {
                StatusCode::BAD_REQUEST
            }
            AppError::Credential(_) | AppError::Auth(_) | AppError::SessionExpired => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::AccountLocked { .. } | AppError::RateLimitExceeded => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "invalid",
            AppError::BadRequest(_) => "bad_request",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::Credential(e) => e.code(),
            AppError::Auth(_) => "authentication_failed",
            AppError::SessionExpired => "session_expired",
            AppError::Forbidden(_) => "permission_denied",
            AppError::AccountLocked { .. } => "account_locked",
            AppError::RateLimitExceeded => "throttled",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) | AppError::Store(StoreError::Conflict(_)) => "conflict",
            AppError::Store(_) | AppError::Internal(_) => "server_error",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Store(StoreError::Conflict(_)) => {
                "The request conflicts with existing data".to_string()
            }
            AppError::Store(_) | AppError::Internal(_) => {
                "An error occurred. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let err = match self {
            AppError::Validation(fields) => return (status, Json(fields)).into_response(),
            other => other,
        };

        if status.is_server_error() {
            error!(error = %err, "request failed");
        }

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            err.to_string()
        } else {
            err.sanitized_message()
        };

        let body = ErrorBody {
            error: message,
            code: Some(err.error_code().to_string()),
        };
        let mut response = (status, Json(body)).into_response();

        if let AppError::AccountLocked { retry_after_secs } = err {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(AppError::InvalidCredentials.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Credential(CredentialError::Expired).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::AccountLocked { retry_after_secs: 10 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Store(StoreError::Conflict("x".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Store(StoreError::Unavailable("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_credential_error_codes() {
        assert_eq!(CredentialError::Invalidated.code(), "token_blacklisted");
        assert_eq!(CredentialError::PasswordChanged.code(), "password_changed");
        assert_eq!(
            AppError::from(CredentialError::UserNotFound).error_code(),
            "user_not_found"
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = AppError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "Invalid credentials.", "code": "invalid_credentials"})
        );
    }

    #[tokio::test]
    async fn test_field_errors_render_as_map() {
        let response = AppError::field("email", "Email is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"email": ["Email is required"]})
        );
    }

    #[tokio::test]
    async fn test_lockout_sets_retry_after() {
        let response = AppError::AccountLocked { retry_after_secs: 42 }.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
        let body = body_json(response).await;
        assert_eq!(
            body["error"],
            "Account temporarily locked. Please try again later."
        );
    }
}
