// ================
// common/src/lib.rs
// ================
//! Request and response types shared between the talent-auth server and
//! its clients. Every field that a client may omit is optional so the
//! server can report missing fields as validation errors instead of
//! rejecting the body outright.

use serde::{Deserialize, Serialize};

/// Account identifier
pub type AccountId = u64;

/// Body of `POST /register`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub username: Option<String>,
}

/// Successful registration
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterResponse {
    pub id: AccountId,
    pub email: String,
    pub name: String,
    /// Access credential for the new account
    pub token: String,
}

/// Body of `POST /login` and `POST /admin/login`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LoginRequest {
    /// Email address; takes precedence over `username`
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    /// The identifier the client supplied, email first
    pub fn identifier(&self) -> Option<&str> {
        self.email
            .as_deref()
            .or(self.username.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Public view of an account
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: AccountId,
    pub email: String,
    pub name: String,
}

/// Successful login
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginResponse {
    /// Access credential
    pub token: String,
    /// Refresh credential
    pub refresh: String,
    /// Access credential lifetime in seconds
    pub expires_in: u64,
    pub user: UserSummary,
}

/// Successful staff login
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AdminLoginResponse {
    pub id: AccountId,
    pub email: String,
    pub name: String,
    pub role: String,
    pub token: String,
    pub refresh: String,
    pub expires_in: u64,
}

/// Body of `POST /forgot-password`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

/// Body of `POST /reset-password`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ResetPasswordRequest {
    /// URL-safe base64 of the account id
    pub uid: Option<String>,
    pub token: Option<String>,
    pub new_password: Option<String>,
}

/// Body of `POST /change-password`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

/// Body of `POST /logout`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LogoutRequest {
    /// Refresh credential to revoke alongside the access credential
    pub refresh: Option<String>,
}

/// Body of `POST /token/refresh`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RefreshRequest {
    pub refresh: Option<String>,
}

/// Successful refresh
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RefreshResponse {
    pub access: String,
}

/// Body of `POST /token/verify`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct VerifyRequest {
    pub token: Option<String>,
}

/// Generic success body
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of `POST /logout-all-devices`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LogoutAllResponse {
    pub message: String,
    /// Credentials and sessions revoked by the call
    pub sessions_terminated: usize,
}

/// Error body for non-field errors
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Notification as returned by `GET /notifications`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NotificationView {
    pub id: u64,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub read: bool,
    pub link: Option<String>,
    /// RFC 3339 timestamp
    pub created_at: String,
    pub user_id: AccountId,
}

/// Result of `GET /notifications/unread-count`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UnreadCountResponse {
    pub unread_count: usize,
}

/// Result of `POST /notifications/read-all`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MarkAllReadResponse {
    pub message: String,
    /// Notifications that were unread before the call
    pub marked: usize,
}
