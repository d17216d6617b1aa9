// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const LOGIN_SUCCESS: &str = "auth.login.success";
pub const LOGIN_FAILED: &str = "auth.login.failed";
pub const ACCOUNT_LOCKED: &str = "auth.account.locked";
pub const CREDENTIAL_ISSUED: &str = "auth.credential.issued";
pub const CREDENTIAL_REVOKED: &str = "auth.credential.revoked";
pub const CREDENTIAL_REJECTED: &str = "auth.credential.rejected";
pub const PASSWORD_CHANGED: &str = "auth.password.changed";
pub const RESET_TOKEN_ISSUED: &str = "auth.reset.issued";
pub const RESET_COMPLETED: &str = "auth.reset.completed";
pub const SESSION_CREATED: &str = "session.created";
pub const SESSION_EXPIRED: &str = "session.expired";
pub const SESSION_ACTIVE: &str = "session.active";
pub const REQUEST_THROTTLED: &str = "http.throttled";
