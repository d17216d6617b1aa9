// ============================
// crates/backend-lib/src/middleware/mod.rs
// ============================
//! Middleware and request extractors for the auth routes.

pub mod authenticate;
pub mod rate_limit;

pub use authenticate::{bearer_token, client_meta, session_cookie, CredentialSource, CurrentAccount};
pub use rate_limit::{rate_limit, RateLimiter};
