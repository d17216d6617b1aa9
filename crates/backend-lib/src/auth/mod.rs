// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod brute_force;
pub mod jwt;
pub mod lifecycle;
pub mod password;
pub mod reset_token;
pub mod session;
pub mod token_generator;
mod service;
mod service_impl;

pub use brute_force::BruteForceGuard;
pub use jwt::{Claims, TokenCodec};
pub use lifecycle::{LifecycleManager, LoginOutcome, PasswordUpdate, TokenPair};
pub use password::{hash_password, validate_password_strength, verify_password};
pub use reset_token::ResetTokenIssuer;
pub use service::{AuthService, LoginReply, PurgeReport};
pub use service_impl::DefaultAuth;
pub use session::{Session, SessionManager, SESSION_COOKIE};
