// ============================
// crates/backend-lib/src/handlers/mod.rs
// ============================
//! HTTP handlers for `/api/auth`.

pub mod auth;
pub mod notifications;
