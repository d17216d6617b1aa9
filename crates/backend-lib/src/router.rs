// ============================
// crates/backend-lib/src/router.rs
// ============================
//! HTTP router.
use crate::handlers::{auth, notifications};
use crate::middleware::rate_limit;
use crate::storage::Storage;
use crate::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Mount point of every endpoint
pub const API_PREFIX: &str = "/api/auth";

/// Create the HTTP router
pub fn create_router<S: Storage + Clone>(state: Arc<AppState<S>>) -> Router {
    let api = Router::new()
        .route("/register", post(auth::register::<S>))
        .route("/login", post(auth::login::<S>))
        .route("/admin/login", post(auth::admin_login::<S>))
        .route("/forgot-password", post(auth::forgot_password::<S>))
        .route("/reset-password", post(auth::reset_password::<S>))
        .route("/change-password", post(auth::change_password::<S>))
        .route("/logout", post(auth::logout::<S>))
        .route("/logout-all-devices", post(auth::logout_all::<S>))
        .route("/token/refresh", post(auth::refresh::<S>))
        .route("/token/verify", post(auth::verify::<S>))
        .route("/notifications", get(notifications::list::<S>))
        .route("/notifications/unread-count", get(notifications::unread_count::<S>))
        .route("/notifications/read-all", post(notifications::mark_all_read::<S>))
        .route("/notifications/{id}/read", post(notifications::mark_read::<S>))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::<S>,
        ));

    Router::new()
        .nest(API_PREFIX, api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
