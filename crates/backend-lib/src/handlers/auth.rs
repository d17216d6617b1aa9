// ============================
// crates/backend-lib/src/handlers/auth.rs
// ============================
//! Account and credential endpoints.
//!
//! Handlers only unpack the request, call the [`AuthService`] and shape the
//! reply. Bodies are taken as `Result<Json<_>, JsonRejection>` so a broken
//! body renders through [`AppError`] like every other failure.
//!
//! [`AuthService`]: crate::auth::AuthService
use crate::error::AppError;
use crate::middleware::authenticate::{
    bearer_token, session_clear_cookie, session_cookie, session_set_cookie, CurrentAccount,
};
use crate::models::ClientMeta;
use crate::storage::Storage;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use talent_auth_common::{
    AdminLoginResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
    LoginResponse, LogoutAllResponse, LogoutRequest, MessageResponse, RefreshRequest,
    RefreshResponse, RegisterRequest, RegisterResponse, ResetPasswordRequest, VerifyRequest,
};

type Body<T> = Result<Json<T>, JsonRejection>;

fn body<T>(body: Body<T>) -> Result<T, AppError> {
    body.map(|Json(inner)| inner).map_err(AppError::from)
}

pub async fn register<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    meta: ClientMeta,
    req: Body<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let created = state.auth.register(body(req)?, meta).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn login<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    meta: ClientMeta,
    req: Body<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let reply = state.auth.login(body(req)?, meta).await?;
    let cookie = session_set_cookie(&reply.session_id);
    Ok(([(header::SET_COOKIE, cookie)], Json::<LoginResponse>(reply.body)))
}

pub async fn admin_login<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    meta: ClientMeta,
    req: Body<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let reply = state.auth.admin_login(body(req)?, meta).await?;
    let cookie = session_set_cookie(&reply.session_id);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json::<AdminLoginResponse>(reply.body),
    ))
}

pub async fn forgot_password<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    meta: ClientMeta,
    req: Body<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    Ok(Json(state.auth.forgot_password(body(req)?, meta).await?))
}

pub async fn reset_password<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    meta: ClientMeta,
    req: Body<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    Ok(Json(state.auth.reset_password(body(req)?, meta).await?))
}

pub async fn change_password<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentAccount,
    meta: ClientMeta,
    req: Body<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let reply = state
        .auth
        .change_password(&current.account, body(req)?, meta)
        .await?;
    Ok(Json(reply))
}

/// Idempotent: already revoked or expired credentials are fine, forged ones
/// are not. An empty body is allowed.
pub async fn logout<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    meta: ClientMeta,
    req: Body<LogoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let access = bearer_token(&headers)?;
    let req = req.map(|Json(inner)| inner).unwrap_or_default();
    let reply = state
        .auth
        .logout(access, req, session_cookie(&headers), meta)
        .await?;
    Ok(([(header::SET_COOKIE, session_clear_cookie())], Json(reply)))
}

pub async fn logout_all<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentAccount,
    meta: ClientMeta,
) -> Result<impl IntoResponse, AppError> {
    let reply = state.auth.logout_all(&current.account, meta).await?;
    Ok((
        [(header::SET_COOKIE, session_clear_cookie())],
        Json::<LogoutAllResponse>(reply),
    ))
}

pub async fn refresh<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    meta: ClientMeta,
    req: Body<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    Ok(Json(state.auth.refresh(body(req)?, meta).await?))
}

pub async fn verify<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    req: Body<VerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.verify(body(req)?).await?;
    Ok(Json(json!({})))
}
