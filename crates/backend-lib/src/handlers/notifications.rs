// ============================
// crates/backend-lib/src/handlers/notifications.rs
// ============================
use crate::error::AppError;
use crate::middleware::CurrentAccount;
use crate::storage::Storage;
use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use talent_auth_common::{
    MarkAllReadResponse, MessageResponse, NotificationView, UnreadCountResponse,
};

/// Notifications of the current account, newest first
pub async fn list<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentAccount,
) -> Result<Json<Vec<NotificationView>>, AppError> {
    Ok(Json(state.auth.notifications(current.account.id).await?))
}

pub async fn mark_read<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentAccount,
    Path(id): Path<u64>,
) -> Result<Json<MessageResponse>, AppError> {
    let reply = state
        .auth
        .mark_notification_read(current.account.id, id)
        .await?;
    Ok(Json(reply))
}

pub async fn mark_all_read<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentAccount,
) -> Result<Json<MarkAllReadResponse>, AppError> {
    Ok(Json(
        state
            .auth
            .mark_all_notifications_read(current.account.id)
            .await?,
    ))
}

pub async fn unread_count<S: Storage + Clone>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentAccount,
) -> Result<Json<UnreadCountResponse>, AppError> {
    Ok(Json(state.auth.unread_count(current.account.id).await?))
}
