// ============================
// crates/backend-lib/src/auth/service.rs
// ============================
use crate::error::AppError;
use crate::models::{Account, AccountId, ClientMeta};
use async_trait::async_trait;
use talent_auth_common::{
    AdminLoginResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
    LoginResponse, LogoutAllResponse, LogoutRequest, MarkAllReadResponse, MessageResponse,
    NotificationView, RefreshRequest, RefreshResponse, RegisterRequest, RegisterResponse,
    ResetPasswordRequest, UnreadCountResponse, VerifyRequest,
};

/// Login body plus the cookie session opened with it
#[derive(Debug, Clone)]
pub struct LoginReply<T> {
    pub body: T,
    pub session_id: String,
}

/// Counts from a maintenance sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub credentials: usize,
    pub sessions: usize,
}

/// The auth gateway: one call per endpoint
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn register(
        &self,
        req: RegisterRequest,
        meta: ClientMeta,
    ) -> Result<RegisterResponse, AppError>;

    async fn login(
        &self,
        req: LoginRequest,
        meta: ClientMeta,
    ) -> Result<LoginReply<LoginResponse>, AppError>;

    async fn admin_login(
        &self,
        req: LoginRequest,
        meta: ClientMeta,
    ) -> Result<LoginReply<AdminLoginResponse>, AppError>;

    async fn forgot_password(
        &self,
        req: ForgotPasswordRequest,
        meta: ClientMeta,
    ) -> Result<MessageResponse, AppError>;

    async fn reset_password(
        &self,
        req: ResetPasswordRequest,
        meta: ClientMeta,
    ) -> Result<MessageResponse, AppError>;

    async fn change_password(
        &self,
        account: &Account,
        req: ChangePasswordRequest,
        meta: ClientMeta,
    ) -> Result<MessageResponse, AppError>;

    /// `access` comes from the `Authorization` header, `session_id` from the
    /// cookie. None of them has to be live.
    async fn logout(
        &self,
        access: Option<String>,
        req: LogoutRequest,
        session_id: Option<String>,
        meta: ClientMeta,
    ) -> Result<MessageResponse, AppError>;

    async fn logout_all(
        &self,
        account: &Account,
        meta: ClientMeta,
    ) -> Result<LogoutAllResponse, AppError>;

    async fn refresh(
        &self,
        req: RefreshRequest,
        meta: ClientMeta,
    ) -> Result<RefreshResponse, AppError>;

    async fn verify(&self, req: VerifyRequest) -> Result<(), AppError>;

    /// Account behind an access credential
    async fn authenticate(&self, token: &str) -> Result<Account, AppError>;

    /// Account behind a cookie session
    async fn authenticate_session(&self, session_id: &str) -> Result<Account, AppError>;

    async fn notifications(&self, account_id: AccountId)
        -> Result<Vec<NotificationView>, AppError>;

    async fn mark_notification_read(
        &self,
        account_id: AccountId,
        notification_id: u64,
    ) -> Result<MessageResponse, AppError>;

    async fn mark_all_notifications_read(
        &self,
        account_id: AccountId,
    ) -> Result<MarkAllReadResponse, AppError>;

    async fn unread_count(&self, account_id: AccountId) -> Result<UnreadCountResponse, AppError>;

    /// Drop expired credential records and idle sessions
    async fn purge_expired(&self) -> Result<PurgeReport, AppError>;
}
