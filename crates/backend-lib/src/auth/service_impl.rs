// ============================
// crates/backend-lib/src/auth/service_impl.rs
// ============================
//! Default [`AuthService`]: wires the guard, the reset-token issuer and the
//! lifecycle manager to the HTTP contract. Holds no state of its own.
use crate::auth::lifecycle::LifecycleManager;
use crate::auth::password::hash_in_background;
use crate::auth::reset_token::ResetTokenIssuer;
use crate::auth::service::{AuthService, LoginReply, PurgeReport};
use crate::config::Settings;
use crate::error::{AppError, FieldErrors};
use crate::mailer::{Mailer, OutgoingMail};
use crate::metrics::{RESET_COMPLETED, RESET_TOKEN_ISSUED};
use crate::models::{Account, AccountId, ClientMeta, NewAccount, SecurityEvent};
use crate::notifications::view;
use crate::storage::{Storage, StoreError};
use crate::time::TimeProvider;
use crate::validation::{validate_email, validate_registration, REQUIRED};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use metrics::counter;
use serde_json::json;
use std::sync::Arc;
use talent_auth_common::{
    AdminLoginResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
    LoginResponse, LogoutAllResponse, LogoutRequest, MarkAllReadResponse, MessageResponse,
    NotificationView, RefreshRequest, RefreshResponse, RegisterRequest, RegisterResponse,
    ResetPasswordRequest, UnreadCountResponse, VerifyRequest,
};
use tracing::{error, info, warn};

const INVALID_RESET: &str = "Invalid or expired token";

pub struct DefaultAuth<S> {
    lifecycle: LifecycleManager<S>,
    issuer: ResetTokenIssuer<S>,
    storage: S,
    mailer: Arc<dyn Mailer>,
    settings: Arc<Settings>,
    clock: TimeProvider,
}

impl<S: Storage + Clone> DefaultAuth<S> {
    pub fn new(
        lifecycle: LifecycleManager<S>,
        issuer: ResetTokenIssuer<S>,
        storage: S,
        mailer: Arc<dyn Mailer>,
        settings: Arc<Settings>,
        clock: TimeProvider,
    ) -> Self {
        Self {
            lifecycle,
            issuer,
            storage,
            mailer,
            settings,
            clock,
        }
    }

    pub fn lifecycle(&self) -> &LifecycleManager<S> {
        &self.lifecycle
    }

    fn credentials<'a>(req: &'a LoginRequest) -> Result<(&'a str, &'a str), AppError> {
        match (req.identifier(), req.password.as_deref().filter(|p| !p.is_empty())) {
            (Some(identifier), Some(password)) => Ok((identifier, password)),
            (identifier, password) => {
                let mut errors = FieldErrors::new();
                if identifier.is_none() {
                    errors.insert("email".to_string(), vec![REQUIRED.to_string()]);
                }
                if password.is_none() {
                    errors.insert("password".to_string(), vec![REQUIRED.to_string()]);
                }
                Err(AppError::Validation(errors))
            }
        }
    }

    fn reset_link(&self, account: &Account, token: &str) -> String {
        let uid = URL_SAFE_NO_PAD.encode(account.id.to_string());
        format!(
            "{}/reset-password?uid={uid}&token={token}",
            self.settings.frontend_url.trim_end_matches('/')
        )
    }

    /// The account named by a reset link's `uid`, if it is still usable
    async fn reset_account(&self, uid: &str) -> Result<Option<Account>, AppError> {
        let id = URL_SAFE_NO_PAD
            .decode(uid.trim_end_matches('='))
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|s| s.parse::<AccountId>().ok());
        let Some(id) = id else {
            return Ok(None);
        };
        Ok(self.storage.account(id).await?.filter(|a| a.is_active))
    }
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl<S: Storage + Clone> AuthService for DefaultAuth<S> {
    async fn register(
        &self,
        req: RegisterRequest,
        meta: ClientMeta,
    ) -> Result<RegisterResponse, AppError> {
        let valid = validate_registration(&req, &self.settings.password_requirements)
            .map_err(AppError::Validation)?;

        if self.storage.account_by_email(&valid.email).await?.is_some() {
            return Err(AppError::field("email", "user with this email already exists."));
        }
        if let Some(username) = valid.username.as_deref() {
            if self.storage.account_by_username(username).await?.is_some() {
                return Err(AppError::field(
                    "username",
                    "A user with that username already exists.",
                ));
            }
        }

        let password_hash = hash_in_background(valid.password, self.settings.password_hash_cost)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let account = self
            .storage
            .create_account(NewAccount {
                email: valid.email,
                username: valid.username,
                name: valid.name,
                password_hash,
                is_staff: false,
                date_joined: self.clock.now(),
            })
            .await
            .map_err(|e| match e {
                // lost a race with a concurrent registration
                StoreError::Conflict(_) => {
                    AppError::field("email", "user with this email already exists.")
                }
                other => other.into(),
            })?;

        let token = self.lifecycle.issue_access(&account).await?;
        self.lifecycle
            .audit()
            .record(
                SecurityEvent::Registration,
                Some(account.id),
                Some(&account.email),
                &meta,
                json!({}),
            )
            .await;
        self.lifecycle.notifier().new_registration(&account).await;
        info!(account_id = account.id, "account registered");

        Ok(RegisterResponse {
            id: account.id,
            email: account.email,
            name: account.name,
            token,
        })
    }

    async fn login(
        &self,
        req: LoginRequest,
        meta: ClientMeta,
    ) -> Result<LoginReply<LoginResponse>, AppError> {
        let (identifier, password) = Self::credentials(&req)?;
        let outcome = self.lifecycle.login(identifier, password, &meta).await?;

        Ok(LoginReply {
            session_id: outcome.session.id().to_string(),
            body: LoginResponse {
                token: outcome.tokens.access,
                refresh: outcome.tokens.refresh,
                expires_in: outcome.tokens.expires_in,
                user: outcome.account.summary(),
            },
        })
    }

    async fn admin_login(
        &self,
        req: LoginRequest,
        meta: ClientMeta,
    ) -> Result<LoginReply<AdminLoginResponse>, AppError> {
        let (identifier, password) = Self::credentials(&req)?;
        let outcome = self.lifecycle.login_staff(identifier, password, &meta).await?;

        Ok(LoginReply {
            session_id: outcome.session.id().to_string(),
            body: AdminLoginResponse {
                id: outcome.account.id,
                email: outcome.account.email,
                name: outcome.account.name,
                role: "admin".to_string(),
                token: outcome.tokens.access,
                refresh: outcome.tokens.refresh,
                expires_in: outcome.tokens.expires_in,
            },
        })
    }

    async fn forgot_password(
        &self,
        req: ForgotPasswordRequest,
        meta: ClientMeta,
    ) -> Result<MessageResponse, AppError> {
        let Some(email) = required(req.email) else {
            return Err(AppError::field("email", "Email is required"));
        };
        let email = email.trim().to_lowercase();
        if validate_email(&email).is_err() {
            return Err(AppError::field("email", "Invalid email format"));
        }

        let account = self
            .storage
            .account_by_email(&email)
            .await?
            .ok_or_else(|| AppError::NotFound("User with this email does not exist".to_string()))?;
        if !account.is_active {
            return Err(AppError::field("email", "Account is inactive"));
        }

        let token = match self.issuer.issue(&account, &meta).await {
            Ok(token) => token,
            Err(StoreError::Conflict(_)) => {
                warn!(account_id = account.id, "concurrent password reset request");
                return Err(AppError::Conflict(
                    "A reset link was already sent. Please use the token already sent."
                        .to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let link = self.reset_link(&account, &token);
        let mail = OutgoingMail::password_reset(&account.email, &self.settings.mail_from, &link);
        if let Err(e) = self.mailer.send(mail).await {
            error!(error = %e, account_id = account.id, "password reset mail failed");
            // a token nobody received must not stay usable
            if let Some(record) = self.issuer.record(&token).await? {
                self.issuer.invalidate(&record).await?;
            }
            return Err(AppError::Internal(e.to_string()));
        }

        self.lifecycle
            .audit()
            .record(
                SecurityEvent::PasswordResetRequested,
                Some(account.id),
                Some(&account.email),
                &meta,
                json!({}),
            )
            .await;
        counter!(RESET_TOKEN_ISSUED).increment(1);
        Ok(MessageResponse::new("Password reset email sent"))
    }

    async fn reset_password(
        &self,
        req: ResetPasswordRequest,
        meta: ClientMeta,
    ) -> Result<MessageResponse, AppError> {
        let (Some(uid), Some(token), Some(new_password)) = (
            required(req.uid),
            required(req.token),
            req.new_password.filter(|p| !p.is_empty()),
        ) else {
            return Err(AppError::BadRequest(
                "UID, token, and new password are required".to_string(),
            ));
        };
        let invalid = || AppError::BadRequest(INVALID_RESET.to_string());

        let account = self.reset_account(uid.trim()).await?.ok_or_else(invalid)?;
        let token = token.trim();
        if !self.issuer.validate(&account, token).await {
            warn!(account_id = account.id, "password reset with invalid token");
            return Err(invalid());
        }
        self.lifecycle.check_new_password(&account, &new_password).await?;

        let record = self.issuer.record(token).await?.ok_or_else(invalid)?;
        if !self.issuer.invalidate(&record).await? {
            return Err(invalid());
        }

        let update = self.lifecycle.set_password(account, &new_password).await?;
        self.lifecycle
            .audit()
            .record(
                SecurityEvent::PasswordReset,
                Some(update.account.id),
                Some(&update.account.email),
                &meta,
                json!({ "credentials_revoked": update.credentials_revoked }),
            )
            .await;
        self.lifecycle
            .notifier()
            .password_reset(&update.account, &meta)
            .await;
        counter!(RESET_COMPLETED).increment(1);
        Ok(MessageResponse::new("Password reset successfully"))
    }

    async fn change_password(
        &self,
        account: &Account,
        req: ChangePasswordRequest,
        meta: ClientMeta,
    ) -> Result<MessageResponse, AppError> {
        let (Some(old), Some(new)) = (
            req.old_password.filter(|p| !p.is_empty()),
            req.new_password.filter(|p| !p.is_empty()),
        ) else {
            return Err(AppError::BadRequest(
                "Old password and new password are required".to_string(),
            ));
        };
        self.lifecycle
            .change_password(account.id, &old, &new, &meta)
            .await?;
        Ok(MessageResponse::new(
            "Password changed successfully. Please login again.",
        ))
    }

    async fn logout(
        &self,
        access: Option<String>,
        req: LogoutRequest,
        session_id: Option<String>,
        meta: ClientMeta,
    ) -> Result<MessageResponse, AppError> {
        let refresh = required(req.refresh);
        if access.is_none() && refresh.is_none() && session_id.is_none() {
            return Err(AppError::Auth(
                "Authentication credentials were not provided.".to_string(),
            ));
        }
        self.lifecycle
            .logout(
                access.as_deref(),
                refresh.as_deref(),
                session_id.as_deref(),
                &meta,
            )
            .await?;
        Ok(MessageResponse::new("Successfully logged out."))
    }

    async fn logout_all(
        &self,
        account: &Account,
        meta: ClientMeta,
    ) -> Result<LogoutAllResponse, AppError> {
        let terminated = self.lifecycle.logout_all(account, &meta).await?;
        Ok(LogoutAllResponse {
            message: format!(
                "Successfully logged out from all devices. {terminated} sessions terminated."
            ),
            sessions_terminated: terminated,
        })
    }

    async fn refresh(
        &self,
        req: RefreshRequest,
        meta: ClientMeta,
    ) -> Result<RefreshResponse, AppError> {
        let refresh = required(req.refresh).ok_or_else(|| AppError::field("refresh", REQUIRED))?;
        let access = self.lifecycle.refresh(refresh.trim(), &meta).await?;
        Ok(RefreshResponse { access })
    }

    async fn verify(&self, req: VerifyRequest) -> Result<(), AppError> {
        let token = required(req.token).ok_or_else(|| AppError::field("token", REQUIRED))?;
        self.lifecycle.verify(token.trim()).await.map(|_| ())
    }

    async fn authenticate(&self, token: &str) -> Result<Account, AppError> {
        self.lifecycle.validate_request_credential(token).await
    }

    async fn authenticate_session(&self, session_id: &str) -> Result<Account, AppError> {
        self.lifecycle.validate_session(session_id).await
    }

    async fn notifications(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<NotificationView>, AppError> {
        let notifications = self.storage.notifications(account_id).await?;
        Ok(notifications.iter().map(view).collect())
    }

    async fn mark_notification_read(
        &self,
        account_id: AccountId,
        notification_id: u64,
    ) -> Result<MessageResponse, AppError> {
        if !self
            .storage
            .mark_notification_read(account_id, notification_id)
            .await?
        {
            return Err(AppError::NotFound("Notification not found.".to_string()));
        }
        Ok(MessageResponse::new("Notification marked as read"))
    }

    async fn mark_all_notifications_read(
        &self,
        account_id: AccountId,
    ) -> Result<MarkAllReadResponse, AppError> {
        let marked = self.storage.mark_all_notifications_read(account_id).await?;
        info!(account_id, marked, "notifications marked as read");
        Ok(MarkAllReadResponse {
            message: format!("{marked} notifications marked as read"),
            marked,
        })
    }

    async fn unread_count(&self, account_id: AccountId) -> Result<UnreadCountResponse, AppError> {
        let unread_count = self.storage.unread_notifications(account_id).await?;
        Ok(UnreadCountResponse { unread_count })
    }

    async fn purge_expired(&self) -> Result<PurgeReport, AppError> {
        let (credentials, sessions) = self.lifecycle.purge_expired().await?;
        Ok(PurgeReport {
            credentials,
            sessions,
        })
    }
}
