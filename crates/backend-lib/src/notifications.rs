// ============================
// crates/backend-lib/src/notifications.rs
// ============================
//! User-facing notifications raised by security events.
use crate::models::{Account, ClientMeta, NewNotification, Notification, NotificationKind};
use crate::storage::Storage;
use crate::time::TimeProvider;
use talent_auth_common::NotificationView;
use tracing::error;

/// Creates notifications. Like the audit trail, failures are logged only.
#[derive(Clone)]
pub struct Notifier<S> {
    storage: S,
    clock: TimeProvider,
}

fn with_origin(mut message: String, meta: &ClientMeta) -> String {
    if let Some(ip) = meta.ip_address.as_deref() {
        message.push_str(&format!(" from IP: {ip}"));
    }
    message
}

impl<S: Storage> Notifier<S> {
    pub fn new(storage: S, clock: TimeProvider) -> Self {
        Self { storage, clock }
    }

    pub async fn notify(
        &self,
        account_id: u64,
        kind: NotificationKind,
        title: &str,
        message: String,
        link: Option<String>,
    ) {
        let new = NewNotification {
            account_id,
            title: title.to_string(),
            message,
            notification_type: kind,
            link,
            created_at: self.clock.now(),
        };
        if let Err(e) = self.storage.insert_notification(new).await {
            error!(error = %e, account_id, title, "failed to create notification");
        }
    }

    pub async fn login(&self, account: &Account, meta: &ClientMeta) {
        let mut message = with_origin("Successful login to your account".to_string(), meta);
        if let Some(agent) = meta.user_agent.as_deref() {
            message.push_str(&format!(" using {agent}"));
        }
        self.notify(account.id, NotificationKind::Security, "Login Successful", message, None)
            .await;
    }

    pub async fn password_changed(&self, account: &Account, meta: &ClientMeta) {
        let message = with_origin("Your password has been changed successfully".to_string(), meta);
        self.notify(account.id, NotificationKind::Security, "Password Changed", message, None)
            .await;
    }

    pub async fn password_reset(&self, account: &Account, meta: &ClientMeta) {
        let message = with_origin("Your password has been reset".to_string(), meta);
        self.notify(account.id, NotificationKind::Security, "Password Reset", message, None)
            .await;
    }

    /// Tell every active staff member about a new account
    pub async fn new_registration(&self, account: &Account) {
        let staff = match self.storage.staff_accounts().await {
            Ok(staff) => staff,
            Err(e) => {
                error!(error = %e, "could not load staff accounts");
                return;
            }
        };
        let who = account.username.as_deref().unwrap_or(&account.email);
        for admin in staff.iter().filter(|a| a.id != account.id) {
            self.notify(
                admin.id,
                NotificationKind::System,
                "New User Registration",
                format!("A new user, {who}, has registered."),
                None,
            )
            .await;
        }
    }
}

/// Wire view of a stored notification
pub fn view(notification: &Notification) -> NotificationView {
    NotificationView {
        id: notification.id,
        title: notification.title.clone(),
        message: notification.message.clone(),
        notification_type: notification.notification_type.as_str().to_string(),
        read: notification.read,
        link: notification.link.clone(),
        created_at: notification.created_at.to_rfc3339(),
        user_id: notification.account_id,
    }
}
