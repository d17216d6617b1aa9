// ============================
// crates/backend-lib/src/mailer.rs
// ============================
//! Outbound mail.
//!
//! The server never talks SMTP itself. Delivery goes through [`Mailer`]; the
//! default transport only logs, and [`MemoryMailer`] keeps an outbox that
//! tests can read back.
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// A rendered message ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    pub fn password_reset(to: &str, from: &str, link: &str) -> Self {
        Self {
            to: to.to_string(),
            from: from.to_string(),
            subject: "Password Reset Request".to_string(),
            body: format!(
                "We received a request to reset your password.\n\n\
                 Use the following link to choose a new one:\n{link}\n\n\
                 If you did not request this, you can ignore this email."
            ),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Writes mail to the log instead of delivering it
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        info!(to = %mail.to, subject = %mail.subject, "mail queued (log transport)");
        debug!(body = %mail.body, "mail body");
        Ok(())
    }
}

/// Keeps every message in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    outbox: Arc<Mutex<Vec<OutgoingMail>>>,
    failing: Arc<Mutex<bool>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, oldest first
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.outbox.lock().clone()
    }

    /// Make subsequent sends fail
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if *self.failing.lock() {
            return Err(MailError::Delivery(format!("refused mail to {}", mail.to)));
        }
        self.outbox.lock().push(mail);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_mailer_keeps_outbox() {
        let mailer = MemoryMailer::new();
        let mail = OutgoingMail::password_reset("u@example.com", "noreply@x", "http://x/r");
        mailer.send(mail.clone()).await.unwrap();
        assert_eq!(mailer.sent(), vec![mail]);

        mailer.set_failing(true);
        let again = OutgoingMail::password_reset("u@example.com", "noreply@x", "http://x/r");
        assert!(mailer.send(again).await.is_err());
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn reset_mail_carries_link() {
        let mail = OutgoingMail::password_reset("u@example.com", "noreply@x", "http://x/r?t=1");
        assert!(mail.body.contains("http://x/r?t=1"));
        LogMailer.send(mail).await.unwrap();
    }
}
