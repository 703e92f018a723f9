//! Outbound email seam.
//!
//! Delivery is owned by an external service; this crate only hands it a
//! recipient, a display name and a one-time link.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Which flow a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailKind {
    EmailConfirmation,
    PasswordReset,
    OrganizationInvite,
}

impl MailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailKind::EmailConfirmation => "email_confirmation",
            MailKind::PasswordReset => "password_reset",
            MailKind::OrganizationInvite => "organization_invite",
        }
    }
}

/// A message carrying a single-use link.
#[derive(Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub kind: MailKind,
    pub to: String,
    pub display_name: String,
    /// Contains a raw secret. Never log it.
    pub link: String,
}

impl std::fmt::Debug for MailMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailMessage")
            .field("kind", &self.kind)
            .field("to", &self.to)
            .field("display_name", &self.display_name)
            .field("link", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// Mailer that records the send in the log and drops the message.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        info!(kind = message.kind.as_str(), to = %message.to, "mail dispatched");
        Ok(())
    }
}
