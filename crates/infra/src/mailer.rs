//! Outbound mail: how confirmation codes leave the system.
//!
//! Delivery is synchronous from the caller's point of view: a sign-up only
//! succeeds once `deliver` returned `Ok`.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::info;

/// A plain-text message to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The message could not be built (bad address, header).
    #[error("invalid message: {0}")]
    Message(String),
    /// The transport refused or failed to send.
    #[error("mail transport failed: {0}")]
    Transport(String),
}

/// Mail delivery boundary.
#[async_trait]
pub trait MailSink: Send + Sync {
    async fn deliver(&self, message: &MailMessage) -> Result<(), DeliveryError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Log sink
// ─────────────────────────────────────────────────────────────────────────────

/// Writes messages to the tracing log instead of sending them (development).
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl MailSink for LogMailer {
    async fn deliver(&self, message: &MailMessage) -> Result<(), DeliveryError> {
        info!(
            from = %self.from,
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "mail delivered to log"
        );
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Recording sink
// ─────────────────────────────────────────────────────────────────────────────

/// Keeps every delivered message in memory; used by tests to read codes back.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    outbox: Mutex<Vec<MailMessage>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent deliveries fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<MailMessage> {
        self.outbox.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Most recent message sent to `to`.
    pub fn last_to(&self, to: &str) -> Option<MailMessage> {
        self.messages().into_iter().rev().find(|m| m.to == to)
    }
}

#[async_trait]
impl MailSink for RecordingMailer {
    async fn deliver(&self, message: &MailMessage) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport("recording mailer set to fail".into()));
        }
        self.outbox
            .lock()
            .map_err(|_| DeliveryError::Transport("outbox lock poisoned".into()))?
            .push(message.clone());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SMTP sink
// ─────────────────────────────────────────────────────────────────────────────

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[cfg(feature = "smtp")]
pub use smtp::SmtpMailer;

#[cfg(feature = "smtp")]
mod smtp {
    use async_trait::async_trait;
    use lettre::message::Mailbox;
    use lettre::transport::smtp::authentication::Credentials;
    use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
    use tracing::instrument;

    use super::{DeliveryError, MailMessage, MailSink, SmtpSettings};

    /// STARTTLS relay over lettre's tokio transport.
    pub struct SmtpMailer {
        from: Mailbox,
        transport: AsyncSmtpTransport<Tokio1Executor>,
    }

    impl SmtpMailer {
        pub fn new(settings: &SmtpSettings) -> Result<Self, DeliveryError> {
            let from: Mailbox = settings
                .from
                .parse()
                .map_err(|e: lettre::address::AddressError| DeliveryError::Message(e.to_string()))?;

            let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| DeliveryError::Transport(e.to_string()))?
                .port(settings.port);
            if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
                builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
            }

            Ok(Self {
                from,
                transport: builder.build(),
            })
        }
    }

    #[async_trait]
    impl MailSink for SmtpMailer {
        #[instrument(skip(self, message), fields(to = %message.to), err)]
        async fn deliver(&self, message: &MailMessage) -> Result<(), DeliveryError> {
            let to: Mailbox = message
                .to
                .parse()
                .map_err(|e: lettre::address::AddressError| DeliveryError::Message(e.to_string()))?;

            let email = Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject(message.subject.clone())
                .body(message.body.clone())
                .map_err(|e| DeliveryError::Message(e.to_string()))?;

            self.transport
                .send(email)
                .await
                .map_err(|e| DeliveryError::Transport(e.to_string()))?;
            Ok(())
        }
    }
}

/// Build the confirmation message for `to`.
pub fn confirmation_message(to: &str, code: &str) -> MailMessage {
    MailMessage {
        to: to.to_string(),
        subject: "Confirmation code".to_string(),
        body: format!("Your confirmation code: {code}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_mailer_keeps_messages_in_order() {
        let mailer = RecordingMailer::new();
        mailer.deliver(&confirmation_message("a@x.com", "one")).await.unwrap();
        mailer.deliver(&confirmation_message("b@x.com", "two")).await.unwrap();
        mailer.deliver(&confirmation_message("a@x.com", "three")).await.unwrap();

        assert_eq!(mailer.messages().len(), 3);
        let last = mailer.last_to("a@x.com").unwrap();
        assert!(last.body.ends_with("three"));
    }

    #[tokio::test]
    async fn failing_mailer_records_nothing() {
        let mailer = RecordingMailer::new();
        mailer.set_failing(true);

        let err = mailer.deliver(&confirmation_message("a@x.com", "x")).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
        assert!(mailer.messages().is_empty());
    }
}
