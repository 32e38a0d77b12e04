use super::{ClientError, NotificationChannel};
use crate::config::NotificationConfig;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// HTML email over SMTP with STARTTLS.
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, ClientError> {
        let recipient = config
            .recipient
            .as_deref()
            .ok_or_else(|| ClientError::Config("no report recipient configured".to_string()))?;

        let from = parse_mailbox(&config.sender_email)?;
        let to = parse_mailbox(recipient)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
            .map_err(|e| ClientError::Config(format!("invalid SMTP server: {e}")))?
            .port(config.smtp_port);

        if let Some(password) = config.sender_password.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.credentials(Credentials::new(
                config.sender_email.clone(),
                password.to_string(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, ClientError> {
    address
        .parse()
        .map_err(|e| ClientError::Config(format!("invalid email address '{address}': {e}")))
}

#[async_trait]
impl NotificationChannel for EmailNotifier {
    async fn send(&self, subject: &str, html_body: &str) -> Result<(), ClientError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| ClientError::Email(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| ClientError::Email(e.to_string()))?;

        log::info!("Email sent to {}", self.to);
        Ok(())
    }
}

/// Used when no recipient is configured: the subject is logged and the body
/// dropped.
pub struct LogNotifier;

#[async_trait]
impl NotificationChannel for LogNotifier {
    async fn send(&self, subject: &str, html_body: &str) -> Result<(), ClientError> {
        log::info!("Notification (not emailed): {subject} ({} bytes)", html_body.len());
        Ok(())
    }
}
