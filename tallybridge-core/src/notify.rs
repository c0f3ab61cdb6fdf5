//! Outbound mail and SMS delivery.
//!
//! The reconciler treats delivery as a fire-and-forget capability behind the
//! [`Mailer`] trait; a failed send is logged and reported as a flag, never
//! as an error. [`SmtpMailer`] is the production implementation.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::secret::Secret;

/// Fixed timeout for mail delivery.
const MAIL_TIMEOUT: Duration = Duration::from_secs(15);

/// Error type for delivery operations.
#[derive(Debug, Error)]
pub enum MailError {
    /// A sender or recipient address failed to parse.
    #[error("invalid address: {message}")]
    Address { message: String },

    /// Building or sending the message failed.
    #[error("delivery failed: {message}")]
    Delivery { message: String },

    /// The sender has no SMS channel.
    #[error("sms delivery is not supported by this sender")]
    SmsUnsupported,
}

/// Capability for outbound notifications.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send an HTML email to one or more recipients.
    async fn send_email(
        &self,
        recipients: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<(), MailError>;

    /// Send an SMS. Senders without an SMS channel report unsupported.
    async fn send_sms(
        &self,
        _phone: &str,
        _text: &str,
        _tag: Option<&str>,
    ) -> Result<(), MailError> {
        Err(MailError::SmsUnsupported)
    }
}

/// SMTP connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: Secret,
    pub from: String,
    #[serde(default = "default_starttls")]
    pub starttls: bool,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_starttls() -> bool {
    true
}

/// SMTP-backed mailer.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<SmtpTransport, MailError> {
        let credentials = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose().to_string(),
        );

        let builder = if self.config.starttls {
            SmtpTransport::starttls_relay(&self.config.host)
        } else {
            SmtpTransport::relay(&self.config.host)
        }
        .map_err(|e| MailError::Delivery {
            message: format!("failed to create SMTP transport: {}", e),
        })?;

        Ok(builder
            .port(self.config.port)
            .credentials(credentials)
            .timeout(Some(MAIL_TIMEOUT))
            .build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_email(
        &self,
        recipients: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<(), MailError> {
        tracing::debug!(subject = %subject, "Sending report email");

        let from = self
            .config
            .from
            .parse()
            .map_err(|e| MailError::Address {
                message: format!("invalid from address: {}", e),
            })?;

        let mut builder = Message::builder().from(from).subject(subject);
        for recipient in recipients {
            let to = recipient.parse().map_err(|e| MailError::Address {
                message: format!("invalid recipient {}: {}", recipient, e),
            })?;
            builder = builder.to(to);
        }

        let message = builder
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| MailError::Delivery {
                message: format!("failed to build message: {}", e),
            })?;

        let transport = self.transport()?;

        // SmtpTransport is blocking; run the send on the blocking pool.
        tokio::task::spawn_blocking(move || {
            transport.send(&message).map_err(|e| MailError::Delivery {
                message: format!("failed to send email: {}", e),
            })
        })
        .await
        .map_err(|e| MailError::Delivery {
            message: format!("send task failed: {}", e),
        })??;

        tracing::info!("Report email sent");
        Ok(())
    }
}
