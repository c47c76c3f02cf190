//! Outbound mail for node down notifications.

use crate::types::MailgunOptions;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Failed to build mail client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Mail request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Mail rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// A plain text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    /// Recipient list, comma separated
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    /// Tell the node's operator it has gone quiet
    pub fn node_down(to: impl Into<String>, callsign: &str, last_seen: DateTime<Utc>) -> Self {
        let body = format!(
            "Hello, your APRS node '{callsign}' appears to be down as of {last_seen}\n\n\
             To see your most recently sent packets, please see:\n\
             http://aprs.fi/?c=raw&call={callsign}"
        );
        Self {
            to: to.into(),
            subject: format!("{callsign} appears to be down"),
            body,
        }
    }
}

/// Mail transport
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;

    fn name(&self) -> &'static str;
}

/// Sends through the Mailgun messages API
pub struct MailgunMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl MailgunMailer {
    pub fn new(options: &MailgunOptions) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(MailError::Client)?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}/messages",
                options.api_base.trim_end_matches('/'),
                options.domain
            ),
            api_key: options.api_key.clone(),
            from: options.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for MailgunMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        let form = [
            ("from", self.from.as_str()),
            ("to", message.to.as_str()),
            ("subject", message.subject.as_str()),
            ("text", message.body.as_str()),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(to = %message.to, response = %body, "Mailgun accepted message");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mailgun"
    }
}

/// Logs messages instead of sending them
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        info!(to = %message.to, subject = %message.subject, "Mail delivery disabled, not sending");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
