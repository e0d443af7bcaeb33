use std::{fmt, sync::Arc};

use async_trait::async_trait;
use aws_sdk_ses::types::{Body, Content, Destination, Message};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::{AppConfig, MailTransport},
    error::AppError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub name: String,
    pub address: String,
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.address)
        } else {
            f.write_str("\"")?;
            for ch in self.name.chars() {
                if matches!(ch, '"' | '\\') {
                    f.write_str("\\")?;
                }
                write!(f, "{ch}")?;
            }
            write!(f, "\" <{}>", self.address)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: Mailbox,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// What the transport hands back for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailReceipt {
    pub message_id: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<MailReceipt, AppError>;
}

/// Development transport: nothing leaves the process, the message is logged.
#[derive(Clone, Default)]
pub struct LogMailer;

impl LogMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<MailReceipt, AppError> {
        let message_id = format!("<{}@plann.local>", Uuid::new_v4());
        info!(
            from = %email.from,
            to = %email.to,
            subject = %email.subject,
            message_id = %message_id,
            "mail captured by log transport"
        );
        Ok(MailReceipt { message_id })
    }
}

#[derive(Clone)]
pub struct SesMailer {
    client: aws_sdk_ses::Client,
}

impl SesMailer {
    pub fn new(client: aws_sdk_ses::Client) -> Self {
        Self { client }
    }

    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_ses::Client::new(&config))
    }
}

#[async_trait]
impl Mailer for SesMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<MailReceipt, AppError> {
        let subject = Content::builder()
            .data(&email.subject)
            .charset("UTF-8")
            .build()
            .map_err(|err| AppError::Mail(format!("failed to build subject: {err}")))?;
        let html = Content::builder()
            .data(&email.html)
            .charset("UTF-8")
            .build()
            .map_err(|err| AppError::Mail(format!("failed to build body: {err}")))?;

        let message = Message::builder()
            .subject(subject)
            .body(Body::builder().html(html).build())
            .build();
        let destination = Destination::builder().to_addresses(&email.to).build();

        let output = self
            .client
            .send_email()
            .source(email.from.to_string())
            .destination(destination)
            .message(message)
            .send()
            .await
            .map_err(|err| AppError::Mail(format!("failed to send email: {err}")))?;

        Ok(MailReceipt {
            message_id: output.message_id().to_string(),
        })
    }
}

pub async fn mailer_from_config(config: &AppConfig) -> Arc<dyn Mailer> {
    match config.mail_transport {
        MailTransport::Log => Arc::new(LogMailer::new()),
        MailTransport::Ses => Arc::new(SesMailer::from_env().await),
    }
}
