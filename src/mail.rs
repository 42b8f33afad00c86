//! Relaying an uploaded file to a list of recipients over SMTP.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

const SUBJECT: &str = "File Attachment";
const BODY: &str = "Please find the attached file.";

/// A validated upload to be forwarded as-is.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Bytes,
}

/// Delivers one message to one recipient.
#[async_trait]
pub trait MailRelay: Send + Sync {
    async fn send(&self, recipient: &str, attachment: &Attachment) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    /// Plain connection without STARTTLS
    pub insecure: bool,
}

pub struct SmtpRelay {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpRelay {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("Invalid sender address: {}", config.from))?;

        let builder = if config.insecure {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        };
        let builder = builder.port(config.port);
        let builder = match (&config.username, &config.password) {
            (Some(u), Some(p)) => builder.credentials(Credentials::new(u.clone(), p.clone())),
            _ => builder,
        };

        info!(
            host = %config.host,
            port = config.port,
            starttls = !config.insecure,
            "Mail relay initialized"
        );
        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl MailRelay for SmtpRelay {
    async fn send(&self, recipient: &str, attachment: &Attachment) -> Result<()> {
        let message = compose(&self.from, recipient, attachment)?;
        self.mailer.send(message).await?;
        Ok(())
    }
}

/// Build the multipart/mixed message carrying `attachment`.
pub fn compose(from: &Mailbox, recipient: &str, attachment: &Attachment) -> Result<Message> {
    let to: Mailbox = recipient
        .parse()
        .with_context(|| format!("Invalid recipient address: {}", recipient))?;
    let content_type = ContentType::parse(&attachment.content_type)
        .with_context(|| format!("Invalid content type: {}", attachment.content_type))?;

    let message = Message::builder()
        .from(from.clone())
        .to(to)
        .subject(SUBJECT)
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(BODY.to_string()))
                .singlepart(
                    MailAttachment::new(attachment.filename.clone())
                        .body(attachment.content.to_vec(), content_type),
                ),
        )?;
    Ok(message)
}

/// Split a comma-separated address list, dropping blanks.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Send `attachment` to each recipient; failures are logged and skipped.
///
/// Returns the number of successful deliveries.
pub async fn relay_to_all(relay: &dyn MailRelay, recipients: &[String], attachment: &Attachment) -> usize {
    let mut delivered = 0;
    for recipient in recipients {
        match relay.send(recipient, attachment).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!(recipient = %recipient, error = %format!("{e:#}"), "Failed to send email"),
        }
    }
    info!(
        filename = %attachment.filename,
        delivered,
        failed = recipients.len() - delivered,
        "Relayed file by email"
    );
    delivered
}
