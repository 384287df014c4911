use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use crate::config::Config;
use crate::error::{Error, Result};

/// A reply or new message handed to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Comma-separated recipients
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Overrides the account's from address when set
    pub from: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
}

/// Hands messages to a mail relay and reports the Message-ID it was sent under.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<String>;
}

pub struct SmtpClient {
    /// `None` when no SMTP password is configured
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_email: String,
    from_name: Option<String>,
}

impl SmtpClient {
    pub fn new(config: &Config, password: Option<String>) -> Result<Self> {
        let transport = match password {
            Some(password) => {
                let creds = Credentials::new(config.account.username().to_string(), password);
                let transport =
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.account.smtp.server)
                        .map_err(|e| {
                            Error::Configuration(format!("Failed to create SMTP transport: {e}"))
                        })?
                        .port(config.account.smtp.port)
                        .credentials(creds)
                        .authentication(vec![Mechanism::Plain, Mechanism::Login])
                        .build();
                Some(transport)
            }
            None => None,
        };

        Ok(Self {
            transport,
            from_email: config.account.email.clone(),
            from_name: config.account.display_name.clone(),
        })
    }

    fn default_from(&self) -> String {
        match self.from_name {
            Some(ref name) => format!("{} <{}>", name, self.from_email),
            None => self.from_email.clone(),
        }
    }
}

#[async_trait]
impl MailTransport for SmtpClient {
    async fn send(&self, outgoing: &OutgoingMessage) -> Result<String> {
        let transport = self.transport.as_ref().ok_or_else(|| {
            Error::Configuration(
                "SMTP password not configured; run `mailbrief setup-password --smtp`".to_string(),
            )
        })?;

        let from = outgoing.from.clone().unwrap_or_else(|| self.default_from());
        let (message, message_id) = build_message(&from, outgoing)?;

        transport
            .send(message)
            .await
            .map_err(|e| Error::Transport(format!("Failed to send email: {e}")))?;

        tracing::info!("Email sent to {} as {}", outgoing.to, message_id);
        Ok(message_id)
    }
}

/// Build the RFC 822 message with a fresh Message-ID.
pub fn build_message(from: &str, outgoing: &OutgoingMessage) -> Result<(lettre::Message, String)> {
    let from_mailbox = from
        .parse::<Mailbox>()
        .map_err(|e| Error::InvalidRequest(format!("Invalid from address '{from}': {e}")))?;

    let mut builder = lettre::Message::builder()
        .from(from_mailbox)
        .subject(&outgoing.subject)
        .message_id(None);

    // Handle comma-separated lists and trailing commas
    let mut recipients = 0;
    for to_addr in outgoing.to.split(',') {
        let to_addr = to_addr.trim();
        if !to_addr.is_empty() {
            let to_mailbox = to_addr.parse::<Mailbox>().map_err(|e| {
                Error::InvalidRequest(format!("Invalid recipient address '{to_addr}': {e}"))
            })?;
            builder = builder.to(to_mailbox);
            recipients += 1;
        }
    }
    if recipients == 0 {
        return Err(Error::InvalidRequest("no recipient given".to_string()));
    }

    if let Some(ref reply_to) = outgoing.in_reply_to {
        builder = builder.in_reply_to(angle(reply_to));
    }

    if !outgoing.references.is_empty() {
        let references = outgoing
            .references
            .iter()
            .map(String::as_str)
            .map(angle)
            .collect::<Vec<_>>()
            .join(" ");
        builder = builder.references(references);
    }

    let message = builder
        .header(ContentType::TEXT_PLAIN)
        .body(outgoing.body.clone())
        .map_err(|e| Error::InvalidRequest(format!("Failed to build email message: {e}")))?;

    let message_id = message
        .headers()
        .get_raw("Message-ID")
        .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>').to_string())
        .unwrap_or_default();

    Ok((message, message_id))
}

/// Stored ids have no angle brackets; headers need them.
fn angle(id: &str) -> String {
    let id = id.trim();
    if id.starts_with('<') {
        id.to_string()
    } else {
        format!("<{id}>")
    }
}
