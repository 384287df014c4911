//! IMAP implementation of the mailbox session: connect, examine, fetch, release.

use std::sync::Arc;

use async_imap::types::{Fetch, Flag};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use super::{MailboxConnector, MailboxSession, MailboxStatus, UidRange};
use crate::config::Config;
use crate::constants::{ENVELOPE_FETCH_QUERY, SOURCE_FETCH_QUERY};
use crate::error::{Error, Result};
use crate::mail::parser::{attachments_from_bodystructure, parse_flags_from_imap};
use crate::mail::types::Envelope;

type ImapSession = async_imap::Session<Compat<TlsStream<TcpStream>>>;

/// Connection settings for the configured account's mailbox.
#[derive(Clone)]
pub struct ImapConnector {
    server: String,
    port: u16,
    username: String,
    password: Option<String>,
    mailbox: String,
}

impl ImapConnector {
    pub fn new(config: &Config, password: Option<String>) -> Self {
        Self {
            server: config.account.imap.server.clone(),
            port: config.account.imap.port,
            username: config.account.username().to_string(),
            password,
            mailbox: config.account.mailbox.clone(),
        }
    }

    async fn connect(&self, password: &str) -> Result<ImapSession> {
        let addr = format!("{}:{}", self.server, self.port);

        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::protocol(&format!("Failed to connect to {addr}"), e))?;

        let tls = tls_connector()?;
        let server_name = rustls::pki_types::ServerName::try_from(self.server.clone())
            .map_err(|e| Error::Configuration(format!("invalid IMAP server name: {e}")))?;
        let tls_stream = tls
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::protocol("TLS handshake failed", e))?;

        // async-imap speaks futures-io
        let client = async_imap::Client::new(tls_stream.compat());

        let session = client
            .login(&self.username, password)
            .await
            .map_err(|(e, _)| Error::protocol("Login failed", e))?;

        tracing::info!("Connected to IMAP server {}", self.server);
        Ok(session)
    }
}

impl std::fmt::Debug for ImapConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnector")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("mailbox", &self.mailbox)
            .finish_non_exhaustive()
    }
}

fn tls_connector() -> Result<TlsConnector> {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    // lettre and reqwest may enable other providers; pin ring explicitly
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::protocol("TLS setup failed", e))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn open(&self) -> Result<Box<dyn MailboxSession>> {
        let password = self.password.as_deref().ok_or_else(|| {
            Error::Configuration(
                "IMAP password not configured; run `mailbrief setup-password` or set MAILBRIEF_IMAP_PASSWORD"
                    .to_string(),
            )
        })?;

        let mut session = self.connect(password).await?;

        // EXAMINE keeps \Seen untouched while we peek
        let mailbox = match session.examine(&self.mailbox).await {
            Ok(mailbox) => mailbox,
            Err(e) => {
                if let Err(logout) = session.logout().await {
                    tracing::debug!("Logout after failed EXAMINE: {}", logout);
                }
                return Err(Error::protocol(
                    &format!("Failed to open mailbox '{}'", self.mailbox),
                    e,
                ));
            }
        };

        let status = MailboxStatus {
            exists: mailbox.exists,
            uid_next: mailbox.uid_next,
        };
        tracing::debug!(
            mailbox = %self.mailbox,
            exists = status.exists,
            uid_next = ?status.uid_next,
            "Mailbox opened"
        );

        Ok(Box::new(ImapMailboxSession {
            session,
            status,
            mailbox: self.mailbox.clone(),
        }))
    }
}

struct ImapMailboxSession {
    session: ImapSession,
    status: MailboxStatus,
    mailbox: String,
}

#[async_trait]
impl MailboxSession for ImapMailboxSession {
    async fn status(&mut self) -> Result<MailboxStatus> {
        Ok(self.status)
    }

    async fn fetch_envelopes<'a>(
        &'a mut self,
        range: UidRange,
    ) -> Result<BoxStream<'a, Result<Envelope>>> {
        let messages = self
            .session
            .uid_fetch(range.sequence_set(), ENVELOPE_FETCH_QUERY)
            .await
            .map_err(|e| Error::protocol("Failed to fetch messages", e))?;

        Ok(messages
            .map(|result| {
                result
                    .map_err(|e| Error::protocol("Failed to fetch message", e))
                    .and_then(|fetch| envelope_from_fetch(&fetch))
            })
            .boxed())
    }

    async fn fetch_source(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        let mut messages = self
            .session
            .uid_fetch(uid.to_string(), SOURCE_FETCH_QUERY)
            .await
            .map_err(|e| Error::protocol("Failed to fetch message source", e))?;

        // Drain the whole response so the connection stays in sync
        let mut source = None;
        while let Some(result) = messages.next().await {
            let fetch = result.map_err(|e| Error::protocol("Failed to fetch message", e))?;
            if source.is_none()
                && fetch.uid == Some(uid)
                && let Some(body) = fetch.body()
            {
                source = Some(body.to_vec());
            }
        }

        Ok(source)
    }

    async fn close(mut self: Box<Self>) {
        if let Err(e) = self.session.close().await {
            tracing::warn!("Failed to close mailbox '{}': {}", self.mailbox, e);
        }
        if let Err(e) = self.session.logout().await {
            tracing::warn!("IMAP logout failed: {}", e);
        }
        tracing::debug!("Mailbox '{}' released", self.mailbox);
    }
}

/// Turn one FETCH response into an envelope: headers, a blank line, then the text preview.
fn envelope_from_fetch(fetch: &Fetch) -> Result<Envelope> {
    let uid = fetch
        .uid
        .ok_or_else(|| Error::Parse("FETCH response without UID".to_string()))?;

    let flag_vec: Vec<Flag> = fetch.flags().collect();
    let (flags, labels) = parse_flags_from_imap(&flag_vec);

    let header_bytes = fetch
        .header()
        .ok_or_else(|| Error::Parse(format!("uid {uid}: no header block")))?;
    let body_preview = fetch.text().unwrap_or(&[]);

    let mut raw = Vec::with_capacity(header_bytes.len() + 4 + body_preview.len());
    raw.extend_from_slice(header_bytes);
    raw.extend_from_slice(b"\r\n\r\n");
    raw.extend_from_slice(body_preview);

    Ok(Envelope {
        uid,
        flags,
        labels,
        internal_date: fetch.internal_date().map(|d| d.to_utc()),
        attachments: fetch
            .bodystructure()
            .map(attachments_from_bodystructure)
            .unwrap_or_default(),
        raw,
    })
}
