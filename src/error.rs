//! Error types shared by the sync engine, the cache and the HTTP surface.

use thiserror::Error;

/// Errors that can occur while listing, loading, summarizing or sending mail.
///
/// The first five variants mirror how failures propagate: configuration and
/// protocol errors abort the request, parse and generation errors are
/// degraded by their callers, transport errors always reach the user.
#[derive(Debug, Error)]
pub enum Error {
    /// Required mailbox or transport credentials are absent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Opening or talking to the remote mailbox failed.
    #[error("mailbox protocol error: {0}")]
    Protocol(String),

    /// A single message source could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The text-generation service failed or returned an unusable reply.
    #[error("generation error: {0}")]
    Generation(String),

    /// Handing a message to the mail transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Short machine-readable name used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "ConfigurationError",
            Error::Protocol(_) => "ProtocolError",
            Error::Parse(_) => "ParseError",
            Error::Generation(_) => "GenerationError",
            Error::Transport(_) => "TransportError",
            Error::Database(_) => "DatabaseError",
            Error::Serde(_) => "SerializationError",
            Error::NotFound(_) => "NotFound",
            Error::InvalidRequest(_) => "InvalidRequest",
        }
    }

    pub(crate) fn protocol(context: &str, err: impl std::fmt::Display) -> Self {
        Error::Protocol(format!("{context}: {err}"))
    }
}

impl From<async_imap::error::Error> for Error {
    fn from(err: async_imap::error::Error) -> Self {
        Error::Protocol(err.to_string())
    }
}

/// Result type alias using the crate error.
pub type Result<T> = std::result::Result<T, Error>;
