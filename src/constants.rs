//! Tuning constants for fetching, hydration and generation.
//!
//! Centralizes magic numbers to make them discoverable.

/// Fetch depth multipliers per filter combination.
/// Filters reduce the hit rate per fetched message, so the window grows with them.
pub const SENDER_DEPTH_MULTIPLIER: u32 = 60;
pub const IMPORTANT_DEPTH_MULTIPLIER: u32 = 30;
pub const UNREAD_DEPTH_MULTIPLIER: u32 = 8;
pub const DEFAULT_DEPTH_MULTIPLIER: u32 = 4;

/// Maximum snippet length in characters.
pub const SNIPPET_MAX_CHARS: usize = 160;

/// IMAP items fetched per candidate during listing: headers, a short text
/// preview and the MIME structure for attachment names.
pub const ENVELOPE_FETCH_QUERY: &str =
    "(UID FLAGS INTERNALDATE BODYSTRUCTURE BODY.PEEK[HEADER] BODY.PEEK[TEXT]<0.400>)";

/// IMAP items fetched when hydrating a single message.
pub const SOURCE_FETCH_QUERY: &str = "(UID BODY.PEEK[])";

/// Number of most-recent messages fed to the summarizer.
pub const SUMMARY_MESSAGE_COUNT: usize = 4;

/// Per-message body truncation before summarization, in characters.
pub const SUMMARY_BODY_MAX_CHARS: usize = 1200;

/// Per-message body truncation for the draft prompt, in characters.
pub const DRAFT_BODY_MAX_CHARS: usize = 2000;

/// Messages loaded alongside a thread when the caller gives no limit.
pub const DEFAULT_THREAD_MESSAGE_LIMIT: usize = 50;

/// Key used for threads whose subject is empty after normalization.
pub const NO_SUBJECT_KEY: &str = "(no subject)";

/// Retries for calls to the generation service and the ingest sink.
pub const OUTBOUND_MAX_RETRIES: u32 = 2;

/// Initial retry delay for outbound calls in milliseconds.
pub const OUTBOUND_RETRY_DELAY_MS: u64 = 500;

/// Maximum retry delay for outbound calls in seconds.
pub const OUTBOUND_MAX_RETRY_DELAY_SECS: u64 = 10;

/// SQLite connection pool size.
pub const CACHE_POOL_SIZE: u32 = 8;

/// Capacity of the in-process summary hot cache.
pub const SUMMARY_HOT_CACHE_CAPACITY: u64 = 512;
