//! Exponential-backoff retry for outbound calls (generation service, ingest sink).
//!
//! The mailbox fetch deliberately does not go through here: its only retry is
//! the single sender-filter pass in `mail::imap::fetch`.

use std::future::Future;
use std::time::Duration;

use crate::constants::{
    OUTBOUND_MAX_RETRIES, OUTBOUND_MAX_RETRY_DELAY_SECS, OUTBOUND_RETRY_DELAY_MS,
};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
        }
    }

    /// Policy for HTTP collaborators.
    pub fn outbound() -> Self {
        Self::new(
            OUTBOUND_MAX_RETRIES,
            Duration::from_millis(OUTBOUND_RETRY_DELAY_MS),
            Duration::from_secs(OUTBOUND_MAX_RETRY_DELAY_SECS),
        )
    }
}

/// Run `operation` until it succeeds or `config.max_retries` retries are spent.
///
/// Delays double after each failure, capped at `config.max_delay`. The last
/// error is returned when every attempt fails.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempts += 1;
                if attempts > config.max_retries {
                    return Err(e);
                }

                tracing::warn!(
                    operation = label,
                    attempt = attempts,
                    max_attempts = config.max_retries + 1,
                    "{}; retrying in {:?}",
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(config.max_delay);
            }
        }
    }
}
