//! Remote chat platform seam.
//!
//! This module provides:
//! - `ChatPlatform` trait the audit pipeline talks to
//! - `PlatformError` for everything that can go wrong on the wire
//! - `call_with_backoff` for HTTP 429 handling shared by clients
//!
//! The only production implementation is `DiscordClient`. Tests use the
//! in-crate `FakePlatform`.

mod discord;

#[cfg(test)]
pub(crate) mod fake;

pub use discord::{DiscordClient, DEFAULT_API_BASE_URL};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::model::{Member, Message, Source, ThreadState};

/// Largest message page the API hands out per call.
pub const MESSAGE_PAGE_SIZE: usize = 100;

/// Largest member page the API hands out per call.
pub const MEMBER_PAGE_SIZE: usize = 1000;

/// Page size used when listing archived threads.
pub const ARCHIVED_THREAD_PAGE_SIZE: usize = 50;

const MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// Longest single wait between rate-limited attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Errors raised by a `ChatPlatform`.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rate limited after {0} retries")]
    RateLimited(u32),

    #[error("access forbidden (403). Check the bot's channel permissions")]
    Forbidden,

    #[error("unauthorized (401). Check the bot token")]
    Unauthorized,

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("request exceeded its {0:?} deadline")]
    Timeout(Duration),
}

/// The remote conversation platform.
///
/// Implementations must return message pages newest-first.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Top-level channels of a guild.
    async fn enumerate_sources(&self, group_id: &str) -> Result<Vec<Source>, PlatformError>;

    /// Threads under a channel.
    ///
    /// For `ThreadState::Archived` this returns one page of at most
    /// `ARCHIVED_THREAD_PAGE_SIZE` threads archived strictly before
    /// `older_than` (or the newest ones when unset), newest-archived first.
    async fn enumerate_sub_sources(
        &self,
        source_id: &str,
        state: ThreadState,
        older_than: Option<DateTime<Utc>>,
    ) -> Result<Vec<Source>, PlatformError>;

    /// One page of messages strictly older than `cursor`, newest first.
    async fn fetch_page(
        &self,
        source_id: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<Vec<Message>, PlatformError>;

    /// One page of members with ids after `page_cursor`.
    async fn enumerate_members(
        &self,
        group_id: &str,
        page_cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Vec<Member>, PlatformError>;
}

/// HTTP request helper that waits out HTTP 429 responses.
///
/// Only rate limiting is retried. Every other failure is returned as-is so
/// the caller decides its scope. `attempt_timeout` bounds each attempt on
/// its own; time spent waiting out a rate limit is not counted against it.
pub async fn call_with_backoff<F>(
    mut builder_fn: F,
    attempt_timeout: Duration,
) -> Result<reqwest::Response, PlatformError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut retries = 0;
    let mut delay = Duration::from_secs(1);

    loop {
        let response = timeout(attempt_timeout, builder_fn().send())
            .await
            .map_err(|_| PlatformError::Timeout(attempt_timeout))??;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        match status.as_u16() {
            429 => {
                if retries >= MAX_RATE_LIMIT_RETRIES {
                    return Err(PlatformError::RateLimited(retries));
                }

                let wait = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after)
                    .unwrap_or(delay);

                warn!("Rate limited, waiting {:?}", wait);
                sleep(wait).await;

                retries += 1;
                delay = std::cmp::min(delay * 2, MAX_BACKOFF);
            }
            401 => return Err(PlatformError::Unauthorized),
            403 => return Err(PlatformError::Forbidden),
            code => {
                return Err(PlatformError::Status {
                    status: code,
                    body: response.text().await.unwrap_or_default(),
                })
            }
        }
    }
}

/// Retry-After may be fractional seconds. Capped at `MAX_BACKOFF`.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok()?;
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    let wait = Duration::try_from_secs_f64(secs).unwrap_or(MAX_BACKOFF);
    Some(wait.min(MAX_BACKOFF))
}
