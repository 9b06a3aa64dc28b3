//! Paginated history traversal.
//!
//! Walks a source backward in time one page at a time and stops as soon as
//! the messages fall outside the window of interest, instead of paging to
//! the start of history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Message, Source};
use crate::platform::{ChatPlatform, PlatformError, MESSAGE_PAGE_SIZE};

/// How far the fetcher trusts the server's page ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageOrdering {
    /// Pages are strictly newest-to-oldest. The first message older than the
    /// lower bound ends the traversal.
    #[default]
    NewestFirst,
    /// No ordering guarantee. Every page is scanned in full and another page
    /// is requested only if this one still had an in-window message.
    Unordered,
}

/// Knobs for a single history traversal.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub page_size: usize,
    pub ordering: PageOrdering,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: MESSAGE_PAGE_SIZE,
            ordering: PageOrdering::NewestFirst,
        }
    }
}

/// Fetch every human-authored message in `source` created at or after
/// `lower_bound`, newest first.
///
/// Any page failure aborts the traversal and drops what was collected for
/// this source; the caller decides whether to skip it.
pub async fn fetch_history(
    platform: &dyn ChatPlatform,
    source: &Source,
    lower_bound: DateTime<Utc>,
    options: &FetchOptions,
) -> Result<Vec<Message>, PlatformError> {
    let mut collected = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        debug!("{}: fetching page before {:?}", source.label(), cursor);

        let page = platform
            .fetch_page(&source.id, options.page_size, cursor.as_deref())
            .await?;
        pages += 1;

        let Some(oldest) = page.last() else {
            break;
        };
        let next_cursor = oldest.id.clone();

        let reached_bound = match options.ordering {
            PageOrdering::NewestFirst => take_until_bound(page, lower_bound, &mut collected),
            PageOrdering::Unordered => !take_in_window(page, lower_bound, &mut collected),
        };

        if reached_bound {
            debug!("{}: reached lower bound {}", source.label(), lower_bound);
            break;
        }

        // Position is independent of the authorship filter.
        cursor = Some(next_cursor);
    }

    debug!(
        "{}: {} messages in window across {} pages",
        source.label(),
        collected.len(),
        pages
    );
    Ok(collected)
}

/// Collect messages until the first one older than `lower_bound`.
///
/// Returns `true` when that message was found.
fn take_until_bound(
    page: Vec<Message>,
    lower_bound: DateTime<Utc>,
    collected: &mut Vec<Message>,
) -> bool {
    for message in page {
        if message.created_at < lower_bound {
            return true;
        }
        if !message.automated {
            collected.push(message);
        }
    }
    false
}

/// Collect every in-window message of the page.
///
/// Returns `true` when at least one message of the page was in the window.
fn take_in_window(
    page: Vec<Message>,
    lower_bound: DateTime<Utc>,
    collected: &mut Vec<Message>,
) -> bool {
    let mut any_in_window = false;
    for message in page {
        if message.created_at < lower_bound {
            continue;
        }
        any_in_window = true;
        if !message.automated {
            collected.push(message);
        }
    }
    any_in_window
}
