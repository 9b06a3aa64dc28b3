//! Domain types shared by the fetcher, aggregator and classifier.
//!
//! - `Message`: one retrieved post, reduced to what activity accounting needs
//! - `Source`: a channel or thread that can hold messages
//! - `Member`: one entry of the guild roster
//! - `ActivityThreshold`: the single cut line used for a whole run

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of conversation streams that are audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Top-level text channel
    Channel,
    /// Thread that is currently open
    OpenThread,
    /// Thread that has been archived
    ArchivedThread,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Channel => "channel",
            SourceKind::OpenThread => "open_thread",
            SourceKind::ArchivedThread => "archived_thread",
        }
    }

    pub fn is_thread(&self) -> bool {
        !matches!(self, SourceKind::Channel)
    }
}

/// Which set of sub-threads to enumerate under a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Open,
    Archived,
}

/// A channel or thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    /// When the thread was archived. Only set for archived threads.
    pub archived_at: Option<DateTime<Utc>>,
}

impl Source {
    pub fn channel(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: SourceKind::Channel,
            archived_at: None,
        }
    }

    pub fn open_thread(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: SourceKind::OpenThread,
            archived_at: None,
        }
    }

    pub fn archived_thread(
        id: impl Into<String>,
        name: impl Into<String>,
        archived_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: SourceKind::ArchivedThread,
            archived_at: Some(archived_at),
        }
    }

    /// Label used in logs, e.g. `#general` or `thread:release-notes`.
    pub fn label(&self) -> String {
        match self.kind {
            SourceKind::Channel => format!("#{}", self.name),
            SourceKind::OpenThread | SourceKind::ArchivedThread => format!("thread:{}", self.name),
        }
    }
}

/// A message as seen by the history fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Snowflake id, ordered by creation.
    pub id: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    /// Posted by a bot, a system account or a webhook.
    pub automated: bool,
}

/// A guild roster entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: String,
    pub display_name: String,
    pub automated: bool,
}

impl Member {
    pub fn human(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            automated: false,
        }
    }

    pub fn bot(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            automated: true,
        }
    }
}

/// The instant separating active from inactive members.
///
/// Computed once when a run starts. It doubles as the lower bound for
/// history traversal, so long runs never move the cut line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ActivityThreshold(DateTime<Utc>);

impl ActivityThreshold {
    /// `inactivity_days` before `now`, or `None` when that falls outside
    /// the representable date range.
    pub fn from_window(now: DateTime<Utc>, inactivity_days: u32) -> Option<Self> {
        Duration::try_days(i64::from(inactivity_days))
            .and_then(|window| now.checked_sub_signed(window))
            .map(Self)
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    /// Strictly before the threshold. Equal counts as inside the window.
    pub fn is_before(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp < self.0
    }
}
