//! In-memory `ChatPlatform` for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::model::{Member, Message, Source, SourceKind, ThreadState};

use super::{ChatPlatform, PlatformError, ARCHIVED_THREAD_PAGE_SIZE};

/// Fixed "now" so tests don't depend on the wall clock.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

pub fn human(id: &str, author: &str, at: DateTime<Utc>) -> Message {
    Message {
        id: id.to_string(),
        author_id: author.to_string(),
        created_at: at,
        automated: false,
    }
}

pub fn bot(id: &str, author: &str, at: DateTime<Utc>) -> Message {
    Message {
        automated: true,
        ..human(id, author, at)
    }
}

#[derive(Default)]
pub struct FakePlatform {
    sources: Vec<Source>,
    threads: HashMap<String, Vec<Source>>,
    /// Full history per source, newest first.
    history: HashMap<String, Vec<Message>>,
    members: Vec<Member>,
    fail_sources: bool,
    fail_members: bool,
    fail_history: HashSet<String>,
    /// Source id -> zero-based page index that fails.
    fail_on_page: HashMap<String, usize>,
    fail_threads: HashSet<String>,
    page_calls: Mutex<Vec<(String, Option<String>)>>,
    member_calls: Mutex<usize>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, id: &str, name: &str, history: Vec<Message>) -> Self {
        self.sources.push(Source::channel(id, name));
        self.history.insert(id.to_string(), history);
        self
    }

    pub fn with_thread(mut self, parent: &str, thread: Source, history: Vec<Message>) -> Self {
        self.history.insert(thread.id.clone(), history);
        self.threads.entry(parent.to_string()).or_default().push(thread);
        self
    }

    pub fn with_members(mut self, members: Vec<Member>) -> Self {
        self.members = members;
        self
    }

    pub fn failing_sources(mut self) -> Self {
        self.fail_sources = true;
        self
    }

    pub fn failing_members(mut self) -> Self {
        self.fail_members = true;
        self
    }

    pub fn failing_history(mut self, source_id: &str) -> Self {
        self.fail_history.insert(source_id.to_string());
        self
    }

    pub fn failing_on_page(mut self, source_id: &str, page: usize) -> Self {
        self.fail_on_page.insert(source_id.to_string(), page);
        self
    }

    pub fn failing_threads(mut self, source_id: &str) -> Self {
        self.fail_threads.insert(source_id.to_string());
        self
    }

    /// Every `fetch_page` call as `(source_id, cursor)`.
    pub fn page_calls(&self) -> Vec<(String, Option<String>)> {
        self.page_calls.lock().unwrap().clone()
    }

    pub fn page_calls_for(&self, source_id: &str) -> usize {
        self.page_calls()
            .iter()
            .filter(|(id, _)| id == source_id)
            .count()
    }

    pub fn member_calls(&self) -> usize {
        *self.member_calls.lock().unwrap()
    }
}

fn unavailable(what: &str) -> PlatformError {
    PlatformError::Status {
        status: 500,
        body: format!("{} unavailable", what),
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn enumerate_sources(&self, _group_id: &str) -> Result<Vec<Source>, PlatformError> {
        if self.fail_sources {
            return Err(unavailable("channels"));
        }
        Ok(self.sources.clone())
    }

    async fn enumerate_sub_sources(
        &self,
        source_id: &str,
        state: ThreadState,
        older_than: Option<DateTime<Utc>>,
    ) -> Result<Vec<Source>, PlatformError> {
        if self.fail_threads.contains(source_id) {
            return Err(PlatformError::Forbidden);
        }

        let threads = self.threads.get(source_id).cloned().unwrap_or_default();
        match state {
            ThreadState::Open => Ok(threads
                .into_iter()
                .filter(|t| t.kind == SourceKind::OpenThread)
                .collect()),
            ThreadState::Archived => {
                let mut archived: Vec<Source> = threads
                    .into_iter()
                    .filter(|t| t.kind == SourceKind::ArchivedThread)
                    .filter(|t| match (older_than, t.archived_at) {
                        (Some(before), Some(at)) => at < before,
                        _ => true,
                    })
                    .collect();
                archived.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
                archived.truncate(ARCHIVED_THREAD_PAGE_SIZE);
                Ok(archived)
            }
        }
    }

    async fn fetch_page(
        &self,
        source_id: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<Vec<Message>, PlatformError> {
        let page_index = self.page_calls_for(source_id);
        self.page_calls
            .lock()
            .unwrap()
            .push((source_id.to_string(), cursor.map(str::to_string)));

        if self.fail_history.contains(source_id)
            || self.fail_on_page.get(source_id) == Some(&page_index)
        {
            return Err(unavailable("history"));
        }

        let history = self.history.get(source_id).cloned().unwrap_or_default();
        let start = match cursor {
            None => 0,
            Some(c) => match history.iter().position(|m| m.id == c) {
                Some(pos) => pos + 1,
                None => history.len(),
            },
        };

        Ok(history.into_iter().skip(start).take(page_size).collect())
    }

    async fn enumerate_members(
        &self,
        _group_id: &str,
        page_cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Vec<Member>, PlatformError> {
        *self.member_calls.lock().unwrap() += 1;
        if self.fail_members {
            return Err(unavailable("members"));
        }

        let start = match page_cursor {
            None => 0,
            Some(c) => match self.members.iter().position(|m| m.id == c) {
                Some(pos) => pos + 1,
                None => self.members.len(),
            },
        };

        Ok(self.members.iter().skip(start).take(page_size).cloned().collect())
    }
}
