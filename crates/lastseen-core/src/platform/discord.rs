//! Discord REST implementation of `ChatPlatform`.
//!
//! Talks to API v10 with a bot token. Only text channels are audited; voice,
//! category and forum channels are dropped during enumeration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::model::{Member, Message, Source, ThreadState};

use super::{call_with_backoff, ChatPlatform, PlatformError, ARCHIVED_THREAD_PAGE_SIZE};

pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";

/// Discord channel type for guild text channels.
const GUILD_TEXT: u8 = 0;

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Discord REST client.
///
/// Active threads are listed per guild, so the list is fetched once per
/// client and filtered by parent for every channel.
pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    attempt_timeout: Duration,
    /// channel id -> guild id, filled while enumerating channels
    channel_guilds: Mutex<HashMap<String, String>>,
    /// guild id -> active threads
    active_threads: Mutex<HashMap<String, Arc<Vec<DiscordChannel>>>>,
}

impl DiscordClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            channel_guilds: Mutex::new(HashMap::new()),
            active_threads: Mutex::new(HashMap::new()),
        }
    }

    /// Deadline for each HTTP attempt. Rate-limit waits are not counted.
    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T>(&self, path: &str, params: &[(&str, String)]) -> Result<T, PlatformError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = self.url(path);
        debug!("GET {} {:?}", path, params);

        let response = call_with_backoff(
            || {
                self.http
                    .get(&url)
                    .header("Authorization", format!("Bot {}", self.token))
                    .query(params)
            },
            self.attempt_timeout,
        )
        .await?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| PlatformError::Decode(format!("{}: {}", path, e)))
    }

    async fn guild_of(&self, channel_id: &str) -> Result<String, PlatformError> {
        if let Some(guild_id) = self.channel_guilds.lock().await.get(channel_id) {
            return Ok(guild_id.clone());
        }

        let channel: DiscordChannel = self.get_json(&format!("/channels/{}", channel_id), &[]).await?;
        let guild_id = channel.guild_id.ok_or_else(|| {
            PlatformError::Decode(format!("channel {} has no guild_id", channel_id))
        })?;

        self.channel_guilds
            .lock()
            .await
            .insert(channel_id.to_string(), guild_id.clone());
        Ok(guild_id)
    }

    /// The guild's active threads, requested on first use only.
    async fn active_threads_of(&self, guild_id: &str) -> Result<Arc<Vec<DiscordChannel>>, PlatformError> {
        // Held across the request so concurrent channels share one fetch.
        let mut cache = self.active_threads.lock().await;
        if let Some(threads) = cache.get(guild_id) {
            return Ok(threads.clone());
        }

        let payload: DiscordThreadList = self
            .get_json(&format!("/guilds/{}/threads/active", guild_id), &[])
            .await?;
        let threads = Arc::new(payload.threads);
        cache.insert(guild_id.to_string(), threads.clone());
        Ok(threads)
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn enumerate_sources(&self, group_id: &str) -> Result<Vec<Source>, PlatformError> {
        let channels: Vec<DiscordChannel> = self
            .get_json(&format!("/guilds/{}/channels", group_id), &[])
            .await?;

        {
            let mut guilds = self.channel_guilds.lock().await;
            for channel in &channels {
                let guild_id = channel.guild_id.as_deref().unwrap_or(group_id);
                guilds.insert(channel.id.clone(), guild_id.to_string());
            }
        }

        Ok(channels
            .into_iter()
            .filter(|c| c.kind == GUILD_TEXT)
            .map(|c| {
                let name = c.display_name();
                Source::channel(c.id, name)
            })
            .collect())
    }

    async fn enumerate_sub_sources(
        &self,
        source_id: &str,
        state: ThreadState,
        older_than: Option<DateTime<Utc>>,
    ) -> Result<Vec<Source>, PlatformError> {
        match state {
            ThreadState::Open => {
                let guild_id = self.guild_of(source_id).await?;
                let threads = self.active_threads_of(&guild_id).await?;

                Ok(threads
                    .iter()
                    .filter(|t| t.parent_id.as_deref() == Some(source_id))
                    .map(|t| Source::open_thread(t.id.clone(), t.display_name()))
                    .collect())
            }
            ThreadState::Archived => {
                let mut params = vec![("limit", ARCHIVED_THREAD_PAGE_SIZE.to_string())];
                if let Some(before) = older_than {
                    params.push(("before", before.to_rfc3339_opts(SecondsFormat::Millis, true)));
                }

                let payload: DiscordThreadList = self
                    .get_json(
                        &format!("/channels/{}/threads/archived/public", source_id),
                        &params,
                    )
                    .await?;

                payload
                    .threads
                    .into_iter()
                    .map(|t| {
                        let archived_at = t
                            .thread_metadata
                            .as_ref()
                            .map(|m| m.archive_timestamp)
                            .ok_or_else(|| {
                                PlatformError::Decode(format!(
                                    "archived thread {} has no thread_metadata",
                                    t.id
                                ))
                            })?;
                        let name = t.display_name();
                        Ok(Source::archived_thread(t.id, name, archived_at))
                    })
                    .collect()
            }
        }
    }

    async fn fetch_page(
        &self,
        source_id: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<Vec<Message>, PlatformError> {
        let mut params = vec![("limit", page_size.to_string())];
        if let Some(before) = cursor {
            params.push(("before", before.to_string()));
        }

        let messages: Vec<DiscordMessage> = self
            .get_json(&format!("/channels/{}/messages", source_id), &params)
            .await?;

        Ok(messages.into_iter().map(Message::from).collect())
    }

    async fn enumerate_members(
        &self,
        group_id: &str,
        page_cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Vec<Member>, PlatformError> {
        let mut params = vec![("limit", page_size.to_string())];
        if let Some(after) = page_cursor {
            params.push(("after", after.to_string()));
        }

        let members: Vec<DiscordMember> = self
            .get_json(&format!("/guilds/{}/members", group_id), &params)
            .await?;

        Ok(members.into_iter().map(Member::from).collect())
    }
}

// --- Discord API Response Types ---

#[derive(Debug, Clone, Deserialize)]
struct DiscordChannel {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    name: Option<String>,
    guild_id: Option<String>,
    parent_id: Option<String>,
    thread_metadata: Option<DiscordThreadMetadata>,
}

impl DiscordChannel {
    fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordThreadMetadata {
    archive_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordThreadList {
    threads: Vec<DiscordChannel>,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    #[serde(default)]
    bot: bool,
    #[serde(default)]
    system: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordMessage {
    id: String,
    author: DiscordUser,
    timestamp: DateTime<Utc>,
    webhook_id: Option<String>,
}

impl From<DiscordMessage> for Message {
    fn from(m: DiscordMessage) -> Self {
        Message {
            automated: m.author.bot || m.author.system || m.webhook_id.is_some(),
            id: m.id,
            author_id: m.author.id,
            created_at: m.timestamp,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordMember {
    user: DiscordUser,
}

impl From<DiscordMember> for Member {
    fn from(m: DiscordMember) -> Self {
        Member {
            automated: m.user.bot || m.user.system,
            id: m.user.id,
            display_name: m.user.username,
        }
    }
}
