//! Audit configuration schema and loading.
//!
//! The audit is configured via a YAML file (`config.yaml` in the working
//! directory by default). Files ending in `.toml` are parsed as TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::history::{FetchOptions, PageOrdering};
use crate::platform::{DEFAULT_API_BASE_URL, MESSAGE_PAGE_SIZE};

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "LASTSEEN_CONFIG";

/// Overrides `token` so it can stay out of the file.
pub const TOKEN_ENV: &str = "LASTSEEN_TOKEN";

/// A century.
pub const MAX_INACTIVITY_DAYS: u32 = 36_500;

/// Settings for one audit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Bot token, sent as `Authorization: Bot <token>`.
    #[serde(default)]
    pub token: String,

    /// Guild to audit.
    pub guild_id: String,

    /// Inactive and never-posted members are written here.
    #[serde(default = "default_csv_output")]
    pub csv_output: PathBuf,

    /// Active members are written here when `debug` is on.
    #[serde(default = "default_active_csv_output")]
    pub active_csv_output: PathBuf,

    /// Days without a message before a member counts as inactive.
    #[serde(default = "default_inactivity_days")]
    pub inactivity_days: u32,

    /// Verbose logging plus the active-members report.
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub page_ordering: PageOrdering,

    /// Channels traversed at once. 1 means strictly sequential.
    #[serde(default = "default_max_concurrent_sources")]
    pub max_concurrent_sources: usize,

    /// Deadline for a single HTTP attempt. Rate-limit waits do not count.
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_csv_output() -> PathBuf {
    PathBuf::from("inactive_users.csv")
}

fn default_active_csv_output() -> PathBuf {
    PathBuf::from("active_users.csv")
}

fn default_inactivity_days() -> u32 {
    30
}

fn default_max_concurrent_sources() -> usize {
    1
}

fn default_page_timeout_secs() -> u64 {
    30
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

impl AuditConfig {
    /// Resolve the config path: explicit argument, then `LASTSEEN_CONFIG`,
    /// then `config.yaml`.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Load, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::parse(&contents, path)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.token = token;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self> {
        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        if is_toml {
            Ok(toml::from_str(contents)?)
        } else {
            Ok(serde_yaml::from_str(contents)?)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            bail!("Missing bot token. Set `token` in the config or {}", TOKEN_ENV);
        }
        if self.guild_id.trim().is_empty() {
            bail!("Missing `guild_id`");
        }
        if self.inactivity_days == 0 {
            bail!("`inactivity_days` must be at least 1");
        }
        if self.inactivity_days > MAX_INACTIVITY_DAYS {
            bail!(
                "`inactivity_days` must be at most {} (got {})",
                MAX_INACTIVITY_DAYS,
                self.inactivity_days
            );
        }
        if self.max_concurrent_sources == 0 {
            bail!("`max_concurrent_sources` must be at least 1");
        }
        if self.page_timeout_secs == 0 {
            bail!("`page_timeout_secs` must be at least 1");
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(anyhow!("`api_base_url` must be an http(s) URL: {}", self.api_base_url));
        }
        Ok(())
    }

    /// History traversal options derived from this config.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            page_size: MESSAGE_PAGE_SIZE,
            ordering: self.page_ordering,
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    /// Path of the active report, only when it should be written.
    pub fn active_report_path(&self) -> Option<&Path> {
        self.debug.then_some(self.active_csv_output.as_path())
    }

    /// Copy safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.token.is_empty() {
            copy.token = "<redacted>".to_string();
        }
        copy
    }
}
