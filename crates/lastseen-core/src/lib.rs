//! lastseen core - find the members of a Discord guild who stopped talking.
//!
//! This crate provides:
//!
//! - **History**: paginated, early-terminating traversal of channel and thread history
//! - **Activity**: per-author "last seen" aggregation across every source
//! - **Classify / Report**: active, inactive and never-posted members written as CSV
//! - **Platform**: the `ChatPlatform` seam and its Discord REST client
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lastseen_core::{audit, AuditConfig, AuditPlan, DiscordClient};
//!
//! let config = AuditConfig::load("config.yaml".as_ref())?;
//! let client = DiscordClient::new(reqwest::Client::new(), &config.api_base_url, &config.token);
//! let plan = AuditPlan::from_config(&config, chrono::Utc::now())?;
//!
//! let outcome = audit::run(Arc::new(client), &plan, |_| {}).await?;
//! audit::write_csv_reports(&config, &outcome.results)?;
//! ```

pub mod activity;
pub mod audit;
pub mod classify;
pub mod config;
pub mod history;
pub mod model;
pub mod platform;
pub mod report;

pub use activity::ActivityRecord;
pub use audit::{AuditOutcome, AuditPlan, AuditSummary, SourceOutcome, SourceProgress};
pub use classify::{classify, Activity, ClassificationCounts, ClassifiedMember};
pub use config::AuditConfig;
pub use history::{fetch_history, FetchOptions, PageOrdering};
pub use model::{ActivityThreshold, Member, Message, Source, SourceKind, ThreadState};
pub use platform::{ChatPlatform, DiscordClient, PlatformError};
pub use report::{CsvSink, Report, ReportCounts, ReportRow, ReportSink};

use std::time::Duration;

use anyhow::Result;

/// HTTP client shared by every request of a run.
pub fn build_http_client(request_timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("lastseen/", env!("CARGO_PKG_VERSION")))
        .timeout(request_timeout)
        .build()?;
    Ok(client)
}

/// Discord client configured from an audit config.
pub fn discord_client(config: &AuditConfig) -> Result<DiscordClient> {
    let http = build_http_client(config.attempt_timeout())?;
    Ok(DiscordClient::new(http, &config.api_base_url, &config.token)
        .with_attempt_timeout(config.attempt_timeout()))
}
