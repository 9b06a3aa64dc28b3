//! The audit pipeline.
//!
//! `Init → EnumerateSources → (per source: FetchHistory → Aggregate) →
//! EnumerateMembers → Classify → Report`. Nothing is revisited. A failure to
//! list channels or members aborts the run; a failure inside one source only
//! skips that source.
//!
//! Channels are traversed by workers bounded by a semaphore. Every worker
//! sends its results over a channel to the single loop that owns the
//! `ActivityRecord`, so aggregation never needs a lock.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::activity::ActivityRecord;
use crate::classify::{classify, ClassificationCounts, ClassifiedMember};
use crate::config::AuditConfig;
use crate::history::{fetch_history, FetchOptions};
use crate::model::{ActivityThreshold, Member, Message, Source, ThreadState};
use crate::platform::{ChatPlatform, PlatformError, ARCHIVED_THREAD_PAGE_SIZE, MEMBER_PAGE_SIZE};
use crate::report::{CsvSink, Report, ReportCounts, ReportSink};

/// Everything a run needs besides the platform.
#[derive(Debug, Clone)]
pub struct AuditPlan {
    pub group_id: String,
    /// Cut line and history lower bound, fixed for the whole run.
    pub threshold: ActivityThreshold,
    pub fetch: FetchOptions,
    pub max_concurrent_sources: usize,
}

impl AuditPlan {
    pub fn from_config(config: &AuditConfig, now: DateTime<Utc>) -> Result<Self> {
        let threshold = ActivityThreshold::from_window(now, config.inactivity_days)
            .with_context(|| {
                format!(
                    "Inactivity window of {} days reaches before the earliest supported date",
                    config.inactivity_days
                )
            })?;

        Ok(Self {
            group_id: config.guild_id.clone(),
            threshold,
            fetch: config.fetch_options(),
            max_concurrent_sources: config.max_concurrent_sources.max(1),
        })
    }

    pub fn lower_bound(&self) -> DateTime<Utc> {
        self.threshold.instant()
    }
}

/// What happened to one source during traversal.
#[derive(Debug, Clone)]
pub enum SourceOutcome {
    Aggregated { messages: usize },
    Skipped { reason: String },
}

/// Progress notification, one per source.
#[derive(Debug, Clone)]
pub struct SourceProgress {
    pub source: Source,
    pub outcome: SourceOutcome,
    /// Sources finished so far, this one included.
    pub completed: usize,
}

/// Counters for the traversal phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub channels: usize,
    pub sources_visited: usize,
    pub sources_skipped: usize,
    pub thread_listings_failed: usize,
    pub messages_aggregated: usize,
}

/// Result of walking every source of a guild.
#[derive(Debug, Clone, Default)]
pub struct Traversal {
    pub record: ActivityRecord,
    pub stats: TraversalStats,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct AuditSummary {
    pub threshold: ActivityThreshold,
    pub traversal: TraversalStats,
    pub authors: usize,
    pub members: usize,
    pub bots_skipped: usize,
    pub counts: ClassificationCounts,
}

/// Classified roster plus run counters, ready for reporting.
#[derive(Debug, Clone)]
pub struct AuditOutcome {
    pub results: Vec<ClassifiedMember>,
    pub summary: AuditSummary,
}

/// A channel together with the threads found under it.
#[derive(Debug, Clone)]
pub struct ChannelListing {
    pub channel: Source,
    pub threads: Vec<Source>,
    pub failures: Vec<(ThreadState, String)>,
}

enum TraversalEvent {
    History {
        source: Source,
        result: Result<Vec<Message>, PlatformError>,
    },
    ThreadsUnavailable {
        channel: Source,
        state: ThreadState,
        error: PlatformError,
    },
}

/// Run every phase up to classification.
pub async fn run<F>(
    platform: Arc<dyn ChatPlatform>,
    plan: &AuditPlan,
    on_progress: F,
) -> Result<AuditOutcome>
where
    F: FnMut(&SourceProgress),
{
    info!(
        "Auditing guild {} (threshold {})",
        plan.group_id,
        plan.threshold.instant()
    );

    let traversal = traverse_sources(platform.clone(), plan, on_progress).await?;
    let members = collect_members(platform.as_ref(), &plan.group_id).await?;

    let results = classify(&members, &traversal.record, plan.threshold);
    let counts = ClassificationCounts::tally(&results);
    let bots_skipped = members.iter().filter(|m| m.automated).count();

    info!(
        "Classified {} members: {} never posted, {} inactive, {} active",
        counts.total(),
        counts.never_posted,
        counts.inactive,
        counts.active
    );

    Ok(AuditOutcome {
        results,
        summary: AuditSummary {
            threshold: plan.threshold,
            traversal: traversal.stats,
            authors: traversal.record.len(),
            members: members.len(),
            bots_skipped,
            counts,
        },
    })
}

/// Walk every channel of the guild and its threads, aggregating activity.
///
/// Only a failure to list the guild's channels is fatal.
pub async fn traverse_sources<F>(
    platform: Arc<dyn ChatPlatform>,
    plan: &AuditPlan,
    mut on_progress: F,
) -> Result<Traversal>
where
    F: FnMut(&SourceProgress),
{
    let channels = platform
        .enumerate_sources(&plan.group_id)
        .await
        .with_context(|| format!("Failed to list channels of guild {}", plan.group_id))?;

    info!("Scanning {} channels", channels.len());

    let mut traversal = Traversal {
        stats: TraversalStats {
            channels: channels.len(),
            ..TraversalStats::default()
        },
        ..Traversal::default()
    };

    let (tx, mut rx) = mpsc::channel::<TraversalEvent>(64);
    let semaphore = Arc::new(Semaphore::new(plan.max_concurrent_sources));
    let lower_bound = plan.lower_bound();
    let fetch = plan.fetch;

    let dispatcher = tokio::spawn(async move {
        let mut workers = JoinSet::new();

        for channel in channels {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let platform = platform.clone();
            let tx = tx.clone();

            workers.spawn(async move {
                let _permit = permit;
                traverse_channel(platform.as_ref(), channel, lower_bound, &fetch, &tx).await;
            });
        }
        drop(tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                warn!("Channel worker failed: {}", err);
            }
        }
    });

    while let Some(event) = rx.recv().await {
        match event {
            TraversalEvent::History { source, result } => {
                let outcome = match result {
                    Ok(messages) => {
                        traversal.record.record_activity(&messages);
                        traversal.stats.sources_visited += 1;
                        traversal.stats.messages_aggregated += messages.len();
                        info!("Parsed {} messages in {}", messages.len(), source.label());
                        SourceOutcome::Aggregated {
                            messages: messages.len(),
                        }
                    }
                    Err(err) => {
                        warn!("Could not access {}: {}", source.label(), err);
                        traversal.stats.sources_skipped += 1;
                        SourceOutcome::Skipped {
                            reason: err.to_string(),
                        }
                    }
                };

                on_progress(&SourceProgress {
                    source,
                    outcome,
                    completed: traversal.stats.sources_visited + traversal.stats.sources_skipped,
                });
            }
            TraversalEvent::ThreadsUnavailable {
                channel,
                state,
                error,
            } => {
                warn!(
                    "Could not list {:?} threads of {}: {}",
                    state,
                    channel.label(),
                    error
                );
                traversal.stats.thread_listings_failed += 1;
            }
        }
    }

    dispatcher.await.context("Channel dispatcher panicked")?;

    info!(
        "Traversal complete: {} sources, {} skipped, {} messages, {} authors",
        traversal.stats.sources_visited,
        traversal.stats.sources_skipped,
        traversal.stats.messages_aggregated,
        traversal.record.len()
    );

    Ok(traversal)
}

/// History of one channel, then of every thread found under it.
async fn traverse_channel(
    platform: &dyn ChatPlatform,
    channel: Source,
    lower_bound: DateTime<Utc>,
    fetch: &FetchOptions,
    tx: &mpsc::Sender<TraversalEvent>,
) {
    debug!("Processing {}", channel.label());

    let result = fetch_history(platform, &channel, lower_bound, fetch).await;
    let listing = list_threads(platform, channel.clone(), lower_bound).await;

    if tx
        .send(TraversalEvent::History {
            source: channel,
            result,
        })
        .await
        .is_err()
    {
        return;
    }

    for (state, error) in listing.errors {
        let event = TraversalEvent::ThreadsUnavailable {
            channel: listing.channel.clone(),
            state,
            error,
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }

    for thread in listing.threads {
        debug!("Processing {}", thread.label());
        let result = fetch_history(platform, &thread, lower_bound, fetch).await;
        if tx
            .send(TraversalEvent::History {
                source: thread,
                result,
            })
            .await
            .is_err()
        {
            return;
        }
    }
}

struct ThreadListing {
    channel: Source,
    threads: Vec<Source>,
    errors: Vec<(ThreadState, PlatformError)>,
}

/// Open threads, then archived threads newest-archived first.
///
/// A failed listing degrades to "no threads" for that state. Archived pages
/// stop once a page runs short or its oldest thread was archived before
/// `lower_bound`; such threads cannot hold messages inside the window.
async fn list_threads(
    platform: &dyn ChatPlatform,
    channel: Source,
    lower_bound: DateTime<Utc>,
) -> ThreadListing {
    let mut threads = Vec::new();
    let mut errors = Vec::new();

    match platform
        .enumerate_sub_sources(&channel.id, ThreadState::Open, None)
        .await
    {
        Ok(open) => threads.extend(open),
        Err(err) => errors.push((ThreadState::Open, err)),
    }

    let mut older_than: Option<DateTime<Utc>> = None;
    loop {
        let page = match platform
            .enumerate_sub_sources(&channel.id, ThreadState::Archived, older_than)
            .await
        {
            Ok(page) => page,
            Err(err) => {
                errors.push((ThreadState::Archived, err));
                break;
            }
        };

        let full_page = page.len() >= ARCHIVED_THREAD_PAGE_SIZE;
        let oldest = page.iter().filter_map(|t| t.archived_at).min();

        threads.extend(
            page.into_iter()
                .filter(|t| t.archived_at.map_or(true, |at| at >= lower_bound)),
        );

        match oldest {
            // The cursor must move strictly backward or the listing would loop.
            Some(at) if full_page && at >= lower_bound && older_than.map_or(true, |prev| at < prev) => {
                older_than = Some(at)
            }
            _ => break,
        }
    }

    ThreadListing {
        channel,
        threads,
        errors,
    }
}

/// Channels and their threads, without reading any history.
pub async fn discover_sources(
    platform: &dyn ChatPlatform,
    group_id: &str,
    lower_bound: DateTime<Utc>,
) -> Result<Vec<ChannelListing>> {
    let channels = platform
        .enumerate_sources(group_id)
        .await
        .with_context(|| format!("Failed to list channels of guild {}", group_id))?;

    let mut listings = Vec::with_capacity(channels.len());
    for channel in channels {
        let listing = list_threads(platform, channel, lower_bound).await;
        listings.push(ChannelListing {
            channel: listing.channel,
            threads: listing.threads,
            failures: listing
                .errors
                .into_iter()
                .map(|(state, err)| (state, err.to_string()))
                .collect(),
        });
    }
    Ok(listings)
}

/// Page through the whole roster until a short page.
pub async fn collect_members(platform: &dyn ChatPlatform, group_id: &str) -> Result<Vec<Member>> {
    let mut members: Vec<Member> = Vec::new();
    let mut after: Option<String> = None;

    loop {
        let page = platform
            .enumerate_members(group_id, after.as_deref(), MEMBER_PAGE_SIZE)
            .await
            .with_context(|| format!("Failed to fetch members of guild {}", group_id))?;

        let fetched = page.len();
        if let Some(last) = page.last() {
            after = Some(last.id.clone());
        }
        members.extend(page);

        info!("Fetched {} members, total so far: {}", fetched, members.len());

        if fetched < MEMBER_PAGE_SIZE {
            break;
        }
    }

    Ok(members)
}

/// Write the inactive report and, in debug mode, the active report.
///
/// Output files are created only now, after classification.
pub fn write_csv_reports(config: &AuditConfig, results: &[ClassifiedMember]) -> Result<ReportCounts> {
    let mut inactive = CsvSink::create(&config.csv_output)?;
    let mut active = match config.active_report_path() {
        Some(path) => Some(CsvSink::create(path)?),
        None => None,
    };

    let counts = Report::new(
        &mut inactive,
        active.as_mut().map(|sink| sink as &mut dyn ReportSink),
    )
    .write(results)?;

    info!("Saved inactive members to {}", config.csv_output.display());
    if let Some(path) = config.active_report_path() {
        info!("Saved active members to {}", path.display());
    }

    Ok(counts)
}
