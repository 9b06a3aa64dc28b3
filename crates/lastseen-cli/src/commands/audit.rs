use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};

use lastseen_core::audit::{self, AuditSummary};
use lastseen_core::{AuditConfig, AuditPlan, ReportCounts, SourceOutcome};

use crate::ui;

pub async fn run(mut config: AuditConfig, days: Option<u32>, output: Option<PathBuf>) -> Result<()> {
    if let Some(days) = days {
        config.inactivity_days = days;
    }
    if let Some(output) = output {
        config.csv_output = output;
    }
    config.validate()?;

    let client = lastseen_core::discord_client(&config)?;
    let plan = AuditPlan::from_config(&config, Utc::now())?;

    ui::header(&format!("Auditing guild {}", config.guild_id));
    ui::field(
        "Inactivity threshold",
        plan.threshold.instant().to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    println!();

    let pb = ui::spinner("Scanning channels");
    let pb_clone = pb.clone();

    let result = audit::run(Arc::new(client), &plan, move |progress| {
        let label = progress.source.label();
        match &progress.outcome {
            SourceOutcome::Aggregated { messages } => {
                pb_clone.set_message(format!(
                    "[{}] {}: {} messages",
                    progress.completed, label, messages
                ));
            }
            SourceOutcome::Skipped { reason } => {
                pb_clone.suspend(|| ui::warn(&format!("Could not access {}: {}", label, reason)));
            }
        }
    })
    .await;

    let outcome = match result {
        Ok(outcome) => {
            pb.finish_and_clear();
            outcome
        }
        Err(err) => {
            pb.abandon_with_message("Failed");
            return Err(err);
        }
    };

    let counts = audit::write_csv_reports(&config, &outcome.results)?;
    print_summary(&config, &outcome.summary, &counts);
    Ok(())
}

fn print_summary(config: &AuditConfig, summary: &AuditSummary, counts: &ReportCounts) {
    let traversal = &summary.traversal;

    ui::success(&format!(
        "Scanned {} sources in {} channels ({} messages from {} authors)",
        traversal.sources_visited, traversal.channels, traversal.messages_aggregated, summary.authors
    ));
    if traversal.sources_skipped > 0 || traversal.thread_listings_failed > 0 {
        ui::warn(&format!(
            "{} sources skipped, {} thread listings failed (see logs)",
            traversal.sources_skipped, traversal.thread_listings_failed
        ));
    }

    println!();
    ui::field("Members", summary.members);
    ui::field("Bots skipped", summary.bots_skipped);
    ui::field("Never posted", summary.counts.never_posted);
    ui::field("Inactive", summary.counts.inactive);
    ui::field("Active", summary.counts.active);
    println!();

    ui::success(&format!(
        "Saved {} inactive members to {}",
        counts.inactive_rows,
        config.csv_output.display()
    ));
    if let Some(path) = config.active_report_path() {
        ui::success(&format!(
            "Saved {} active members to {}",
            counts.active_rows,
            path.display()
        ));
    }
}
