use anyhow::Result;
use chrono::Utc;
use console::style;

use lastseen_core::audit;
use lastseen_core::{AuditConfig, AuditPlan, SourceKind};

use crate::ui;

pub async fn run(config: &AuditConfig) -> Result<()> {
    let client = lastseen_core::discord_client(config)?;
    let plan = AuditPlan::from_config(config, Utc::now())?;

    let pb = ui::spinner("Listing channels and threads");
    let listings = audit::discover_sources(&client, &plan.group_id, plan.lower_bound()).await;
    pb.finish_and_clear();
    let listings = listings?;

    ui::header(&format!("Guild {}", config.guild_id));

    let mut threads = 0usize;
    for listing in &listings {
        println!("  {}", style(listing.channel.label()).bold());
        for thread in &listing.threads {
            let tag = match thread.kind {
                SourceKind::ArchivedThread => style("archived").dim(),
                _ => style("open").green(),
            };
            println!("    {} {}", thread.label(), tag);
        }
        for (state, reason) in &listing.failures {
            ui::info(&format!("  {} {:?} threads unavailable: {}", style("!").yellow(), state, reason));
        }
        threads += listing.threads.len();
    }

    println!();
    ui::success(&format!(
        "{} channels, {} threads within the last {} days",
        listings.len(),
        threads,
        config.inactivity_days
    ));
    Ok(())
}
