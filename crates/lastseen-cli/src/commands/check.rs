use std::path::Path;

use anyhow::Result;

use lastseen_core::AuditConfig;

use crate::ui;

pub fn run(config: &AuditConfig, path: &Path, json: bool) -> Result<()> {
    let redacted = config.redacted();

    if json {
        println!("{}", serde_json::to_string_pretty(&redacted)?);
        return Ok(());
    }

    ui::success(&format!("Config OK: {}", path.display()));
    println!();
    ui::field("Guild", &redacted.guild_id);
    ui::field("Token", &redacted.token);
    ui::field("Inactivity window", format!("{} days", redacted.inactivity_days));
    ui::field("Inactive report", redacted.csv_output.display());
    match redacted.active_report_path() {
        Some(path) => ui::field("Active report", path.display()),
        None => ui::field("Active report", "disabled (debug: false)"),
    }
    ui::field("Page ordering", format!("{:?}", redacted.page_ordering));
    ui::field("Concurrent channels", redacted.max_concurrent_sources);
    ui::field("Request timeout", format!("{}s", redacted.page_timeout_secs));
    ui::field("API", &redacted.api_base_url);
    Ok(())
}
