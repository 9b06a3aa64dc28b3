use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lastseen_core::AuditConfig;

mod commands;
mod ui;

#[derive(Parser)]
#[command(name = "lastseen")]
#[command(about = "Find the members of a Discord guild who stopped talking.")]
#[command(version)]
struct Cli {
    /// Config file (YAML, or TOML with a .toml extension).
    /// Defaults to $LASTSEEN_CONFIG, then ./config.yaml
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Show debug logs
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every channel and thread, then write the inactivity report
    Audit {
        /// Override the inactivity window in days
        #[arg(long, value_name = "DAYS")]
        days: Option<u32>,

        /// Override the inactive report path
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// List the channels and threads an audit would read
    Sources,

    /// Validate the config and print the effective settings
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        ui::error(&format!("{:#}", err));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = AuditConfig::resolve_path(cli.config.as_deref());
    let config = AuditConfig::load(&config_path)?;

    init_tracing(cli.verbose || config.debug);

    match cli.command {
        Commands::Audit { days, output } => commands::audit::run(config, days, output).await,
        Commands::Sources => commands::sources::run(&config).await,
        Commands::Check { json } => commands::check::run(&config, &config_path, json),
    }
}

/// `RUST_LOG` wins when set. Otherwise warnings only, or debug when asked for.
fn init_tracing(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), verbose))
        .with_writer(std::io::stderr)
        .init();
}

fn default_filter(rust_log: Option<String>, verbose: bool) -> EnvFilter {
    let fallback = if verbose { "debug" } else { "warn" };
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_rust_log_overrides_default_level() {
        let filter = default_filter(Some("trace".to_string()), false);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_default_level_without_rust_log() {
        assert_eq!(default_filter(None, false).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(default_filter(None, true).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(
            default_filter(Some("  ".to_string()), false).max_level_hint(),
            Some(LevelFilter::WARN)
        );
    }

    #[test]
    fn test_invalid_rust_log_falls_back() {
        let filter = default_filter(Some("lastseen_core=loud".to_string()), true);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }
}
