use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobmerge_sync::{load_match_policy, match_bundles, report_recent_markdown, SyncConfig, SyncPipeline};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobmerge-cli")]
#[command(about = "Job posting merge engine command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the full pipeline using JOBMERGE_* environment configuration.
    Run,
    /// Print candidate pairs for two bundles as JSON without touching state.
    Match {
        /// Military input bundle.
        #[arg(long)]
        left: PathBuf,
        /// Rndjob input bundle.
        #[arg(long)]
        right: PathBuf,
    },
    /// Summarize the most recent runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

/// Logs go to stderr so `match` output stays parseable.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let summary = SyncPipeline::new(config).run_once().await?;
            for warning in &summary.warnings {
                warn!(%warning, "run finished with warning");
            }
            println!(
                "run complete: run_id={} pairs={} merged={} new={} updated={} unchanged={} warnings={} reports={}",
                summary.run_id,
                summary.stats.candidate_pairs,
                summary.stats.merged_pairs,
                summary.stats.new,
                summary.stats.updated,
                summary.stats.unchanged,
                summary.warnings.len(),
                summary.reports_dir
            );
        }
        Commands::Match { left, right } => {
            let policy = load_match_policy(&config.workspace_root)
                .await?
                .with_workers(config.match_workers);
            let audit = match_bundles(&left, &right, &policy)?;
            let json = serde_json::to_string_pretty(&audit).context("serializing candidate pairs")?;
            println!("{json}");
        }
        Commands::Report { runs } => {
            println!("{}", report_recent_markdown(runs, &config.reports_dir)?);
        }
    }

    Ok(())
}
