//! Kubeprep Daemon - exam environment provisioner
//!
//! Generates disposable practice environments from the question bank and
//! reconciles them onto the target cluster.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kubeprep_common::Track;
use kubeprepd::config::Config;
use kubeprepd::engine::ProvisionEngine;
use std::path::PathBuf;
use std::str::FromStr;
use tokio_stream::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kubeprepd")]
#[command(about = "Kubeprep - disposable exam practice environments", long_about = None)]
#[command(version)]
struct Cli {
    /// Alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a chart for a track/difficulty
    Generate {
        /// Track: ckad, cka, cks or kcna
        track: String,
        /// Difficulty: beginner, intermediate, advanced
        difficulty: String,
        /// Include every available question instead of a random sample
        #[arg(long)]
        practice: bool,
    },

    /// Write a generated chart archive to disk
    Download {
        track: String,
        difficulty: String,
        #[arg(long)]
        practice: bool,
        /// Output path (defaults to <chart-id>.tgz)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Generate (if needed) and apply onto the cluster, streaming progress
    Apply {
        track: String,
        difficulty: String,
        #[arg(long)]
        practice: bool,
    },

    /// Show release status for a track/difficulty
    Status {
        track: String,
        difficulty: String,
    },

    /// Remove all exam releases and namespaces from the cluster
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let engine = ProvisionEngine::new(config);

    match cli.command {
        Commands::Generate { track, difficulty, practice } => {
            let track = parse_track(&track)?;
            let chart_id = engine.generate(track, &difficulty, practice).await?;
            println!("{chart_id}");
        }

        Commands::Download { track, difficulty, practice, output } => {
            let track = parse_track(&track)?;
            let chart_id = engine.generate(track, &difficulty, practice).await?;
            let bytes = engine.download_archive(&chart_id).await?;
            let path = output.unwrap_or_else(|| PathBuf::from(format!("{chart_id}.tgz")));
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} bytes to {}", bytes.len(), path.display());
        }

        Commands::Apply { track, difficulty, practice } => {
            let track = parse_track(&track)?;
            let mut stream = engine.apply_stream(track, &difficulty, practice);
            let mut failed = false;
            while let Some(event) = stream.next().await {
                println!("{}", event.format_human());
                if let kubeprep_common::ProgressEventType::Failed { .. } = event.event {
                    failed = true;
                }
            }
            if failed {
                anyhow::bail!("apply failed");
            }
        }

        Commands::Status { track, difficulty } => {
            let track = parse_track(&track)?;
            let status = engine.status(track, &difficulty).await?;
            println!(
                "release: {}\nnamespace: {}\napplied: {}\nstatus: {}",
                status.release, status.namespace, status.applied, status.status
            );
        }

        Commands::Cleanup => {
            let report = engine.cleanup().await;
            if report.is_empty() {
                println!("Nothing to clean up");
            } else {
                println!(
                    "Removed {} releases, cleared {} stuck, deleted {} namespaces ({} warnings)",
                    report.releases_removed.len(),
                    report.stuck_cleared.len(),
                    report.namespaces_deleted.len(),
                    report.warnings.len()
                );
                for warning in &report.warnings {
                    println!("  warning: {warning}");
                }
            }
        }
    }

    Ok(())
}

fn parse_track(raw: &str) -> Result<Track> {
    Track::from_str(raw).map_err(|e| anyhow::anyhow!(e))
}
