//! vsync: synchronize two replicas of a file tree using version vectors.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vsync::commands::{self, quoted, render_status, CommandError};
use vsync::{Config, TerminalPrompt};
use vsync_core::{AssumeYes, ReplicaId, SyncError, SyncOutcome};

/// Exit code when the replicas have diverged.
const EXIT_DIVERGED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "vsync")]
#[command(about = "Two-replica file tree sync with version vectors")]
struct Args {
    /// Root of the local replica
    #[arg(short = 'C', long = "replica", default_value = ".", global = true)]
    replica: PathBuf,

    /// Approve every change without asking
    #[arg(short, long, global = true)]
    yes: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize the local replica
    Init {
        /// Identifier of this replica, unique among the replicas it syncs with
        id: ReplicaId,
    },
    /// Synchronize the local replica with the one at PATH
    Sync {
        /// Root of the other replica
        path: PathBuf,
    },
    /// Show the local replica's version vector and changes since the last sync
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging; stdout is kept for listings and prompts
    let default_filter = if args.verbose {
        "debug,vsync=debug,vsync_core=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = Config::from_env()?;
    let root = args.replica;

    match args.command {
        Command::Init { id } => {
            commands::init(&root, id.clone(), &config.sync)
                .await
                .with_context(|| format!("Failed to initialize {}", root.display()))?;
            let shown = commands::resolve(&root).await;
            println!(
                "Initialized {} in {}.",
                quoted(id.as_str()),
                quoted(&shown.display().to_string())
            );
        }
        Command::Status => {
            let status = commands::status(&root, &config.sync)
                .await
                .with_context(|| format!("Failed to read status of {}", root.display()))?;
            println!("{}", render_status(&status));
        }
        Command::Sync { path } => {
            let result = if args.yes {
                commands::sync(&root, &path, &config.sync, AssumeYes).await
            } else {
                commands::sync(&root, &path, &config.sync, TerminalPrompt::new()).await
            };

            let outcome = match result {
                Err(CommandError::Sync(SyncError::Diverged(d))) => {
                    eprintln!("Error: {}", d);
                    eprintln!("Resolve the conflicting edits by hand, then sync again.");
                    return Ok(ExitCode::from(EXIT_DIVERGED));
                }
                other => other.with_context(|| {
                    format!("Failed to sync {} with {}", root.display(), path.display())
                })?,
            };

            match outcome {
                SyncOutcome::AlreadySynchronized => println!("Already synchronized."),
                SyncOutcome::Synchronized {
                    version_vector,
                    changes,
                } => {
                    let touched: usize = changes.iter().map(|(_, c)| c.len()).sum();
                    info!("Applied {} path change(s)", touched);
                    println!("Synchronized at {}.", version_vector);
                }
                SyncOutcome::Canceled { replica } => {
                    println!(
                        "Canceled: change to {} declined. Nothing was modified.",
                        quoted(replica.as_str())
                    );
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
