//! VodSync CLI - Session Planning and Simulation
//!
//! Features:
//! - Playback plan derivation from a session URL or query string
//! - Timing authority event resolution
//! - Full simulated sessions against the in-memory media source

use clap::{Parser, Subcommand};

mod commands;
mod output;

/// VodSync CLI - Synchronized playback toolkit
#[derive(Parser)]
#[command(name = "vodsync")]
#[command(version)]
#[command(about = "Synchronized multi-stream playback toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the playback plan from a session URL or query string
    Plan {
        /// Session URL or bare query string (playerN, offsetplayerN, race)
        url: String,

        /// Resolve the event reference against the timing authority
        #[arg(long)]
        resolve: bool,

        /// Timing authority base URL
        #[arg(long, default_value = "https://racetime.gg/")]
        authority: String,
    },

    /// Query the timing authority for a synchronizable event
    ResolveEvent {
        /// Event reference (category/slug, or a URL containing one)
        reference: String,

        /// Timing authority base URL
        #[arg(long, default_value = "https://racetime.gg/")]
        authority: String,
    },

    /// Run a simulated session and print the diagnostic log
    Simulate {
        /// Session query string (playerN, offsetplayerN, ...)
        query: String,

        /// Seconds of simulated playback after alignment
        #[arg(short, long, default_value = "30")]
        play_seconds: u64,

        /// Seek the group to this wall-clock timestamp (ms) mid-run
        #[arg(long)]
        seek_to: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(level).init();

    match cli.command {
        Commands::Plan {
            url,
            resolve,
            authority,
        } => {
            commands::plan(&url, resolve, &authority, &cli.format).await?;
        }
        Commands::ResolveEvent {
            reference,
            authority,
        } => {
            commands::resolve_event(&reference, &authority, &cli.format).await?;
        }
        Commands::Simulate {
            query,
            play_seconds,
            seek_to,
        } => {
            commands::simulate(&query, play_seconds, seek_to, &cli.format).await?;
        }
    }

    Ok(())
}
