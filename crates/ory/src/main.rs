//! Ory CLI - local reverse proxy for the Ory Network.
//!
//! Main entry point for the `ory` binary.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod commands;
mod config;

use commands::{proxy, tunnel};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Ory CLI
#[derive(Parser)]
#[command(name = "ory")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run your app and Ory on the same domain using a reverse proxy
    Proxy(proxy::ProxyArgs),

    /// Mirror Ory APIs on your local machine for development and testing
    Tunnel(proxy::ProxyArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

const CRATES: [&str; 4] = ["ory", "ory_proxy", "ory_client", "ory_session"];

fn directives(level: &str, fallback: &str) -> String {
    let mut parts: Vec<String> = CRATES.iter().map(|c| format!("{}={}", c, level)).collect();
    parts.push(fallback.to_string());
    parts.join(",")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable, RUST_LOG wins) + rotating JSON file
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new(directives("debug", "info"))
        } else if cli.quiet {
            EnvFilter::new("warn")
        } else {
            EnvFilter::new(directives("info", "warn"))
        }
    });

    let log_dir = config::config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("ory")
        .filename_suffix("log")
        .build(&log_dir)
        .ok();
    let (file_layer, _guard) = match file_appender {
        Some(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(directives("trace", "info")));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();

    let ctx = commands::Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Proxy(args) => proxy::run(args, &ctx).await,
        Commands::Tunnel(args) => tunnel::run(args, &ctx).await,
    }
}
