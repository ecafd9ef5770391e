use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use topicpulse::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "topicpulse",
    version,
    about = "Signal analytics engine: topic aggregation, time-series analysis and concern ranking",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML configuration file (environment variables are used otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to bind
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Analyze an inline time series from a JSON request file
    Analyze {
        /// Analysis request file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Aggregate a topic's documents from a JSON file
    Aggregate {
        /// Aggregation request file
        #[arg(short, long)]
        input: PathBuf,

        /// Split documents into buckets (hourly, daily, weekly)
        #[arg(short, long)]
        bucket: Option<String>,
    },

    /// Rank topics from a JSON file of aggregates
    Rank {
        /// File with `current` (and optionally `previous`) aggregates
        #[arg(short, long)]
        input: PathBuf,

        /// Ranking strategy (recent_volume, volume_increase_abs, high_concern_score)
        #[arg(short, long, default_value = "recent_volume")]
        rank_by: String,

        /// Maximum number of topics
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    tracing::info!("topicpulse starting");

    match cli.command {
        Commands::Serve { host, port } => {
            tracing::info!(host = ?host, port = ?port, "Starting serve command");
            commands::serve(config, host, port).await?;
        }

        Commands::Analyze { input } => {
            tracing::info!(input = %input.display(), "Starting analyze command");
            commands::analyze(&config, &input).await?;
        }

        Commands::Aggregate { input, bucket } => {
            tracing::info!(
                input = %input.display(),
                bucket = ?bucket,
                "Starting aggregate command"
            );
            commands::aggregate(&config, &input, bucket.as_deref())?;
        }

        Commands::Rank {
            input,
            rank_by,
            limit,
        } => {
            tracing::info!(
                input = %input.display(),
                rank_by = %rank_by,
                limit = %limit,
                "Starting rank command"
            );
            commands::rank(&config, &input, &rank_by, limit)?;
        }
    }

    tracing::info!("topicpulse completed successfully");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("topicpulse=debug,tower_http=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("topicpulse={level},tower_http={level},warn"))
            .context("Invalid log level")?
    };

    // Logs go to stderr; stdout carries command output
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
