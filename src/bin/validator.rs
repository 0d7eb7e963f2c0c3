//! Channel Validator CLI
//!
//! Validates the channel and its repositories and prints a report.
//!
//! Usage:
//!   channel-validator
//!   channel-validator --channel path/to/channel.json --test-repositories --format json

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use package_channel::{ChannelValidator, ValidateOptions, ValidatorConfig};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "channel-validator")]
#[command(about = "Validate a package channel and its repositories")]
struct Cli {
    /// Path to the channel file (default: from configuration)
    #[arg(short, long)]
    channel: Option<PathBuf>,

    /// Also fetch and validate external repositories
    #[arg(long)]
    test_repositories: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Configuration file
    #[arg(long)]
    config: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = ValidatorConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let channel = cli
        .channel
        .unwrap_or_else(|| config.channel_path(std::path::Path::new(".")));

    let validator = ChannelValidator::new(config)?;
    let options = ValidateOptions {
        test_repositories: cli.test_repositories,
    };
    let report = validator
        .validate(&channel, &options)
        .with_context(|| format!("validating {}", channel.display()))?;

    match cli.format {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    Ok(report.is_success())
}
