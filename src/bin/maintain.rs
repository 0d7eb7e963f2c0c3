//! Channel Maintenance CLI
//!
//! Usage:
//!   channel-maintain sort [--check]
//!   channel-maintain redirects [--write]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use package_channel::{Maintainer, ValidatorConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "channel-maintain")]
#[command(about = "Sort channel files and rewrite moved URLs")]
struct Cli {
    /// Path to the channel checkout
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Configuration file
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sort repositories, packages and dependencies into canonical form
    Sort {
        /// Report files that would change instead of writing them
        #[arg(long)]
        check: bool,
    },

    /// Find package details URLs that moved permanently
    Redirects {
        /// Rewrite the moved URLs in place
        #[arg(long)]
        write: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ValidatorConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let maintainer = Maintainer::new(config, &cli.root);

    match cli.command {
        Commands::Sort { check } => {
            let changed = maintainer.sort(!check)?;
            if changed.is_empty() {
                println!("✅ All files are sorted");
                return Ok(());
            }
            for path in &changed {
                if check {
                    println!("❌ {} is not sorted", path.display());
                } else {
                    println!("✏️  sorted {}", path.display());
                }
            }
            if check {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Redirects { write } => {
            println!("🔍 Checking details URLs for permanent redirects...");
            let redirects = maintainer.find_redirects()?;
            if redirects.is_empty() {
                println!("✅ No moved URLs");
                return Ok(());
            }
            for redirect in &redirects {
                println!("  {} ({})", redirect.package, redirect.file.display());
                println!("    └─ {} -> {}", redirect.from, redirect.to);
            }
            if write {
                let applied = maintainer.apply_redirects(&redirects)?;
                println!("✅ Rewrote {} URLs", applied);
            }
            Ok(())
        }
    }
}
