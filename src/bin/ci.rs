//! Channel CI CLI
//!
//! Validates the working tree, then reports and reviews what changed
//! between two revisions of the channel data.
//!
//! Exit codes:
//!   0  success
//!   1  operational failure
//!   2  validation failed
//!   5  review found errors in added packages or repositories, including
//!      the packages of added external repositories

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use package_channel::diagnostics::Severity;
use package_channel::diff::ReviewFinding;
use package_channel::{
    review_package, ChannelValidator, Location, RevisionDiff, ValidateOptions, ValidatorConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const EXIT_VALIDATION: i32 = 2;
const EXIT_REVIEW: i32 = 5;

#[derive(Parser)]
#[command(name = "channel-ci")]
#[command(about = "Validate and review channel changes between two revisions")]
struct Cli {
    /// Path to the channel checkout
    #[arg(short, long, default_value = ".")]
    repo: PathBuf,

    /// Base revision
    #[arg(long, default_value = "HEAD~1")]
    from: String,

    /// Target revision
    #[arg(long, default_value = "HEAD")]
    to: String,

    /// Do not fetch added external repositories
    #[arg(long)]
    offline: bool,

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
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = ValidatorConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let current_build = config.review.current_build;
    let channel_path = config.channel_path(&cli.repo);
    let diff_source = RevisionDiff::open(&cli.repo, &config)?;
    let validator = ChannelValidator::new(config)?;

    println!("🔍 Validating working tree");
    let report = validator.validate(&channel_path, &ValidateOptions::default())?;
    if !report.is_success() {
        print!("{}", report.render_text());
        return Ok(EXIT_VALIDATION);
    }
    println!("✅ Channel is valid");
    println!();

    let diff = diff_source
        .diff(&cli.from, &cli.to)
        .with_context(|| format!("diffing {}..{}", cli.from, cli.to))?;
    info!(from = %cli.from, to = %cli.to, "diff computed");

    if diff.is_empty() {
        println!("No channel changes between {} and {}", cli.from, cli.to);
        return Ok(0);
    }

    for repository in &diff.added_repositories {
        println!("➕ repository {}", repository);
    }
    for repository in &diff.removed_repositories {
        println!("➖ repository {}", repository);
    }
    for package in &diff.added_packages {
        println!("➕ {} ({})", package.name, package.file);
    }
    for package in &diff.removed_packages {
        println!("➖ {} ({})", package.name, package.file);
    }
    for package in &diff.modified_packages {
        println!("✏️  {} ({}, {})", package.name, package.file, package.fingerprint.short());
    }
    println!();

    let mut review_errors = 0;

    for package in &diff.added_packages {
        review_errors += print_findings(review_package(package, current_build, true));
    }

    let external = diff.added_repositories.iter().map(|r| Location::parse(r)).filter(Location::is_remote);
    for location in external {
        if cli.offline {
            println!("ℹ️  not fetching {} (offline)", location);
            continue;
        }
        println!("🔍 Checking {}", location);
        let check = validator
            .validate_repository(location.clone())
            .with_context(|| format!("checking {}", location))?;
        for diag in check.diagnostics.errors() {
            review_errors += 1;
            println!("   └─ {}", diag);
        }
        println!("   Found {} packages", check.packages.len());
        for package in &check.packages {
            review_errors += print_findings(review_package(package, current_build, false));
        }
    }

    if review_errors > 0 {
        println!();
        println!("❌ Review found {} errors", review_errors);
        return Ok(EXIT_REVIEW);
    }

    println!("✅ Review passed");
    Ok(0)
}

/// Print review findings, returning how many are errors
fn print_findings(findings: Vec<ReviewFinding>) -> usize {
    let mut errors = 0;
    for finding in findings {
        if finding.severity == Severity::Error {
            errors += 1;
            println!("❌ {}", finding);
        } else {
            println!("⚠️  {}", finding);
        }
    }
    errors
}
