//! Mise crawler main entry point
//!
//! This is the command-line interface for the multi-stage recipe crawler.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use mise_crawler::checkpoint::ResumeCursor;
use mise_crawler::config::{load_config_with_hash, validate, Config};
use mise_crawler::crawler::{input_list_name, Pipeline};
use mise_crawler::output::print_summary;
use mise_crawler::Stage;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Stage selection on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StageArg {
    Discovery,
    Links,
    Details,
    All,
}

impl StageArg {
    fn stages(self) -> Vec<Stage> {
        match self {
            Self::Discovery => vec![Stage::Discovery],
            Self::Links => vec![Stage::Links],
            Self::Details => vec![Stage::Details],
            Self::All => Stage::ALL.to_vec(),
        }
    }
}

/// Mise: a resumable, multi-stage recipe crawler
///
/// Discovers recipe categories, walks their paginated listings and extracts
/// every recipe, checkpointing one artifact per page so an interrupted run
/// picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "mise-crawler")]
#[command(version)]
#[command(about = "A resumable, multi-stage recipe crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Stage to run
    #[arg(long, value_enum, default_value = "all")]
    stage: StageArg,

    /// Resume the selected stage from this URL or 1-based position
    #[arg(long, value_name = "URL|N")]
    from: Option<String>,

    /// Number of concurrent worker slots
    #[arg(long)]
    workers: Option<u32>,

    /// Run sessions without a visible UI
    #[arg(long)]
    headless: bool,

    /// Reprocess items whose artifact already exists
    #[arg(long)]
    no_skip_existing: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_cli_overrides(&mut config, &cli)?;
    validate(&config).context("invalid command-line overrides")?;

    let stages = cli.stage.stages();
    let pipeline = Pipeline::new(config).with_config_hash(config_hash);

    if cli.dry_run {
        handle_dry_run(&pipeline, &stages)
    } else {
        handle_crawl(&pipeline, &stages).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("mise_crawler=info,warn"),
            1 => EnvFilter::new("mise_crawler=debug,info"),
            2 => EnvFilter::new("mise_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies flags on top of the file and environment configuration
fn apply_cli_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }
    if cli.headless {
        config.crawler.headless = true;
    }
    if cli.no_skip_existing {
        config.resume.skip_existing = false;
    }
    if let Some(from) = &cli.from {
        let stage = match cli.stage {
            StageArg::All => bail!("--from needs a single --stage"),
            other => other.stages()[0],
        };
        let cursor = match from.parse::<ResumeCursor>() {
            Ok(cursor) => cursor,
            Err(never) => match never {},
        };
        config.resume.stage = Some(stage);
        config.resume.from = Some(cursor);
    }
    Ok(())
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(pipeline: &Pipeline, stages: &[Stage]) -> anyhow::Result<()> {
    let config = pipeline.config();
    println!("=== Mise Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Headless: {}", config.crawler.headless);
    println!("  Attempt deadline: {}ms", config.crawler.attempt_deadline_ms);
    println!("  Max attempts: {}", config.crawler.max_attempts);
    println!(
        "  Politeness: {}-{}ms",
        config.crawler.politeness_min_ms, config.crawler.politeness_max_ms
    );
    println!("  Skip existing: {}", config.resume.skip_existing);

    println!("\nSite:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Blacklist: {}", config.blacklist_path().display());

    println!("\nOutput:");
    println!("  Data dir: {}", config.data_dir().display());
    println!("  Report: {}", config.report_path().display());

    println!("\nStages:");
    let plans = pipeline.plan(stages).context("failed to inspect checkpoints")?;
    for plan in &plans {
        let input = match plan.input_total {
            Some(n) => n.to_string(),
            None => format!("{} not written yet", input_list_name(plan.stage)),
        };
        println!(
            "  - {}: input {}, {} done, {} rejected",
            plan.stage, input, plan.already_done, plan.rejected
        );
        if let Some(cursor) = &plan.cursor {
            println!("    resuming from {}", cursor);
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(pipeline: &Pipeline, stages: &[Stage]) -> anyhow::Result<()> {
    tracing::info!(
        "Starting crawl: stages {:?}, {} workers",
        stages,
        pipeline.config().crawler.workers
    );

    match pipeline.run(stages).await {
        Ok(summary) => {
            print_summary(&summary);
            tracing::info!(
                "Crawl completed: {} done, {} failed",
                summary.total_done(),
                summary.total_failed()
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e).context("crawl aborted")
        }
    }
}
