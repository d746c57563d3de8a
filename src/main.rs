use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;

use feedshard::config::Config;
use feedshard::content::{ContentExtractor, ExtractorSettings};
use feedshard::feed::{FetchSettings, Fetcher};
use feedshard::output::{self, Snapshot};
use feedshard::scheduler;

#[derive(Parser, Debug)]
#[command(
    name = "feedshard",
    version,
    about = "Fetch feeds, extract full articles and write a sharded JSON snapshot"
)]
struct Args {
    /// Feed configuration (TOML, or JSON when the extension is .json)
    #[arg(short, long, value_name = "FILE", default_value = "feeds.toml")]
    config: PathBuf,

    /// Directory receiving feeds-index.json, feeds/ and feeds.json
    #[arg(short, long, value_name = "DIR", default_value = "data")]
    output: PathBuf,

    /// Skip full-text extraction even if the config enables it
    #[arg(long)]
    no_full_text: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?;
    if args.no_full_text {
        config.fetch_full_text = false;
    }
    if config.categories.is_empty() {
        tracing::warn!(path = %args.config.display(), "No categories configured");
    }

    let fetcher = Fetcher::new(FetchSettings::default()).context("Failed to build HTTP client")?;
    let extractor = ContentExtractor::new(fetcher.clone(), ExtractorSettings::default());

    let started = std::time::Instant::now();
    let run = scheduler::run(&config, &fetcher, &extractor).await;

    let snapshot = Snapshot::build(&run.feeds, Utc::now());
    output::write_snapshot(&args.output, &snapshot).with_context(|| {
        format!(
            "Failed to write snapshot to '{}'",
            args.output.display()
        )
    })?;

    let failed_feeds = run.feeds.iter().filter(|f| f.error.is_some()).count();
    print!(
        "Wrote {} items from {} feeds ({} failed) to {}",
        snapshot.item_count(),
        run.feeds.len(),
        failed_feeds,
        args.output.display()
    );
    if let Some(stats) = run.extraction {
        print!(
            "; extracted {}/{} articles ({} failed, {} without link)",
            stats.extracted, stats.total, stats.failed, stats.skipped
        );
    }
    println!(" in {:.1}s", started.elapsed().as_secs_f64());

    Ok(())
}
