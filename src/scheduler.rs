//! Two-phase pipeline orchestration.
//!
//! Phase A fetches and parses every configured feed concurrently. Phase B,
//! when full-text extraction is enabled, runs every item through a fixed
//! pool of extraction workers fed from a channel. Phase B never starts
//! before Phase A has finished.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};

use crate::config::Config;
use crate::feed::{parse_feed, Fetcher};
use crate::model::{
    EnrichedFeed, EnrichedItem, ExtractionOutcome, ExtractionRequest, FeedSource, FetchResult,
};

/// Size of the Phase B worker pool.
pub const EXTRACTION_WORKERS: usize = 10;

/// Progress is logged every this many completed extractions.
const PROGRESS_INTERVAL: usize = 10;

/// Anything that can turn an article link into an [`ExtractionOutcome`].
///
/// Implemented by [`ContentExtractor`](crate::content::ContentExtractor);
/// tests substitute their own.
pub trait ArticleExtractor {
    fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> impl Future<Output = ExtractionOutcome> + Send;
}

/// Counters for one Phase B run. `extracted + failed + skipped == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub extracted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
}

/// Everything a run produced, in configuration order.
#[derive(Debug)]
pub struct RunOutput {
    pub feeds: Vec<EnrichedFeed>,
    /// `None` when full-text extraction was disabled.
    pub extraction: Option<ExtractionStats>,
}

// ============================================================================
// Phase A
// ============================================================================

/// Fetches and parses all sources concurrently.
///
/// Returns exactly one [`FetchResult`] per source, in the order given. A
/// failing feed records its error and never affects the others.
pub async fn fetch_all(
    fetcher: &Fetcher,
    sources: &[FeedSource],
    default_limit: usize,
) -> Vec<FetchResult> {
    join_all(
        sources
            .iter()
            .map(|source| fetch_one(fetcher, source, default_limit)),
    )
    .await
}

async fn fetch_one(fetcher: &Fetcher, source: &FeedSource, default_limit: usize) -> FetchResult {
    let limit = source.item_limit(default_limit);

    let parsed = match fetcher.fetch_with_retry(&source.url).await {
        Ok(document) => {
            parse_feed(&document.text, &source.title, limit).map_err(|e| e.to_string())
        }
        Err(e) => Err(e.to_string()),
    };

    match parsed {
        Ok(items) => {
            tracing::info!(feed = %source.title, items = items.len(), "Fetched feed");
            FetchResult::success(source.clone(), items)
        }
        Err(error) => {
            tracing::warn!(feed = %source.title, url = %source.url, error = %error, "Feed failed");
            FetchResult::failure(source.clone(), error)
        }
    }
}

// ============================================================================
// Phase B
// ============================================================================

#[derive(Debug)]
struct WorkItem {
    feed: usize,
    item: usize,
    /// `None` for items without a link.
    request: Option<ExtractionRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Extracted,
    Failed,
    Skipped,
}

#[derive(Debug)]
struct Completed {
    feed: usize,
    item: usize,
    status: Status,
    outcome: ExtractionOutcome,
}

/// Runs every item of every successful feed through `extractor` using
/// `workers` concurrent consumers of one shared queue.
///
/// At most `workers` extractions are outstanding at any time. Items keep
/// their feed and position; only the wrapping changes.
pub async fn extract_all<E: ArticleExtractor>(
    extractor: &E,
    results: Vec<FetchResult>,
    workers: usize,
) -> (Vec<EnrichedFeed>, ExtractionStats) {
    let total: usize = results.iter().map(|r| r.items.len()).sum();
    let workers = workers.max(1);

    let (tx, rx) = mpsc::unbounded_channel();
    for (feed, result) in results.iter().enumerate() {
        for (item, parsed) in result.items.iter().enumerate() {
            let work = WorkItem {
                feed,
                item,
                request: ExtractionRequest::for_item(parsed),
            };
            if tx.send(work).is_err() {
                break;
            }
        }
    }
    // Workers stop once the queue is drained and no sender remains.
    drop(tx);

    tracing::info!(items = total, workers, "Extracting full text");

    let queue = Mutex::new(rx);
    let progress = AtomicUsize::new(0);
    let batches = join_all(
        (0..workers).map(|_| run_worker(extractor, &queue, &progress, total)),
    )
    .await;

    let mut stats = ExtractionStats {
        total,
        ..ExtractionStats::default()
    };
    let mut outcomes: Vec<Vec<Option<ExtractionOutcome>>> = results
        .iter()
        .map(|r| vec![None; r.items.len()])
        .collect();

    for done in batches.into_iter().flatten() {
        match done.status {
            Status::Extracted => stats.extracted += 1,
            Status::Failed => stats.failed += 1,
            Status::Skipped => stats.skipped += 1,
        }
        outcomes[done.feed][done.item] = Some(done.outcome);
    }

    let feeds = results
        .into_iter()
        .zip(outcomes)
        .map(|(result, feed_outcomes)| EnrichedFeed {
            source: result.source,
            items: result
                .items
                .into_iter()
                .zip(feed_outcomes)
                .map(|(item, outcome)| EnrichedItem::with_outcome(item, outcome.unwrap_or_default()))
                .collect(),
            error: result.error,
        })
        .collect();

    (feeds, stats)
}

async fn run_worker<E: ArticleExtractor>(
    extractor: &E,
    queue: &Mutex<mpsc::UnboundedReceiver<WorkItem>>,
    progress: &AtomicUsize,
    total: usize,
) -> Vec<Completed> {
    let mut completed = Vec::new();

    loop {
        let next = queue.lock().await.recv().await;
        let Some(work) = next else {
            break;
        };

        let (status, outcome) = match &work.request {
            Some(request) => {
                let outcome = extractor.extract(request).await;
                let status = if outcome.body.is_some() {
                    Status::Extracted
                } else {
                    Status::Failed
                };
                (status, outcome)
            }
            None => (Status::Skipped, ExtractionOutcome::default()),
        };

        let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
        if done % PROGRESS_INTERVAL == 0 || done == total {
            tracing::info!(done, total, "Extraction progress");
        }

        completed.push(Completed {
            feed: work.feed,
            item: work.item,
            status,
            outcome,
        });
    }

    completed
}

// ============================================================================
// Pipeline
// ============================================================================

/// Runs Phase A, then Phase B when `config.fetch_full_text` is set.
pub async fn run<E: ArticleExtractor>(
    config: &Config,
    fetcher: &Fetcher,
    extractor: &E,
) -> RunOutput {
    let sources = config.sources();
    tracing::info!(feeds = sources.len(), "Fetching feeds");
    let results = fetch_all(fetcher, &sources, config.articles_per_feed).await;

    if !config.fetch_full_text {
        return RunOutput {
            feeds: results.into_iter().map(EnrichedFeed::from).collect(),
            extraction: None,
        };
    }

    let (feeds, stats) = extract_all(extractor, results, EXTRACTION_WORKERS).await;
    tracing::info!(
        extracted = stats.extracted,
        failed = stats.failed,
        skipped = stats.skipped,
        total = stats.total,
        "Extraction finished"
    );
    RunOutput {
        feeds,
        extraction: Some(stats),
    }
}
