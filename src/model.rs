//! Data types passed between the pipeline stages.
//!
//! Items go through two phases: the feed parser produces immutable
//! [`ParsedItem`]s, and the extraction phase wraps each one in an
//! [`EnrichedItem`] instead of mutating it in place.

// ============================================================================
// Sources
// ============================================================================

/// One configured feed, flattened out of its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    pub title: String,
    pub url: String,
    /// Per-source override of the global item cap.
    pub articles_per_feed: Option<usize>,
    pub category_name: String,
}

impl FeedSource {
    /// Item cap for this source, falling back to the configured default.
    pub fn item_limit(&self, default: usize) -> usize {
        self.articles_per_feed.unwrap_or(default)
    }
}

// ============================================================================
// Items
// ============================================================================

/// A feed entry normalized across RSS 2.0, Atom and RDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    /// guid/id, else link, else a random token. Uniqueness is best effort.
    pub id: String,
    /// Never empty; `"Untitled"` when the feed omitted it.
    pub title: String,
    pub link: Option<String>,
    /// Feed-provided body; empty string when the entry carried none.
    pub content: String,
    /// Epoch milliseconds, `0` when absent or unparseable.
    pub published_at: i64,
    pub feed_title: String,
    /// Discussion-thread URL, kept apart from the article link.
    pub discussion_url: Option<String>,
    pub is_aggregator_source: bool,
    pub is_discussion_source: bool,
}

/// Full article content produced by the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleBody {
    /// Sanitized markup with media.
    Html(String),
    /// Cleaned paragraphs separated by blank lines.
    Text(String),
}

impl ArticleBody {
    pub fn as_str(&self) -> &str {
        match self {
            ArticleBody::Html(s) | ArticleBody::Text(s) => s,
        }
    }

    /// Format tag written next to the body in shard files.
    pub fn kind(&self) -> &'static str {
        match self {
            ArticleBody::Html(_) => "html",
            ArticleBody::Text(_) => "text",
        }
    }
}

/// A parsed item plus whatever the extraction phase found for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedItem {
    pub item: ParsedItem,
    /// Publisher URL behind an aggregator redirect link.
    pub resolved_link: Option<String>,
    /// Absent when extraction was skipped or failed.
    pub full_content: Option<ArticleBody>,
}

impl EnrichedItem {
    pub fn unenriched(item: ParsedItem) -> Self {
        Self {
            item,
            resolved_link: None,
            full_content: None,
        }
    }

    pub fn with_outcome(item: ParsedItem, outcome: ExtractionOutcome) -> Self {
        Self {
            item,
            resolved_link: outcome.resolved_link,
            full_content: outcome.body,
        }
    }

    /// The link consumers should follow: resolved publisher URL if any.
    pub fn link(&self) -> Option<&str> {
        self.resolved_link.as_deref().or(self.item.link.as_deref())
    }
}

// ============================================================================
// Per-feed results
// ============================================================================

/// Outcome of fetching and parsing one source. Exactly one per source.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub source: FeedSource,
    /// Empty whenever `error` is set.
    pub items: Vec<ParsedItem>,
    pub error: Option<String>,
}

impl FetchResult {
    pub fn success(source: FeedSource, items: Vec<ParsedItem>) -> Self {
        Self {
            source,
            items,
            error: None,
        }
    }

    pub fn failure(source: FeedSource, error: impl ToString) -> Self {
        Self {
            source,
            items: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// A [`FetchResult`] after the extraction phase.
#[derive(Debug, Clone)]
pub struct EnrichedFeed {
    pub source: FeedSource,
    pub items: Vec<EnrichedItem>,
    pub error: Option<String>,
}

impl From<FetchResult> for EnrichedFeed {
    fn from(result: FetchResult) -> Self {
        Self {
            source: result.source,
            items: result
                .items
                .into_iter()
                .map(EnrichedItem::unenriched)
                .collect(),
            error: result.error,
        }
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// What the extractor needs to know about one item.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub link: String,
    pub title: String,
    pub is_aggregator_source: bool,
}

impl ExtractionRequest {
    /// `None` for items without a link; those are skipped, not failed.
    pub fn for_item(item: &ParsedItem) -> Option<Self> {
        item.link.as_ref().map(|link| Self {
            link: link.clone(),
            title: item.title.clone(),
            is_aggregator_source: item.is_aggregator_source,
        })
    }
}

/// Result of extracting one item. Extraction never fails the item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub resolved_link: Option<String>,
    pub body: Option<ArticleBody>,
}
