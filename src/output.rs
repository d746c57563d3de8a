//! Snapshot assembly and persistence.
//!
//! One run produces three kinds of JSON files under the output directory:
//!
//! - `feeds-index.json`: categories, feeds and item headers, no bodies
//! - `feeds/<category>--<feed>.json`: one shard per feed with full items
//! - `feeds.json`: the legacy single-file snapshot with everything inline
//!
//! Every file is replaced whole (temp file + rename). There is no atomicity
//! across files; a crash between writes can leave the index and shards out
//! of step until the next run.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{EnrichedFeed, EnrichedItem};
use crate::util::slugify;

pub const INDEX_FILE: &str = "feeds-index.json";
pub const LEGACY_FILE: &str = "feeds.json";
pub const SHARD_DIR: &str = "feeds";

/// Slug used when a title has no usable characters.
const FALLBACK_SLUG: &str = "feed";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ============================================================================
// Document shapes
// ============================================================================

/// Fields shared by index entries and shard items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemHeader {
    pub id: String,
    pub title: String,
    /// Epoch milliseconds, `0` when unknown.
    pub date: i64,
    pub link: Option<String>,
    pub discussion_url: Option<String>,
    pub is_discussion_source: bool,
    pub is_aggregator_source: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardItem {
    #[serde(flatten)]
    pub header: ItemHeader,
    pub feed_title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,
    /// `"html"` or `"text"`, present exactly when `full_content` is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shard {
    pub title: String,
    pub last_updated: String,
    pub items: Vec<ShardItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFeed {
    pub title: String,
    pub url: String,
    /// Shard path relative to the output directory.
    pub file: String,
    pub count: usize,
    /// Read state lives in the client; every item starts unread.
    pub unread_count: usize,
    pub error: Option<String>,
    pub items: Vec<ItemHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCategory {
    pub name: String,
    pub feeds: Vec<IndexFeed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedsIndex {
    pub last_updated: String,
    pub categories: Vec<IndexCategory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyFeed {
    pub title: String,
    pub url: String,
    pub error: Option<String>,
    pub items: Vec<ShardItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyCategory {
    pub name: String,
    pub feeds: Vec<LegacyFeed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySnapshot {
    pub last_updated: String,
    pub categories: Vec<LegacyCategory>,
}

impl From<&EnrichedItem> for ShardItem {
    fn from(enriched: &EnrichedItem) -> Self {
        let item = &enriched.item;
        Self {
            header: ItemHeader {
                id: item.id.clone(),
                title: item.title.clone(),
                date: item.published_at,
                link: enriched.link().map(str::to_string),
                discussion_url: item.discussion_url.clone(),
                is_discussion_source: item.is_discussion_source,
                is_aggregator_source: item.is_aggregator_source,
            },
            feed_title: item.feed_title.clone(),
            content: item.content.clone(),
            full_content: enriched.full_content.as_ref().map(|b| b.as_str().to_string()),
            full_content_type: enriched.full_content.as_ref().map(|b| b.kind().to_string()),
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Everything one run writes, built in memory before any file is touched.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub index: FeedsIndex,
    /// Shard path (relative to the output directory) and content, one per
    /// indexed feed, in index order.
    pub shards: Vec<(String, Shard)>,
    pub legacy: LegacySnapshot,
}

impl Snapshot {
    /// Groups feeds by category in order of first appearance and assigns
    /// each feed a unique shard file name.
    pub fn build(feeds: &[EnrichedFeed], last_updated: DateTime<Utc>) -> Self {
        let last_updated = last_updated.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut names = ShardNames::default();

        let mut index = FeedsIndex {
            last_updated: last_updated.clone(),
            categories: Vec::new(),
        };
        let mut legacy = LegacySnapshot {
            last_updated: last_updated.clone(),
            categories: Vec::new(),
        };
        let mut shards = Vec::with_capacity(feeds.len());

        for feed in feeds {
            let category = &feed.source.category_name;
            let file = names.assign(category, &feed.source.title);
            let items: Vec<ShardItem> = feed.items.iter().map(ShardItem::from).collect();

            let slot = match index.categories.iter().position(|c| &c.name == category) {
                Some(slot) => slot,
                None => {
                    index.categories.push(IndexCategory {
                        name: category.clone(),
                        feeds: Vec::new(),
                    });
                    legacy.categories.push(LegacyCategory {
                        name: category.clone(),
                        feeds: Vec::new(),
                    });
                    index.categories.len() - 1
                }
            };

            index.categories[slot].feeds.push(IndexFeed {
                title: feed.source.title.clone(),
                url: feed.source.url.clone(),
                file: file.clone(),
                count: items.len(),
                unread_count: items.len(),
                error: feed.error.clone(),
                items: items.iter().map(|i| i.header.clone()).collect(),
            });
            legacy.categories[slot].feeds.push(LegacyFeed {
                title: feed.source.title.clone(),
                url: feed.source.url.clone(),
                error: feed.error.clone(),
                items: items.clone(),
            });
            shards.push((
                file,
                Shard {
                    title: feed.source.title.clone(),
                    last_updated: last_updated.clone(),
                    items,
                },
            ));
        }

        Self {
            index,
            shards,
            legacy,
        }
    }

    pub fn item_count(&self) -> usize {
        self.shards.iter().map(|(_, shard)| shard.items.len()).sum()
    }
}

/// Hands out `feeds/<category>--<feed>.json` names, suffixing repeats
/// with `-2`, `-3`, ... in the order they are requested.
#[derive(Debug, Default)]
struct ShardNames {
    taken: HashSet<String>,
}

impl ShardNames {
    fn assign(&mut self, category: &str, title: &str) -> String {
        let base = format!("{}--{}", slug_or_fallback(category), slug_or_fallback(title));
        let mut candidate = base.clone();
        let mut n = 1;
        while self.taken.contains(&candidate) {
            n += 1;
            candidate = format!("{base}-{n}");
        }
        self.taken.insert(candidate.clone());
        format!("{SHARD_DIR}/{candidate}.json")
    }
}

fn slug_or_fallback(title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

// ============================================================================
// Writing
// ============================================================================

/// Writes every shard, then the index, then the legacy snapshot.
///
/// Creates `dir` and `dir/feeds` as needed.
pub fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<(), OutputError> {
    let shard_dir = dir.join(SHARD_DIR);
    std::fs::create_dir_all(&shard_dir).map_err(|source| OutputError::Io {
        path: shard_dir.clone(),
        source,
    })?;

    for (file, shard) in &snapshot.shards {
        write_json(&dir.join(file), shard)?;
    }
    write_json(&dir.join(INDEX_FILE), &snapshot.index)?;
    write_json(&dir.join(LEGACY_FILE), &snapshot.legacy)?;

    tracing::info!(
        dir = %dir.display(),
        shards = snapshot.shards.len(),
        items = snapshot.item_count(),
        "Wrote snapshot"
    );
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), OutputError> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Replaces `path` with `contents` via a uniquely named sibling temp file.
fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));

    let result = (|| {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}
