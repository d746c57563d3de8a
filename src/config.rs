//! Feed list configuration.
//!
//! Loaded once at startup from TOML or JSON (chosen by file extension) and
//! passed by reference into the pipeline. Keys are camelCase in both
//! formats so one schema serves both:
//!
//! ```toml
//! articlesPerFeed = 10
//! fetchFullText = true
//!
//! [[categories]]
//! name = "Tech"
//!
//! [[categories.feeds]]
//! title = "Hacker News"
//! url = "https://news.ycombinator.com/rss"
//! articlesPerFeed = 30
//! ```
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::model::FeedSource;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid JSON in config file: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file exceeds the maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Default item cap per feed.
    pub articles_per_feed: usize,

    /// Whether to run full-text extraction (Phase B).
    pub fetch_full_text: bool,

    pub categories: Vec<Category>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            articles_per_feed: 10,
            fetch_full_text: false,
            categories: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub feeds: Vec<FeedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub title: String,
    pub url: String,
    /// Overrides [`Config::articles_per_feed`] for this feed.
    #[serde(default)]
    pub articles_per_feed: Option<usize>,
}

/// Serialization format of a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
}

impl Format {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Toml,
        }
    }

    fn known_keys(&self) -> &'static [&'static str] {
        &["articlesPerFeed", "fetchFullText", "categories"]
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML or JSON file.
    ///
    /// - `.json` extension → JSON, anything else → TOML
    /// - Missing or unreadable file → `Err(ConfigError::Io)`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid content → `Err(ConfigError::Toml)` / `Err(ConfigError::Json)`
    /// - Unknown top-level keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file is never pulled into memory.
        let meta = std::fs::metadata(path)?;
        if meta.len() > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "Config file is {} bytes (max {} bytes)",
                meta.len(),
                Self::MAX_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let format = Format::for_path(path);
        let config = Self::parse(&content, format)?;
        tracing::info!(
            path = %path.display(),
            categories = config.categories.len(),
            feeds = config.sources().len(),
            full_text = config.fetch_full_text,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn parse(content: &str, format: Format) -> Result<Self, ConfigError> {
        let top_level_keys: Vec<String> = match format {
            Format::Toml => content
                .parse::<toml::Table>()
                .map(|raw| raw.keys().cloned().collect())
                .unwrap_or_default(),
            Format::Json => serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(content)
                .map(|raw| raw.keys().cloned().collect())
                .unwrap_or_default(),
        };
        for key in &top_level_keys {
            if !format.known_keys().contains(&key.as_str()) {
                tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            }
        }

        Ok(match format {
            Format::Toml => toml::from_str(content)?,
            Format::Json => serde_json::from_str(content)?,
        })
    }

    /// Flattens categories into feed sources, in file order.
    pub fn sources(&self) -> Vec<FeedSource> {
        self.categories
            .iter()
            .flat_map(|category| {
                category.feeds.iter().map(|feed| FeedSource {
                    title: feed.title.clone(),
                    url: feed.url.clone(),
                    articles_per_feed: feed.articles_per_feed,
                    category_name: category.name.clone(),
                })
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.articles_per_feed, 10);
        assert!(!config.fetch_full_text);
        assert!(config.categories.is_empty());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&dir.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "feeds.toml", "   \n  ");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_full_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "feeds.toml",
            r#"
articlesPerFeed = 5
fetchFullText = true

[[categories]]
name = "Tech"

[[categories.feeds]]
title = "Hacker News"
url = "https://news.ycombinator.com/rss"
articlesPerFeed = 30

[[categories.feeds]]
title = "Lobsters"
url = "https://lobste.rs/rss"

[[categories]]
name = "World"

[[categories.feeds]]
title = "Google News"
url = "https://news.google.com/rss"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.articles_per_feed, 5);
        assert!(config.fetch_full_text);

        let sources = config.sources();
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].title, "Hacker News");
        assert_eq!(sources[0].category_name, "Tech");
        assert_eq!(sources[0].item_limit(config.articles_per_feed), 30);
        assert_eq!(sources[1].item_limit(config.articles_per_feed), 5);
        assert_eq!(sources[2].category_name, "World");
    }

    #[test]
    fn test_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "feeds.json",
            r#"{
                "fetchFullText": true,
                "categories": [
                    { "name": "News", "feeds": [{ "title": "Tagesschau", "url": "https://www.tagesschau.de/xml/rss2" }] }
                ]
            }"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.articles_per_feed, 10);
        assert!(config.fetch_full_text);
        assert_eq!(config.sources()[0].title, "Tagesschau");
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "feeds.toml", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "feeds.json", "{ \"categories\": [ }");
        assert!(matches!(Config::load(&path), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "feeds.toml", "articlesPerFeed = 3\nrefreshMinutes = 15\n");
        assert_eq!(Config::load(&path).unwrap().articles_per_feed, 3);
    }

    #[test]
    fn test_feed_without_url_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "feeds.toml",
            "[[categories]]\nname = \"Tech\"\n[[categories.feeds]]\ntitle = \"No URL\"\n",
        );
        assert!(matches!(Config::load(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "feeds.toml", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
    }
}
