use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;

use super::xml::{parse_document, XmlElement};
use crate::model::ParsedItem;
use crate::util::{collapse_whitespace, decode_entities};

/// Title used when an entry has none.
pub const UNTITLED: &str = "Untitled";

/// Feed-title substrings (lowercase) marking aggregator feeds whose links
/// are redirect wrappers around the publisher URL.
pub const AGGREGATOR_MARKERS: &[&str] = &["google news"];

/// Feed-title substrings (lowercase) marking discussion sites, whose items
/// carry a separate comments-thread URL.
pub const DISCUSSION_MARKERS: &[&str] = &["hacker news", "lobsters", "reddit"];

/// Errors from turning a feed document into items.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Not well-formed XML.
    #[error("Unparseable document: {0}")]
    Unparseable(String),
    /// Well-formed XML, but not RSS 2.0, Atom or RDF.
    #[error("Unrecognized feed format (expected RSS 2.0, Atom or RDF)")]
    UnknownFormat,
}

/// The three supported feed shapes, each holding its entry elements.
#[derive(Debug)]
enum FeedDocument<'a> {
    Rss(Vec<&'a XmlElement>),
    Atom(Vec<&'a XmlElement>),
    Rdf(Vec<&'a XmlElement>),
}

impl<'a> FeedDocument<'a> {
    /// Tries RSS 2.0, then Atom, then RDF.
    fn decode(root: &'a XmlElement) -> Result<Self, ParseError> {
        Self::try_rss(root)
            .or_else(|| Self::try_atom(root))
            .or_else(|| Self::try_rdf(root))
            .ok_or(ParseError::UnknownFormat)
    }

    fn try_rss(root: &'a XmlElement) -> Option<Self> {
        if root.local_name() != "rss" {
            return None;
        }
        let channel = root.child("channel")?;
        Some(FeedDocument::Rss(channel.children_named("item").collect()))
    }

    fn try_atom(root: &'a XmlElement) -> Option<Self> {
        if root.local_name() != "feed" {
            return None;
        }
        Some(FeedDocument::Atom(root.children_named("entry").collect()))
    }

    fn try_rdf(root: &'a XmlElement) -> Option<Self> {
        if root.local_name() != "RDF" {
            return None;
        }
        Some(FeedDocument::Rdf(root.children_named("item").collect()))
    }

    fn entries(self, limit: usize) -> Vec<RawEntry> {
        match self {
            FeedDocument::Rss(items) => items.into_iter().take(limit).map(RawEntry::from_rss).collect(),
            FeedDocument::Atom(entries) => {
                entries.into_iter().take(limit).map(RawEntry::from_atom).collect()
            }
            FeedDocument::Rdf(items) => items.into_iter().take(limit).map(RawEntry::from_rdf).collect(),
        }
    }
}

/// Format-independent view of one entry before normalization.
#[derive(Debug, Default)]
struct RawEntry {
    id: Option<String>,
    title: Option<String>,
    link: Option<String>,
    encoded: Option<String>,
    content: Option<String>,
    description: Option<String>,
    summary: Option<String>,
    date: Option<String>,
    comments: Option<String>,
}

impl RawEntry {
    fn from_rss(item: &XmlElement) -> Self {
        Self {
            id: item.child_text("guid"),
            title: item.child_text("title"),
            link: item.child_text("link"),
            encoded: item.child_text("content:encoded"),
            content: None,
            description: item.child_text("description"),
            summary: item.child_text("summary"),
            date: item.child_text("pubDate").or_else(|| item.child_text("dc:date")),
            comments: item.child_text("comments"),
        }
    }

    fn from_atom(entry: &XmlElement) -> Self {
        Self {
            id: entry.child_text("id"),
            title: entry.child_text("title"),
            link: atom_link(entry),
            encoded: None,
            content: atom_text(entry, "content"),
            description: None,
            summary: atom_text(entry, "summary"),
            date: entry
                .child_text("updated")
                .or_else(|| entry.child_text("published")),
            comments: None,
        }
    }

    fn from_rdf(item: &XmlElement) -> Self {
        Self {
            id: item
                .attr("rdf:about")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            title: item.child_text("title"),
            link: item.child_text("link"),
            encoded: item.child_text("content:encoded"),
            content: None,
            description: item.child_text("description"),
            summary: None,
            date: item.child_text("dc:date"),
            comments: None,
        }
    }
}

/// Picks the `rel="alternate"` link, else the first one.
///
/// A link without `rel` is alternate by definition in Atom, but the first
/// explicit alternate wins over it.
/// Atom text construct. `type="xhtml"` content is inline markup rather
/// than text, so it is re-serialized without the wrapping `div`.
fn atom_text(entry: &XmlElement, name: &str) -> Option<String> {
    let element = entry.child(name)?;
    if element.attr("type") != Some("xhtml") {
        return entry.child_text(name);
    }

    let wrapper = match element.children.as_slice() {
        [only] if only.local_name() == "div" && element.text.is_empty() => only,
        _ => element,
    };
    Some(wrapper.inner_markup().trim().to_string()).filter(|s| !s.is_empty())
}

fn atom_link(entry: &XmlElement) -> Option<String> {
    let links: Vec<&XmlElement> = entry.children_named("link").collect();
    let chosen = links
        .iter()
        .find(|l| l.attr("rel") == Some("alternate"))
        .or_else(|| links.first())?;

    chosen
        .attr("href")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| Some(chosen.all_text().trim().to_string()).filter(|s| !s.is_empty()))
}

/// Source-level flags derived from the configured feed title.
#[derive(Debug, Clone, Copy, Default)]
struct Provenance {
    aggregator: bool,
    discussion: bool,
}

impl Provenance {
    fn for_feed(feed_title: &str) -> Self {
        let lower = feed_title.to_lowercase();
        Self {
            aggregator: AGGREGATOR_MARKERS.iter().any(|m| lower.contains(m)),
            discussion: DISCUSSION_MARKERS.iter().any(|m| lower.contains(m)),
        }
    }
}

/// Parses a feed document into at most `limit` normalized items.
///
/// Entries past `limit` are never decoded; the rest keep document order.
///
/// # Errors
///
/// - [`ParseError::Unparseable`] - malformed XML
/// - [`ParseError::UnknownFormat`] - XML that is not RSS 2.0, Atom or RDF
pub fn parse_feed(
    document: &str,
    feed_title: &str,
    limit: usize,
) -> Result<Vec<ParsedItem>, ParseError> {
    let root = parse_document(document)?;
    let entries = FeedDocument::decode(&root)?.entries(limit);
    let provenance = Provenance::for_feed(feed_title);

    Ok(entries
        .into_iter()
        .map(|entry| normalize(entry, feed_title, provenance))
        .collect())
}

fn normalize(entry: RawEntry, feed_title: &str, provenance: Provenance) -> ParsedItem {
    let title = entry
        .title
        .map(|t| collapse_whitespace(&decode_entities(&t)))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let content = [entry.encoded, entry.content, entry.description, entry.summary]
        .into_iter()
        .flatten()
        .find(|c| !c.trim().is_empty())
        .map(|c| decode_entities(c.trim()).into_owned())
        .unwrap_or_default();

    let id = entry
        .id
        .or_else(|| entry.link.clone())
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    let discussion_url = if provenance.discussion {
        entry.comments
    } else {
        None
    };

    ParsedItem {
        id,
        title,
        link: entry.link,
        content,
        published_at: entry.date.as_deref().map(parse_date).unwrap_or(0),
        feed_title: feed_title.to_string(),
        discussion_url,
        is_aggregator_source: provenance.aggregator,
        is_discussion_source: provenance.discussion,
    }
}

/// Parses a feed date into epoch milliseconds; `0` when unrecognized.
///
/// Accepts RFC 2822 (RSS), RFC 3339 (Atom, Dublin Core), and the
/// zone-less `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DD` forms some generators
/// emit (read as UTC).
pub fn parse_date(raw: &str) -> i64 {
    let s = raw.trim();
    if s.is_empty() {
        return 0;
    }

    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|dt| dt.timestamp_millis())
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|n| n.and_utc().timestamp_millis())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|n| n.and_utc().timestamp_millis())
        })
        .unwrap_or(0)
}
