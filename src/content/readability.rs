//! Boilerplate stripping and readability-style main-content detection.
//!
//! Scoring follows the classic readability approach: every text block
//! votes for its parent (full score) and grandparent (half score), the
//! container with the highest link-density-adjusted score wins, and
//! siblings that look like part of the same article are pulled in.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::util::collapse_whitespace;

/// Articles with less text than this are discarded.
pub const MIN_ARTICLE_CHARS: usize = 50;

/// Text blocks shorter than this do not vote.
const MIN_PARAGRAPH_CHARS: usize = 25;

const BOILERPLATE_TAGS: &str = "script, style, noscript, nav, header, footer, aside, form";

/// Class/id tokens of non-content containers.
static BOILERPLATE_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|[\s_-])(?:ads?|advert\w*|advertisement|social|share|sharing|comments?|related|newsletter|promo|sponsored)(?:[\s_-]|$)",
    )
    .unwrap()
});

static POSITIVE_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)article|body|content|entry|hentry|main|page|post|text|blog|story").unwrap()
});

static NEGATIVE_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)comment|meta|footer|footnote|sidebar|sponsor|promo|related|share|social|widget|masthead|menu|nav|banner|combx|shoutbox|skyscraper",
    )
    .unwrap()
});

/// Elements whose boundaries become line breaks in plain-text output.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption", "figure",
    "h1", "h2", "h3", "h4", "h5", "h6", "hr", "li", "main", "ol", "p", "pre", "section", "table",
    "td", "th", "tr", "ul",
];

/// Removes non-content elements from the document in place.
///
/// Returns the number of detached subtrees.
pub fn strip_boilerplate(doc: &mut Html) -> usize {
    let mut doomed = Vec::new();

    if let Ok(selector) = Selector::parse(BOILERPLATE_TAGS) {
        doomed.extend(doc.select(&selector).map(|el| el.id()));
    }
    doomed.extend(
        doc.root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(is_boilerplate_container)
            .map(|el| el.id()),
    );

    let count = doomed.len();
    for id in doomed {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
    count
}

fn is_boilerplate_container(el: &ElementRef<'_>) -> bool {
    if matches!(el.value().name(), "html" | "body" | "article" | "main") {
        return false;
    }
    let class = el.value().attr("class").unwrap_or_default();
    let id = el.value().id().unwrap_or_default();
    BOILERPLATE_CLASS.is_match(class) || BOILERPLATE_CLASS.is_match(id)
}

/// The main content of a page: the winning container plus related siblings,
/// in document order.
#[derive(Debug)]
pub struct Article<'a> {
    pub nodes: Vec<ElementRef<'a>>,
    pub text_chars: usize,
}

impl Article<'_> {
    /// Plain text with one line per block element.
    pub fn plain_text(&self) -> String {
        self.nodes.iter().map(|node| block_text(*node)).collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    el: ElementRef<'a>,
    score: f64,
}

/// Finds the main article in a (stripped) document.
///
/// Returns `None` when the best content has fewer than
/// [`MIN_ARTICLE_CHARS`] characters of text.
pub fn extract_article(doc: &Html) -> Option<Article<'_>> {
    let candidates = score_candidates(doc);

    let best = candidates
        .iter()
        .copied()
        .max_by(|a, b| a.score.total_cmp(&b.score));

    let nodes = match best {
        Some(best) => with_siblings(best, &candidates),
        None => {
            let body = Selector::parse("body").ok()?;
            vec![doc.select(&body).next()?]
        }
    };

    let text_chars = nodes.iter().map(|n| text_of(*n).chars().count()).sum();
    if text_chars < MIN_ARTICLE_CHARS {
        tracing::debug!(text_chars, "Article text below minimum");
        return None;
    }
    Some(Article { nodes, text_chars })
}

fn score_candidates(doc: &Html) -> Vec<Candidate<'_>> {
    let mut candidates: Vec<Candidate<'_>> = Vec::new();
    let Ok(blocks) = Selector::parse("p, pre, td") else {
        return candidates;
    };

    for block in doc.select(&blocks) {
        let text = text_of(block);
        let len = text.chars().count();
        if len < MIN_PARAGRAPH_CHARS {
            continue;
        }
        let Some(parent) = block.parent().and_then(ElementRef::wrap) else {
            continue;
        };

        let commas = text.matches(',').count() as f64;
        let score = 1.0 + commas + (len as f64 / 100.0).floor().min(3.0);

        let idx = candidate_index(&mut candidates, parent);
        candidates[idx].score += score;

        if let Some(grandparent) = parent.parent().and_then(ElementRef::wrap) {
            let idx = candidate_index(&mut candidates, grandparent);
            candidates[idx].score += score / 2.0;
        }
    }

    for candidate in &mut candidates {
        candidate.score *= 1.0 - link_density(candidate.el);
    }
    candidates
}

fn candidate_index<'a>(candidates: &mut Vec<Candidate<'a>>, el: ElementRef<'a>) -> usize {
    if let Some(idx) = candidates.iter().position(|c| c.el == el) {
        return idx;
    }
    candidates.push(Candidate {
        el,
        score: tag_weight(el.value().name()) + class_weight(&el),
    });
    candidates.len() - 1
}

fn tag_weight(tag: &str) -> f64 {
    match tag {
        "div" => 5.0,
        "pre" | "td" | "blockquote" => 3.0,
        "address" | "ol" | "ul" | "dl" | "dd" | "dt" | "li" | "form" => -3.0,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" => -5.0,
        _ => 0.0,
    }
}

fn class_weight(el: &ElementRef<'_>) -> f64 {
    let mut weight = 0.0;
    for value in [el.value().attr("class"), el.value().id()].into_iter().flatten() {
        if NEGATIVE_CLASS.is_match(value) {
            weight -= 25.0;
        }
        if POSITIVE_CLASS.is_match(value) {
            weight += 25.0;
        }
    }
    weight
}

/// Share of an element's text that sits inside links.
fn link_density(el: ElementRef<'_>) -> f64 {
    let total = text_of(el).chars().count();
    if total == 0 {
        return 0.0;
    }
    let Ok(anchors) = Selector::parse("a") else {
        return 0.0;
    };
    let linked: usize = el
        .select(&anchors)
        .map(|a| text_of(a).chars().count())
        .sum();
    (linked as f64 / total as f64).min(1.0)
}

fn with_siblings<'a>(best: Candidate<'a>, candidates: &[Candidate<'a>]) -> Vec<ElementRef<'a>> {
    let Some(parent) = best.el.parent().and_then(ElementRef::wrap) else {
        return vec![best.el];
    };
    let threshold = (best.score * 0.2).max(10.0);

    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|sibling| {
            if *sibling == best.el {
                return true;
            }
            let scored = candidates
                .iter()
                .find(|c| c.el == *sibling)
                .is_some_and(|c| c.score >= threshold);
            scored || (sibling.value().name() == "p" && is_article_paragraph(*sibling))
        })
        .collect()
}

fn is_article_paragraph(p: ElementRef<'_>) -> bool {
    let text = text_of(p);
    let len = text.chars().count();
    let density = link_density(p);
    if len > 80 {
        density < 0.25
    } else {
        len > 0 && density == 0.0 && (text.contains(". ") || text.ends_with('.'))
    }
}

/// Whitespace-collapsed text of an element.
pub fn text_of(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// Text of an element with a line break at every block boundary.
pub fn block_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_block_text(el, &mut out);
    out
}

fn push_block_text(el: ElementRef<'_>, out: &mut String) {
    let block = BLOCK_TAGS.contains(&el.value().name());
    if block {
        out.push('\n');
    }
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    push_block_text(child_el, out);
                }
            }
            _ => {}
        }
    }
    if block {
        out.push('\n');
    }
}
