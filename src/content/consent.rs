//! Consent and cookie-wall detection.
//!
//! Publishers in the EU often answer a first request with an interstitial
//! that hides the article until the visitor agrees to tracking. Extracting
//! from such a page yields cookie-policy prose, so these pages are treated
//! as "no content".

use scraper::{Html, Node};
use url::Url;

/// Phrases that only appear as the headline of a blocking consent page.
const WALL_PHRASES: &[&str] = &[
    // English
    "before you continue to",
    "we value your privacy",
    "this site asks for consent to use your data",
    // German
    "bevor sie fortfahren",
    "wir benötigen ihre zustimmung",
    "zustimmung erforderlich",
    // French
    "avant de continuer",
    "nous respectons votre vie privée",
    "votre consentement est requis",
];

/// Vocabulary common to consent dialogs. Ordinary cookie banners use some
/// of it too, so it only counts in volume. No entry may contain another
/// (`partner` also covers `partners`, `consent` covers `consentement`).
const CONSENT_VOCABULARY: &[&str] = &[
    // English
    "cookie",
    "consent",
    "accept all",
    "reject all",
    "manage preferences",
    "privacy settings",
    "partner",
    "legitimate interest",
    "personalised ads",
    "personalized ads",
    // German
    "zustimmen",
    "alle akzeptieren",
    "einwilligung",
    "datenschutzeinstellungen",
    "berechtigtes interesse",
    // French
    "tout accepter",
    "tout refuser",
    "paramètres de confidentialité",
    "partenaires",
    "intérêt légitime",
];

/// Distinct vocabulary hits that mark a page as a consent page.
const RAW_VOCABULARY_HITS: usize = 6;

/// Pages with more visible text than this carry an article, possibly
/// next to a non-blocking banner, and are never walls.
const WALL_PAGE_MAX_CHARS: usize = 5000;

/// Elements whose text never renders.
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Extracted text at or above this many characters is never treated as a
/// consent dialog; real articles that mention cookies are long.
const SHORT_TEXT_CHARS: usize = 1500;

/// Distinct vocabulary hits that mark short extracted text as consent prose.
const TEXT_VOCABULARY_HITS: usize = 3;

/// True when the final URL is a dedicated consent host (`consent.` subdomain).
pub fn is_consent_url(url: &Url) -> bool {
    url.host_str().is_some_and(|host| {
        let host = host.to_ascii_lowercase();
        host.starts_with("consent.") || host.contains(".consent.")
    })
}

/// Heuristic check of a fetched page, before any stripping.
///
/// Only visible text counts: consent managers ship their banner strings in
/// inline scripts on pages that show the article just fine. A page is a
/// wall when its visible text is short and carries either a wall headline
/// phrase or a large number of distinct consent terms.
pub fn is_consent_page(doc: &Html) -> bool {
    let text = visible_text(doc);
    if text.chars().count() > WALL_PAGE_MAX_CHARS {
        return false;
    }
    let lower = text.to_lowercase();
    WALL_PHRASES.iter().any(|p| lower.contains(p))
        || vocabulary_hits(&lower) >= RAW_VOCABULARY_HITS
}

/// All text of the document outside `script`, `style`, `noscript` and
/// `template`, whitespace-collapsed.
pub fn visible_text(doc: &Html) -> String {
    let mut out = String::new();
    for node in doc.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| INVISIBLE_TAGS.contains(&el.name()))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    crate::util::collapse_whitespace(&out)
}

/// Heuristic check of text that survived extraction.
pub fn is_consent_text(text: &str) -> bool {
    if text.chars().count() >= SHORT_TEXT_CHARS {
        return false;
    }
    let lower = text.to_lowercase();
    WALL_PHRASES.iter().any(|p| lower.contains(p))
        || vocabulary_hits(&lower) >= TEXT_VOCABULARY_HITS
}

fn vocabulary_hits(lower: &str) -> usize {
    CONSENT_VOCABULARY
        .iter()
        .filter(|term| lower.contains(*term))
        .count()
}
