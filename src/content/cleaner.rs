//! Plain-text fallback for pages whose markup did not survive sanitizing.
//!
//! Works line by line: short lines, metadata lines and junk (contact
//! details, dates, copyright and wire-service boilerplate, repeats of the
//! headline) are dropped, near-duplicates are removed, and what is left is
//! joined into paragraphs.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::util::collapse_whitespace;

/// Lines shorter than this (in characters) are dropped.
pub const MIN_LINE_CHARS: usize = 30;

/// Results shorter than this are not worth serving.
pub const MIN_RESULT_CHARS: usize = 100;

/// Lines below this letter density are treated as metadata...
const MIN_LETTER_DENSITY: f64 = 0.5;

/// ...unless they are at least this long.
const LONG_LINE_CHARS: usize = 200;

/// Prefix length used to detect repeated lines.
const DEDUPE_PREFIX_CHARS: usize = 60;

static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:https?://|www\.)\S+$").unwrap());

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").unwrap());

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?\(?\d{2,5}\)?[\s./-]\d{3,4}[\s.-]?\d{2,5}").unwrap()
});

static LEADING_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^(?:(?:updated|published|posted|aktualisiert|veröffentlicht|stand|publié|mis\ à\ jour)\s*:?\s*)?
        (?:
            \d{4}-\d{2}-\d{2}
          | \d{1,2}[./]\d{1,2}[./]\d{2,4}
          | \d{1,2}\.?\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec|jän|mär|mai|okt|dez|janv|févr|mars|avr|juin|juil|août|sept|déc)\w*\.?\s+\d{4}
          | (?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\w*\.?\s+\d{1,2},?\s+\d{4}
        )",
    )
    .unwrap()
});

/// A line that opens like a copyright notice or a photo/source credit.
static COPYRIGHT_NOTICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:©|\(c\)\s*\d{4}|copyright\s*(?:©|\(c\)|\d{4}))|^(?:photo|foto|bild|image|credit|source|quelle)s?\s*[:/]",
    )
    .unwrap()
});

/// Rights notices; only short lines carrying one are dropped.
static RIGHTS_RESERVED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)©|all rights reserved|alle rechte vorbehalten|tous droits réservés").unwrap()
});

/// Agency credits and byline blocks at the start of a line.
static WIRE_CREDIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:additional\s+)?(?:reporting|writing|editing)\s+by\b|mit material (?:von|der) (?:dpa|afp|reuters)\b)",
    )
    .unwrap()
});

/// Bare agency marker, dropped only on short lines.
static WIRE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\((?:reuters|ap|afp|dpa|apa|epd|kna|sda)\)").unwrap());

/// Dateline prefix such as `BERLIN (dpa) -` or `Reuters -`, stripped from
/// the lede while the rest of the line is kept.
static DATELINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:\p{Lu}[\p{L}.'-]*(?:\s+\p{Lu}[\p{L}.'-]*){0,3}\s*)?\((?i:reuters|ap|afp|dpa|apa|epd|kna|sda)\)\s*[-–—:]?|(?i:reuters|associated press|afp|dpa)\s*[-–—:])\s*",
    )
    .unwrap()
});

/// Notices and agency markers only disqualify lines shorter than this.
const SHORT_BOILERPLATE_CHARS: usize = 80;

/// Cleans extracted page text into blank-line separated paragraphs.
///
/// Returns `None` when fewer than 100 characters survive.
///
/// # Examples
///
/// ```
/// use feedshard::content::clean_text;
///
/// let text = "Council approves budget\n\
///     The council approved the new budget on Tuesday after a long debate.\n\
///     Members said the compromise protects both schools and public transport.\n\
///     Photo: Jane Doe";
/// let cleaned = clean_text(text, "Council approves budget").unwrap();
/// assert_eq!(cleaned.split("\n\n").count(), 2);
/// ```
pub fn clean_text(text: &str, title: &str) -> Option<String> {
    let title_key = comparison_key(title);
    let mut seen = HashSet::new();
    let mut paragraphs = Vec::new();

    for raw in text.lines() {
        let line = collapse_whitespace(raw);
        let line = DATELINE.replace(&line, "");
        let len = line.chars().count();

        if len < MIN_LINE_CHARS || is_junk(&line, &title_key) {
            continue;
        }
        if len <= LONG_LINE_CHARS && letter_density(&line) < MIN_LETTER_DENSITY {
            continue;
        }

        let prefix: String = line.to_lowercase().chars().take(DEDUPE_PREFIX_CHARS).collect();
        if !seen.insert(prefix) {
            continue;
        }
        paragraphs.push(line.into_owned());
    }

    let joined = paragraphs.join("\n\n");
    if joined.chars().count() < MIN_RESULT_CHARS {
        return None;
    }
    Some(joined)
}

fn is_junk(line: &str, title_key: &str) -> bool {
    BARE_URL.is_match(line)
        || EMAIL.is_match(line)
        || is_phone_line(line)
        || LEADING_DATE.is_match(line)
        || COPYRIGHT_NOTICE.is_match(line)
        || WIRE_CREDIT.is_match(line)
        || is_short_notice(line)
        || repeats_title(line, title_key)
}

/// Rights notices and agency markers are boilerplate on their own line
/// but ordinary words inside prose.
fn is_short_notice(line: &str) -> bool {
    line.chars().count() < SHORT_BOILERPLATE_CHARS
        && (RIGHTS_RESERVED.is_match(line) || WIRE_MARKER.is_match(line))
}

/// Phone numbers only disqualify short contact-style lines; prose can
/// contain digit groups that look alike.
fn is_phone_line(line: &str) -> bool {
    line.chars().count() < 80 && PHONE.is_match(line)
}

/// A line that is the title, or the title with a little decoration
/// ("Title - Site Name", "Title | Section").
fn repeats_title(line: &str, title_key: &str) -> bool {
    if title_key.is_empty() {
        return false;
    }
    let key = comparison_key(line);
    key == title_key || (key.starts_with(title_key) && key.len() <= title_key.len() + 20)
}

/// Lowercased letters and digits separated by single spaces.
fn comparison_key(s: &str) -> String {
    let lowered: String = s
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&lowered)
}

fn letter_density(line: &str) -> f64 {
    let mut letters = 0usize;
    let mut visible = 0usize;
    for c in line.chars().filter(|c| !c.is_whitespace()) {
        visible += 1;
        if c.is_alphabetic() {
            letters += 1;
        }
    }
    if visible == 0 {
        return 0.0;
    }
    letters as f64 / visible as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const P1: &str = "The council approved the new budget on Tuesday after a long debate.";
    const P2: &str = "Members said the compromise protects both schools and public transport.";

    #[test]
    fn test_keeps_prose_as_paragraphs() {
        let text = format!("{P1}\n{P2}\n");
        assert_eq!(clean_text(&text, "Budget").unwrap(), format!("{P1}\n\n{P2}"));
    }

    #[test]
    fn test_result_under_minimum_discarded() {
        assert!(clean_text(P1, "Budget").is_none());
    }

    #[test]
    fn test_title_line_dropped_case_insensitively() {
        let title = "City Council Approves Budget After Marathon Session";
        let text = format!("{}\n{P1}\n{P2}", title.to_uppercase());
        let cleaned = clean_text(&text, title).unwrap();
        assert!(!cleaned.to_lowercase().contains("marathon"));

        let decorated = format!("{title} | Local News\n{P1}\n{P2}");
        assert!(!clean_text(&decorated, title).unwrap().contains("Local News"));
    }

    #[test]
    fn test_short_lines_dropped() {
        let text = format!("Share\nRead more\n{P1}\n{P2}");
        assert_eq!(clean_text(&text, "x").unwrap(), format!("{P1}\n\n{P2}"));
    }

    #[test]
    fn test_junk_lines_dropped() {
        let junk = [
            "https://example.com/some/long/tracking/path?x=1",
            "Contact the newsroom at tips@example.com for corrections",
            "Call our desk: +49 30 1234 5678 any time",
            "2024-03-05 14:22 last updated by the web desk team",
            "Updated: March 5, 2024 at the request of the editors",
            "Copyright 2024 Example Media Group, all rights reserved",
            "Photo: Jane Doe for Example Media Group agency",
            "Example Media Group 2024 © - Impressum - Datenschutz",
            "Reporting by John Smith; Editing by Jane Doe and others",
            "Text und Fotos: (dpa) / Redaktion Berlin",
        ];
        let text = format!("{}\n{P1}\n{P2}", junk.join("\n"));
        assert_eq!(clean_text(&text, "x").unwrap(), format!("{P1}\n\n{P2}"));
    }

    #[test]
    fn test_prose_about_copyright_kept() {
        let lines = [
            "The court ruled on Tuesday that the publisher had infringed the photographer's copyright in three cases.",
            "Copyright holders welcomed the decision, saying it would make licensing for news images far simpler.",
            "Lawyers for the publisher said they would study the judgment before deciding whether to appeal it.",
        ];
        let text = lines.join("
");
        assert_eq!(clean_text(&text, "Court ruling").unwrap(), lines.join("

"));
    }

    #[test]
    fn test_dateline_stripped_and_lede_kept() {
        let text = format!(
            "BERLIN (dpa) - Die Verhandlungen über den Haushalt dauerten bis tief in die Nacht.
             Reuters - {P2}
             {P1}"
        );
        assert_eq!(
            clean_text(&text, "x").unwrap(),
            format!("Die Verhandlungen über den Haushalt dauerten bis tief in die Nacht.

{P2}

{P1}")
        );
    }

    #[test]
    fn test_agency_marker_inside_prose_kept() {
        let line = "Officials told the agency (dpa) on Monday that talks with the unions would resume next week.";
        let text = format!("{line}
{P1}");
        assert!(clean_text(&text, "x").unwrap().starts_with(line));
    }

    #[test]
    fn test_low_letter_density_dropped_unless_long() {
        let numbers = "12:30 | 14:45 | 16:00 | 18:15 | 20:30 | 22:45";
        let text = format!("{numbers}\n{P1}\n{P2}");
        assert_eq!(clean_text(&text, "x").unwrap(), format!("{P1}\n\n{P2}"));

        let long_table = "1,234 5,678 9,012 ".repeat(12) + "and a few words";
        let text = format!("{long_table}\n{P1}\n{P2}");
        assert!(clean_text(&text, "x").unwrap().starts_with("1,234"));
    }

    #[test]
    fn test_duplicate_prefix_dropped() {
        let text = format!("{P1}\n{P2}\n{P1} Again, with a different ending.");
        assert_eq!(clean_text(&text, "x").unwrap(), format!("{P1}\n\n{P2}"));
    }

    #[test]
    fn test_letter_density() {
        assert!((letter_density("ab12") - 0.5).abs() < f64::EPSILON);
        assert_eq!(letter_density("   "), 0.0);
    }
}
