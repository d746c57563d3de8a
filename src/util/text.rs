use std::borrow::Cow;

/// Decodes HTML entities (named, decimal, and hexadecimal references).
///
/// Feed producers routinely double-encode titles and descriptions, so text
/// that already went through XML unescaping still carries `&amp;`,
/// `&#8217;` and friends. Decoding is idempotent on text that contains no
/// entity references.
///
/// Returns `Cow::Borrowed` when the input has no `&` (the common case).
///
/// # Examples
///
/// ```
/// use feedshard::util::decode_entities;
///
/// assert_eq!(decode_entities("A &amp; B"), "A & B");
/// assert_eq!(decode_entities("caf&#233;"), "café");
/// assert_eq!(decode_entities("a &#x2014; b"), "a — b");
/// assert_eq!(decode_entities("plain"), "plain");
/// ```
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    html_escape::decode_html_entities(s)
}

/// Transliterations applied before slugification.
const TRANSLITERATIONS: &[(char, &str)] = &[
    ('ä', "ae"),
    ('ö', "oe"),
    ('ü', "ue"),
    ('ß', "ss"),
    ('à', "a"),
    ('á', "a"),
    ('â', "a"),
    ('å', "a"),
    ('æ', "ae"),
    ('ç', "c"),
    ('è', "e"),
    ('é', "e"),
    ('ê', "e"),
    ('ë', "e"),
    ('ì', "i"),
    ('í', "i"),
    ('î', "i"),
    ('ï', "i"),
    ('ñ', "n"),
    ('ò', "o"),
    ('ó', "o"),
    ('ô', "o"),
    ('ø', "o"),
    ('ù', "u"),
    ('ú', "u"),
    ('û', "u"),
    ('ý', "y"),
];

/// Converts a title into a stable file-name fragment.
///
/// Lowercases, applies a small transliteration table for accented Latin
/// letters, collapses every run of non-alphanumeric characters into a single
/// `-`, and trims leading/trailing separators. Characters outside ASCII that
/// have no transliteration count as separators.
///
/// Returns an empty string when nothing alphanumeric survives; callers pick
/// their own fallback.
///
/// # Examples
///
/// ```
/// use feedshard::util::slugify;
///
/// assert_eq!(slugify("Süddeutsche Zeitung"), "sueddeutsche-zeitung");
/// assert_eq!(slugify("  Hacker News: Front Page!! "), "hacker-news-front-page");
/// assert_eq!(slugify("Café Société"), "cafe-societe");
/// ```
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_separator = false;

    for c in s.chars().flat_map(char::to_lowercase) {
        let mapped: Option<Cow<'static, str>> = if c.is_ascii_alphanumeric() {
            Some(Cow::Owned(c.to_string()))
        } else {
            TRANSLITERATIONS
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| Cow::Borrowed(*to))
        };

        match mapped {
            Some(text) => {
                if pending_separator && !out.is_empty() {
                    out.push('-');
                }
                pending_separator = false;
                out.push_str(&text);
            }
            None => pending_separator = true,
        }
    }

    out
}

/// Collapses all whitespace runs to single spaces and trims the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
