//! Reduces extracted article nodes to a small, self-contained HTML subset.
//!
//! The article subtree is first converted into an owned [`Fragment`] tree:
//! allowed tags are kept without attributes, unknown wrappers are unwrapped,
//! images and embeds are rewritten. Empty elements are then pruned
//! bottom-up, and the result is serialized with escaped text and attributes.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Node};
use url::Url;

use crate::util::resolve_against;

/// Inline style bounding every image.
pub const IMAGE_STYLE: &str = "max-width:100%;height:auto;max-height:600px";

/// Fixed frame for video embeds.
pub const EMBED_WIDTH: &str = "560";
pub const EMBED_HEIGHT: &str = "315";

/// Tags kept as-is (attributes dropped).
const ALLOWED_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "blockquote", "pre", "code", "em",
    "strong", "b", "i", "u", "s", "sub", "sup", "figure", "figcaption", "table", "thead", "tbody",
    "tr", "td", "th", "dl", "dt", "dd",
];

const VOID_TAGS: &[&str] = &["img", "br", "hr"];
const MEDIA_TAGS: &[&str] = &["img", "iframe", "video"];

static YOUTUBE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:youtube(?:-nocookie)?\.com/(?:embed/|watch\?v=|v/|shorts/)|youtu\.be/)([A-Za-z0-9_-]{11})",
    )
    .unwrap()
});

static VIMEO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"vimeo\.com/(?:video/)?(\d+)").unwrap());

/// Words that mark an image as page chrome wherever they appear as a
/// token of a file name, class or id (`site-logo.svg`, `share-icon`).
const CHROME_TOKENS: &[&str] = &["icon", "icons", "favicon", "logo", "logos", "1x1", "spacer"];

/// Words that mark an image as chrome only as a whole path segment, file
/// stem, class token or leading host label (`/avatars/`, `pixel.gif`).
/// Inside longer names they are ordinary words (`tracking-the-storm.jpg`).
const CHROME_NAMES: &[&str] = &[
    "pixel", "tracking", "tracker", "beacon", "avatar", "avatars", "gravatar", "blank",
    "transparent",
];

/// Owned, already-sanitized HTML tree.
#[derive(Debug, Clone, PartialEq)]
enum Fragment {
    Text(String),
    Element {
        tag: &'static str,
        attrs: Vec<(&'static str, String)>,
        children: Vec<Fragment>,
    },
}

impl Fragment {
    fn leaf(tag: &'static str, attrs: Vec<(&'static str, String)>) -> Self {
        Fragment::Element {
            tag,
            attrs,
            children: Vec::new(),
        }
    }

    /// Whether this fragment keeps its parent from being pruned.
    fn is_substantial(&self) -> bool {
        match self {
            Fragment::Text(text) => !text.trim().is_empty(),
            Fragment::Element { tag, .. } => !matches!(*tag, "br" | "hr"),
        }
    }
}

/// Sanitized article markup plus what it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedHtml {
    pub html: String,
    /// Character count of all text, ignoring edge whitespace of each run.
    pub text_chars: usize,
    pub has_media: bool,
}

/// Sanitizes the given article nodes. Relative URLs resolve against `base`,
/// which should be the final URL the page was served from.
pub fn sanitize(nodes: &[ElementRef<'_>], base: &Url) -> SanitizedHtml {
    let mut fragments = Vec::new();
    for node in nodes {
        convert_element(*node, base, false, &mut fragments);
    }
    let fragments = prune(fragments);

    let mut html = String::new();
    let mut text_chars = 0;
    let mut has_media = false;
    for fragment in &fragments {
        render(fragment, &mut html);
        measure(fragment, &mut text_chars, &mut has_media);
    }

    SanitizedHtml {
        html: html.trim().to_string(),
        text_chars,
        has_media,
    }
}

fn convert_children(el: ElementRef<'_>, base: &Url, preformatted: bool, out: &mut Vec<Fragment>) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                let text = if preformatted {
                    text.to_string()
                } else {
                    squash_spaces(text)
                };
                if !text.is_empty() {
                    out.push(Fragment::Text(text));
                }
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    convert_element(child_el, base, preformatted, out);
                }
            }
            _ => {}
        }
    }
}

fn convert_element(el: ElementRef<'_>, base: &Url, preformatted: bool, out: &mut Vec<Fragment>) {
    match el.value().name() {
        "img" => out.extend(image(el, base)),
        "iframe" => out.extend(iframe_embed(el)),
        "video" => out.extend(native_video(el, base)),
        "br" => out.push(Fragment::leaf("br", Vec::new())),
        "hr" => out.push(Fragment::leaf("hr", Vec::new())),
        "a" => {
            let mut children = Vec::new();
            convert_children(el, base, preformatted, &mut children);
            let attrs = attr(&el, "href")
                .and_then(|href| resolve_against(base, href))
                .map(|url| vec![("href", url.to_string())])
                .unwrap_or_default();
            out.push(Fragment::Element {
                tag: "a",
                attrs,
                children,
            });
        }
        name => match ALLOWED_TAGS.iter().copied().find(|tag| *tag == name) {
            Some(tag) => {
                let mut children = Vec::new();
                convert_children(el, base, preformatted || tag == "pre", &mut children);
                out.push(Fragment::Element {
                    tag,
                    attrs: Vec::new(),
                    children,
                });
            }
            // Unknown wrapper: keep its content, drop the element.
            None => convert_children(el, base, preformatted, out),
        },
    }
}

fn attr<'a>(el: &ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value()
        .attr(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn image(el: ElementRef<'_>, base: &Url) -> Option<Fragment> {
    let raw = attr(&el, "data-src")
        .or_else(|| attr(&el, "data-lazy-src"))
        .or_else(|| attr(&el, "data-original"))
        .or_else(|| attr(&el, "src").filter(|src| !src.starts_with("data:")))?;
    let src = resolve_against(base, raw)?;

    if is_decorative(&el, &src) {
        return None;
    }

    let mut attrs = vec![("src", src.to_string())];
    if let Some(alt) = attr(&el, "alt") {
        attrs.push(("alt", alt.to_string()));
    }
    attrs.push(("style", IMAGE_STYLE.to_string()));
    Some(Fragment::leaf("img", attrs))
}

/// Tracking pixels, avatars, icons, logos and spacers. `alt` text is
/// never consulted; captions name whatever the photo shows.
fn is_decorative(el: &ElementRef<'_>, src: &Url) -> bool {
    let tiny = ["width", "height"]
        .iter()
        .any(|dim| matches!(attr(el, dim), Some("0" | "1" | "1px")));
    tiny || is_chrome_src(src)
        || [attr(el, "class"), attr(el, "id")]
            .into_iter()
            .flatten()
            .any(|value| {
                let value = value.to_ascii_lowercase();
                let found = tokens(&value).any(|t| CHROME_TOKENS.contains(&t) || CHROME_NAMES.contains(&t));
                found
            })
}

fn is_chrome_src(src: &Url) -> bool {
    let host = src.host_str().unwrap_or_default().to_ascii_lowercase();
    let chrome_host = host.split('.').any(|label| label == "gravatar")
        || host
            .split('.')
            .next()
            .is_some_and(|label| CHROME_NAMES.contains(&label));
    if chrome_host {
        return true;
    }

    src.path_segments().into_iter().flatten().any(|segment| {
        let segment = segment.to_ascii_lowercase();
        let stem = segment.split('.').next().unwrap_or_default();
        let found = CHROME_NAMES.contains(&stem) || tokens(stem).any(|t| CHROME_TOKENS.contains(&t));
        found
    })
}

fn tokens(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
}

/// Maps a YouTube or Vimeo URL (any of the usual shapes) to its canonical
/// embed URL.
pub fn canonical_embed(src: &str) -> Option<String> {
    if let Some(caps) = YOUTUBE.captures(src) {
        return Some(format!("https://www.youtube.com/embed/{}", &caps[1]));
    }
    VIMEO
        .captures(src)
        .map(|caps| format!("https://player.vimeo.com/video/{}", &caps[1]))
}

fn iframe_embed(el: ElementRef<'_>) -> Option<Fragment> {
    let src = attr(&el, "src").or_else(|| attr(&el, "data-src"))?;
    let Some(embed) = canonical_embed(src) else {
        tracing::trace!(src, "Dropping non-video iframe");
        return None;
    };
    Some(Fragment::leaf(
        "iframe",
        vec![
            ("src", embed),
            ("width", EMBED_WIDTH.to_string()),
            ("height", EMBED_HEIGHT.to_string()),
            ("frameborder", "0".to_string()),
            ("allowfullscreen", String::new()),
        ],
    ))
}

fn native_video(el: ElementRef<'_>, base: &Url) -> Option<Fragment> {
    let raw = attr(&el, "src").or_else(|| {
        el.children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "source")
            .find_map(|source| attr(&source, "src"))
    })?;
    let src = resolve_against(base, raw)?;

    let mut attrs = vec![
        ("src", src.to_string()),
        ("controls", String::new()),
        ("width", EMBED_WIDTH.to_string()),
        ("height", EMBED_HEIGHT.to_string()),
    ];
    if let Some(poster) = attr(&el, "poster").and_then(|p| resolve_against(base, p)) {
        attrs.push(("poster", poster.to_string()));
    }
    Some(Fragment::leaf("video", attrs))
}

/// Drops elements left without text or media. Runs post-order, so a
/// wrapper whose only child was pruned is pruned as well.
fn prune(fragments: Vec<Fragment>) -> Vec<Fragment> {
    fragments
        .into_iter()
        .filter_map(|fragment| match fragment {
            Fragment::Text(text) => Some(Fragment::Text(text)),
            Fragment::Element {
                tag,
                attrs,
                children,
            } => {
                let children = prune(children);
                let keep = MEDIA_TAGS.contains(&tag)
                    || matches!(tag, "br" | "hr")
                    || children.iter().any(Fragment::is_substantial);
                keep.then_some(Fragment::Element {
                    tag,
                    attrs,
                    children,
                })
            }
        })
        .collect()
}

fn render(fragment: &Fragment, out: &mut String) {
    match fragment {
        Fragment::Text(text) => out.push_str(&html_escape::encode_text(text)),
        Fragment::Element {
            tag,
            attrs,
            children,
        } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs {
                out.push(' ');
                out.push_str(name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(value));
                    out.push('"');
                }
            }
            out.push('>');
            if VOID_TAGS.contains(tag) {
                return;
            }
            for child in children {
                render(child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

fn measure(fragment: &Fragment, text_chars: &mut usize, has_media: &mut bool) {
    match fragment {
        Fragment::Text(text) => *text_chars += text.trim().chars().count(),
        Fragment::Element { tag, children, .. } => {
            if MEDIA_TAGS.contains(tag) {
                *has_media = true;
            }
            for child in children {
                measure(child, text_chars, has_media);
            }
        }
    }
}

/// Collapses whitespace runs to one space. Leading and trailing spaces
/// survive so inline neighbours stay separated.
fn squash_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scraper::{Html, Selector};

    fn run(body: &str) -> SanitizedHtml {
        let doc = Html::parse_document(&format!("<html><body><div id=\"a\">{body}</div></body></html>"));
        let sel = Selector::parse("#a").unwrap();
        let root = doc.select(&sel).next().unwrap();
        let base = Url::parse("https://example.com/news/story.html").unwrap();
        sanitize(&[root], &base)
    }

    #[test]
    fn test_keeps_allowed_and_unwraps_rest() {
        let out = run(r#"<section class="x"><p style="color:red">Hello <span>there</span> <strong>friend</strong></p></section>"#);
        assert_eq!(out.html, "<p>Hello there <strong>friend</strong></p>");
        assert!(!out.has_media);
    }

    #[test]
    fn test_text_is_escaped() {
        let out = run("<p>a &lt;script&gt; b &amp; c</p>");
        assert_eq!(out.html, "<p>a &lt;script&gt; b &amp; c</p>");
    }

    #[test]
    fn test_image_made_absolute_and_bounded() {
        let out = run(r#"<figure><img data-src="../img/photo.jpg" src="data:image/gif;base64,R0lG" alt="Harbour"></figure>"#);
        assert_eq!(
            out.html,
            format!(r#"<figure><img src="https://example.com/img/photo.jpg" alt="Harbour" style="{IMAGE_STYLE}"></figure>"#)
        );
        assert!(out.has_media);
    }

    #[test]
    fn test_decorative_images_dropped() {
        let out = run(
            r#"<p>Text body here.</p>
               <img src="/t.gif" width="1" height="1">
               <img src="/avatars/jane.png">
               <img src="/static/site-logo.svg">
               <img src="/x.png" class="share-icon">"#,
        );
        assert!(!out.html.contains("<img"));
        assert!(!out.has_media);
    }

    #[test]
    fn test_chrome_hosts_and_classes_dropped() {
        let out = run(
            r#"<p>Text body here.</p>
               <img src="https://pixel.wp.com/g.gif?blog=1">
               <img src="https://secure.gravatar.com/avatar/abc">
               <img src="/x.png" class="tracking-pixel">
               <img src="/images/1x1.gif">"#,
        );
        assert!(!out.html.contains("<img"));
    }

    #[test]
    fn test_editorial_photos_with_chrome_lookalike_names_kept() {
        let out = run(
            r#"<p>Text body here.</p>
               <img src="/photos/silicon-valley-office.jpg" alt="Silicon Valley offices">
               <img src="/photos/tracking-the-storm.jpg" alt="Tracking the storm">
               <img src="/film/still-03.jpg" alt="Avatar: The Way of Water" class="lexicon-photo">"#,
        );
        assert_eq!(out.html.matches("<img").count(), 3);
        assert!(out.html.contains("https://example.com/photos/silicon-valley-office.jpg"));
        assert!(out.has_media);
    }

    #[test]
    fn test_youtube_and_vimeo_normalized() {
        assert_eq!(
            canonical_embed("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=1").as_deref(),
            Some("https://www.youtube.com/embed/dQw4w9WgXcQ")
        );
        assert_eq!(
            canonical_embed("//www.youtube-nocookie.com/embed/dQw4w9WgXcQ?rel=0").as_deref(),
            Some("https://www.youtube.com/embed/dQw4w9WgXcQ")
        );
        assert_eq!(
            canonical_embed("https://youtu.be/dQw4w9WgXcQ").as_deref(),
            Some("https://www.youtube.com/embed/dQw4w9WgXcQ")
        );
        assert_eq!(
            canonical_embed("https://player.vimeo.com/video/76979871?h=abc").as_deref(),
            Some("https://player.vimeo.com/video/76979871")
        );
        assert!(canonical_embed("https://maps.example.com/embed").is_none());
    }

    #[test]
    fn test_iframes_rewritten_or_dropped() {
        let out = run(
            r#"<iframe src="https://www.youtube.com/embed/dQw4w9WgXcQ" width="100"></iframe>
               <iframe src="https://ads.example.com/slot"></iframe>"#,
        );
        assert_eq!(
            out.html,
            r#"<iframe src="https://www.youtube.com/embed/dQw4w9WgXcQ" width="560" height="315" frameborder="0" allowfullscreen></iframe>"#
        );
        assert!(out.has_media);
    }

    #[test]
    fn test_native_video_normalized() {
        let out = run(r#"<video autoplay><source src="/media/clip.mp4" type="video/mp4"></video>"#);
        assert_eq!(
            out.html,
            r#"<video src="https://example.com/media/clip.mp4" controls width="560" height="315"></video>"#
        );
    }

    #[test]
    fn test_empty_elements_pruned_recursively() {
        let out = run("<ul><li> </li><li><em></em></li></ul><p><br></p><p>kept</p>");
        assert_eq!(out.html, "<p>kept</p>");
        assert_eq!(out.text_chars, 4);
    }

    #[test]
    fn test_links_absolute_and_scripts_dropped() {
        let out = run(r#"<p><a href="/other" onclick="x()">more</a> <a href="javascript:alert(1)">bad</a></p>"#);
        assert_eq!(
            out.html,
            r#"<p><a href="https://example.com/other">more</a> <a>bad</a></p>"#
        );
    }

    #[test]
    fn test_preformatted_whitespace_kept() {
        let out = run("<pre>fn main() {\n    run();\n}</pre>");
        assert_eq!(out.html, "<pre>fn main() {\n    run();\n}</pre>");
    }
}
