//! Generic element tree built from quick-xml events.
//!
//! The feed parser never looks at raw events; it decodes this tree into one
//! of the known feed shapes. Names are kept qualified (`content:encoded`,
//! `dc:date`) and lookups fall back to the local part, so documents that
//! pick unusual namespace prefixes still decode.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::parser::ParseError;

/// Maximum element nesting accepted before the document is rejected.
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name as written, e.g. `content:encoded`.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Direct text and CDATA content, trimmed segments joined with a space.
    pub text: String,
    pub children: Vec<XmlElement>,
    /// Text and children in document order, text untrimmed. Only needed to
    /// re-serialize mixed content (Atom `type="xhtml"`).
    pub content: Vec<XmlNode>,
}

/// One piece of an element's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Text(String),
    /// Index into [`XmlElement::children`].
    Element(usize),
}

/// Elements written without a closing tag when serialized as HTML.
const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "input", "meta", "link", "source", "wbr"];

impl XmlElement {
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Attribute by qualified name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First child with this exact qualified name, else the first whose
    /// local name matches the local part of `name`.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name).or_else(|| {
            let local = local_part(name);
            self.children.iter().find(|c| c.local_name() == local)
        })
    }

    /// All children with the given local name, in document order.
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.local_name() == local)
    }

    /// Trimmed text of a child, `None` when missing or blank.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(XmlElement::all_text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Own text followed by all descendant text.
    pub fn all_text(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.children {
            push_segment(&mut out, &child.all_text());
        }
        out
    }

    /// Content re-serialized as HTML markup, namespace prefixes and
    /// `xmlns` declarations dropped.
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        self.write_content(&mut out);
        out
    }

    fn write_content(&self, out: &mut String) {
        for node in &self.content {
            match node {
                XmlNode::Text(text) => out.push_str(&html_escape::encode_text(text)),
                XmlNode::Element(index) => {
                    if let Some(child) = self.children.get(*index) {
                        child.write_markup(out);
                    }
                }
            }
        }
    }

    fn write_markup(&self, out: &mut String) {
        let tag = self.local_name();
        out.push('<');
        out.push_str(tag);
        for (key, value) in &self.attributes {
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            out.push(' ');
            out.push_str(local_part(key));
            out.push_str("=\"");
            out.push_str(&html_escape::encode_double_quoted_attribute(value));
            out.push('"');
        }
        out.push('>');
        if VOID_ELEMENTS.contains(&tag) {
            return;
        }
        self.write_content(out);
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
}

fn local_part(name: &str) -> &str {
    match name.rsplit_once(':') {
        Some((_, local)) => local,
        None => name,
    }
}

fn push_segment(buf: &mut String, segment: &str) {
    if segment.is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push(' ');
    }
    buf.push_str(segment);
}

/// Parses a complete XML document into its root element.
///
/// # Errors
///
/// [`ParseError::Unparseable`] for malformed XML, mismatched tags, nesting
/// deeper than 256 levels, or a document with no root element.
///
/// # Security
///
/// quick-xml (0.37) never expands `<!ENTITY>` declarations, so external
/// entity tricks in hostile feeds have nothing to resolve.
pub fn parse_document(input: &str) -> Result<XmlElement, ParseError> {
    // Whitespace is kept so mixed content can be re-serialized faithfully;
    // `text` gets trimmed segments either way.
    let mut reader = Reader::from_str(input);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(ParseError::Unparseable(format!(
                        "nesting depth exceeds maximum of {MAX_DEPTH} levels"
                    )));
                }
                stack.push(element_from_start(&e, &reader));
            }
            Ok(Event::Empty(e)) => {
                let element = element_from_start(&e, &reader);
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ParseError::Unparseable("unbalanced closing tag".into()))?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    // Undeclared entities (&nbsp; in sloppy feeds) fail XML
                    // unescaping; keep the raw text and let HTML entity
                    // decoding handle it later.
                    let text = match t.unescape() {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => String::from_utf8_lossy(&t).into_owned(),
                    };
                    push_segment(&mut top.text, text.trim());
                    top.content.push(XmlNode::Text(text));
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    push_segment(&mut top.text, text.trim());
                    top.content.push(XmlNode::Text(text));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::Unparseable(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ParseError::Unparseable("unexpected end of document".into()));
    }
    root.ok_or_else(|| ParseError::Unparseable("document has no root element".into()))
}

fn element_from_start(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> XmlElement {
    let mut attributes = Vec::new();
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(err) => {
                tracing::debug!(error = %err, "Skipping malformed XML attribute");
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.decode_and_unescape_value(reader.decoder()) {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.push((key, value));
    }

    XmlElement {
        name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        attributes,
        text: String::new(),
        children: Vec::new(),
        content: Vec::new(),
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    if let Some(parent) = stack.last_mut() {
        parent.content.push(XmlNode::Element(parent.children.len()));
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_tree() {
        let root = parse_document(
            r#"<?xml version="1.0"?><a x="1"><b>hello</b><c/><b>again</b></a>"#,
        )
        .unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attr("x"), Some("1"));
        assert_eq!(root.children.len(), 3);
        assert_eq!(root.children_named("b").count(), 2);
        assert_eq!(root.child_text("b").as_deref(), Some("hello"));
        assert!(root.child_text("c").is_none());
    }

    #[test]
    fn test_prefixed_lookup_falls_back_to_local_name() {
        let root = parse_document(
            r#"<item xmlns:x="http://purl.org/rss/1.0/modules/content/"><x:encoded>body</x:encoded></item>"#,
        )
        .unwrap();
        assert_eq!(root.child_text("content:encoded").as_deref(), Some("body"));
        assert_eq!(root.children[0].local_name(), "encoded");
    }

    #[test]
    fn test_cdata_and_entities() {
        let root = parse_document(
            "<d><t>Tom &amp; Jerry</t><h><![CDATA[<p>markup</p>]]></h></d>",
        )
        .unwrap();
        assert_eq!(root.child_text("t").as_deref(), Some("Tom & Jerry"));
        assert_eq!(root.child_text("h").as_deref(), Some("<p>markup</p>"));
    }

    #[test]
    fn test_undeclared_entity_kept_raw() {
        let root = parse_document("<d><t>a&nbsp;b</t></d>").unwrap();
        assert_eq!(root.child_text("t").as_deref(), Some("a&nbsp;b"));
    }

    #[test]
    fn test_mixed_content_reserialized_in_order() {
        let root = parse_document(
            r#"<c><h:p xmlns:h="http://www.w3.org/1999/xhtml" class="lead"><h:b>Bold</h:b> then 1 &lt; 2<h:br/>end</h:p></c>"#,
        )
        .unwrap();
        assert_eq!(
            root.inner_markup(),
            r#"<p class="lead"><b>Bold</b> then 1 &lt; 2<br>end</p>"#
        );
        assert_eq!(root.children[0].text, "then 1 < 2 end");
    }

    #[test]
    fn test_whitespace_between_elements_not_in_text() {
        let root = parse_document("<a>\n  <b> padded </b>\n</a>").unwrap();
        assert_eq!(root.text, "");
        assert_eq!(root.child_text("b").as_deref(), Some("padded"));
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(matches!(
            parse_document("<not valid xml"),
            Err(ParseError::Unparseable(_))
        ));
        assert!(matches!(
            parse_document("<a><b></a>"),
            Err(ParseError::Unparseable(_))
        ));
        assert!(matches!(parse_document(""), Err(ParseError::Unparseable(_))));
    }

    #[test]
    fn test_depth_limit() {
        let deep = "<a>".repeat(MAX_DEPTH + 1) + &"</a>".repeat(MAX_DEPTH + 1);
        assert!(matches!(
            parse_document(&deep),
            Err(ParseError::Unparseable(_))
        ));
    }
}
