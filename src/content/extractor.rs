use std::time::Duration;

use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

use super::cleaner::clean_text;
use super::consent::{is_consent_page, is_consent_text, is_consent_url};
use super::readability::{block_text, extract_article, strip_boilerplate};
use super::sanitize::sanitize;
use crate::feed::{FetchError, Fetcher, Probe, RawDocument};
use crate::model::{ArticleBody, ExtractionOutcome, ExtractionRequest};
use crate::scheduler::ArticleExtractor;
use crate::util::{collapse_whitespace, host_matches, validate_url};

/// Hosts whose links are redirect wrappers around the publisher URL.
pub const AGGREGATOR_DOMAINS: &[&str] = &["news.google.com"];

/// Identity used while unwrapping aggregator redirects.
pub const RESOLVER_USER_AGENT: &str =
    concat!("feedshard/", env!("CARGO_PKG_VERSION"), " (redirect resolver)");

/// Sanitized HTML with at least this much text is preferred over plain text.
pub const MIN_HTML_TEXT_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Page fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub aggregator_domains: Vec<String>,
    pub resolver_user_agent: String,
    /// Probes made while unwrapping one aggregator link.
    pub max_resolve_hops: usize,
    /// Delay before the single retry of a failed extraction.
    pub retry_delay: Duration,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            aggregator_domains: AGGREGATOR_DOMAINS.iter().map(|d| d.to_string()).collect(),
            resolver_user_agent: RESOLVER_USER_AGENT.to_string(),
            max_resolve_hops: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Turns article URLs into clean article bodies.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    fetcher: Fetcher,
    settings: ExtractorSettings,
}

impl ContentExtractor {
    pub fn new(fetcher: Fetcher, settings: ExtractorSettings) -> Self {
        Self { fetcher, settings }
    }

    /// Extracts the article behind `request.link`.
    ///
    /// Never fails: anything that goes wrong leaves the outcome without a
    /// body, and callers fall back to the feed-provided content.
    pub async fn extract(&self, request: &ExtractionRequest) -> ExtractionOutcome {
        let original = match validate_url(&request.link) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(link = %request.link, error = %e, "Skipping extraction for invalid link");
                return ExtractionOutcome::default();
            }
        };

        let resolved = if request.is_aggregator_source
            && host_matches(&original, &self.settings.aggregator_domains)
        {
            self.resolve_aggregator(&original).await
        } else {
            None
        };

        let target = resolved.as_ref().unwrap_or(&original);
        let body = self.extract_with_retry(target, &request.title).await;

        ExtractionOutcome {
            resolved_link: resolved.map(String::from),
            body,
        }
    }

    /// Follows aggregator redirects until the first hop that leaves the
    /// aggregator's domains.
    ///
    /// Returns `None` when the chain never leaves the aggregator (within the
    /// hop bound) or a probe fails; the caller then keeps the original link.
    async fn resolve_aggregator(&self, start: &Url) -> Option<Url> {
        let mut current = start.clone();

        for hop in 1..=self.settings.max_resolve_hops {
            match self
                .fetcher
                .probe(&current, &self.settings.resolver_user_agent)
                .await
            {
                Ok(Probe::Redirect(next)) => {
                    if !host_matches(&next, &self.settings.aggregator_domains) {
                        tracing::debug!(from = %start, to = %next, hop, "Resolved aggregator link");
                        return Some(next);
                    }
                    current = next;
                }
                Ok(Probe::Final) => break,
                Err(e) => {
                    tracing::debug!(url = %current, error = %e, "Aggregator redirect probe failed");
                    return None;
                }
            }
        }

        tracing::debug!(url = %start, "Aggregator link did not resolve off-domain");
        None
    }

    async fn extract_with_retry(&self, url: &Url, title: &str) -> Option<ArticleBody> {
        match self.try_extract(url, title).await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(
                    url = %url,
                    error = %e,
                    delay_ms = self.settings.retry_delay.as_millis() as u64,
                    "Extraction failed, retrying once"
                );
                tokio::time::sleep(self.settings.retry_delay).await;
                match self.try_extract(url, title).await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::debug!(url = %url, error = %e, "Extraction gave up");
                        None
                    }
                }
            }
        }
    }

    async fn try_extract(&self, url: &Url, title: &str) -> Result<Option<ArticleBody>, ExtractError> {
        let page = self.fetcher.fetch_with_retry(url.as_str()).await?;
        Ok(process_page(&page, title))
    }
}

impl ArticleExtractor for ContentExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> ExtractionOutcome {
        ContentExtractor::extract(self, request).await
    }
}

/// Reduces a fetched page to an article body.
///
/// Consent walls yield `None`. Otherwise the readability winner is
/// sanitized and kept as HTML when it has enough text or any media; failing
/// that, the page text goes through [`clean_text`].
pub fn process_page(page: &RawDocument, title: &str) -> Option<ArticleBody> {
    let mut doc = Html::parse_document(&page.text);
    if is_consent_url(&page.url) || is_consent_page(&doc) {
        tracing::debug!(url = %page.url, "Consent wall detected");
        return None;
    }

    strip_boilerplate(&mut doc);
    let article = extract_article(&doc);

    let text = match &article {
        Some(article) => article.plain_text(),
        None => body_text(&doc),
    };
    if is_consent_text(&collapse_whitespace(&text)) {
        tracing::debug!(url = %page.url, "Extracted text looks like a consent dialog");
        return None;
    }

    if let Some(article) = &article {
        let sanitized = sanitize(&article.nodes, &page.url);
        if sanitized.text_chars >= MIN_HTML_TEXT_CHARS || sanitized.has_media {
            return Some(ArticleBody::Html(sanitized.html));
        }
    }

    clean_text(&text, title).map(ArticleBody::Text)
}

fn body_text(doc: &Html) -> String {
    Selector::parse("body")
        .ok()
        .and_then(|body| doc.select(&body).next().map(block_text))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Charset, FetchSettings};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const P1: &str = "The council approved the new budget on Tuesday after a long debate, officials said.";
    const P2: &str = "Members said the compromise protects both schools and public transport, and will last.";

    fn article_page() -> String {
        format!(
            r#"<html><head><title>Budget</title><script>var x = 1;</script></head><body>
                <nav><a href="/">Home</a> <a href="/world">World</a></nav>
                <div class="article-body">
                    <p>{P1}</p>
                    <img src="/images/council.jpg" alt="Council chamber">
                    <p>{P2}</p>
                </div>
                <div class="newsletter">Sign up for our newsletter today and never miss a story.</div>
                <footer>Imprint</footer>
            </body></html>"#
        )
    }

    fn test_extractor() -> ContentExtractor {
        let fetcher = Fetcher::new(FetchSettings {
            retry_delay: Duration::from_millis(10),
            ..FetchSettings::default()
        })
        .unwrap();
        ContentExtractor::new(
            fetcher,
            ExtractorSettings {
                aggregator_domains: vec!["127.0.0.1".to_string()],
                retry_delay: Duration::from_millis(10),
                ..ExtractorSettings::default()
            },
        )
    }

    fn request(link: String, aggregator: bool) -> ExtractionRequest {
        ExtractionRequest {
            link,
            title: "Budget".to_string(),
            is_aggregator_source: aggregator,
        }
    }

    fn raw(url: &str, text: &str) -> RawDocument {
        RawDocument {
            url: Url::parse(url).unwrap(),
            text: text.to_string(),
            charset: Charset::Utf8,
        }
    }

    #[test]
    fn test_process_page_prefers_sanitized_html() {
        let body = process_page(&raw("https://example.com/a/story", &article_page()), "Budget");
        let Some(ArticleBody::Html(html)) = body else {
            panic!("expected html body, got {body:?}");
        };
        assert!(html.contains(P1));
        assert!(html.contains(P2));
        assert!(html.contains(r#"src="https://example.com/images/council.jpg""#));
        assert!(!html.contains("Home"));
        assert!(!html.contains("newsletter"));
        assert!(!html.contains("Imprint"));
    }

    #[test]
    fn test_process_page_falls_back_to_clean_text() {
        let page = format!(
            "<html><body><section><p>Short teaser line here, yes.</p></section>\
             <div>{P1}</div><div>{P2}</div></body></html>"
        );
        let body = process_page(&raw("https://example.com/b", &page), "Budget");
        assert_eq!(body, Some(ArticleBody::Text(format!("{P1}\n\n{P2}"))));
    }

    #[test]
    fn test_consent_walls_rejected() {
        assert!(process_page(&raw("https://consent.example.com/?continue=x", &article_page()), "t").is_none());

        let wall = "<html><body><h1>Before you continue to Example</h1><p>We use cookies and data to deliver services.</p></body></html>";
        assert!(process_page(&raw("https://example.com/c", wall), "t").is_none());
    }

    #[test]
    fn test_article_with_consent_manager_script_kept() {
        let page = format!(
            r#"<html><head><title>Budget</title>
                <script>window.__cmp={{text:{{title:"We value your privacy",accept:"Accept all",reject:"Reject all"}}}};</script>
                <script>var cmpConfig={{cookie:"euconsent",labels:["Accept all","Reject all","Manage preferences","partners","personalised ads"]}};</script>
                </head><body><div class="article-body">
                <p>{P1}</p><p>{P2}</p><p>{P1}</p>
            </div></body></html>"#
        );
        let body = process_page(&raw("https://example.com/e", &page), "Budget");
        let Some(ArticleBody::Html(html)) = body else {
            panic!("expected html body, got {body:?}");
        };
        assert!(html.contains(P2));
        assert!(!html.contains("privacy"));
    }

    #[test]
    fn test_empty_page_yields_nothing() {
        assert!(process_page(&raw("https://example.com/d", "<html><body></body></html>"), "t").is_none());
    }

    #[tokio::test]
    async fn test_extract_fetches_and_extracts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/story"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(article_page(), "text/html; charset=utf-8"))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = test_extractor()
            .extract(&request(format!("{}/story", server.uri()), false))
            .await;
        assert!(outcome.resolved_link.is_none());
        assert!(matches!(outcome.body, Some(ArticleBody::Html(_))));
    }

    #[tokio::test]
    async fn test_extract_failure_is_absorbed_after_retry() {
        let server = MockServer::start().await;
        // Two extraction attempts, each a fetch with one retry.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(4)
            .mount(&server)
            .await;

        let outcome = test_extractor()
            .extract(&request(format!("{}/gone", server.uri()), false))
            .await;
        assert_eq!(outcome, ExtractionOutcome::default());
    }

    #[tokio::test]
    async fn test_invalid_link_skipped() {
        let outcome = test_extractor()
            .extract(&request("mailto:desk@example.com".to_string(), false))
            .await;
        assert_eq!(outcome, ExtractionOutcome::default());
    }

    #[tokio::test]
    async fn test_aggregator_link_resolved_off_domain() {
        let server = MockServer::start().await;
        let port = server.address().port();
        let publisher = format!("http://localhost:{port}/story");

        Mock::given(path("/rss/articles/abc"))
            .and(header("user-agent", RESOLVER_USER_AGENT))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/rss/articles/abc2"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/rss/articles/abc2"))
            .and(header("user-agent", RESOLVER_USER_AGENT))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", publisher.as_str()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/story"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(article_page(), "text/html"))
            .mount(&server)
            .await;

        let outcome = test_extractor()
            .extract(&request(format!("http://127.0.0.1:{port}/rss/articles/abc"), true))
            .await;
        assert_eq!(outcome.resolved_link.as_deref(), Some(publisher.as_str()));
    }

    #[tokio::test]
    async fn test_non_aggregator_items_never_probed() {
        let server = MockServer::start().await;
        Mock::given(path("/rss/articles/abc"))
            .and(header("user-agent", RESOLVER_USER_AGENT))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "https://elsewhere.example/"))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(path("/rss/articles/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(article_page(), "text/html"))
            .mount(&server)
            .await;

        let outcome = test_extractor()
            .extract(&request(format!("{}/rss/articles/abc", server.uri()), false))
            .await;
        assert!(outcome.resolved_link.is_none());
        assert!(outcome.body.is_some());
    }
}
