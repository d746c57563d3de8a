use crate::util::{resolve_against, validate_url};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_BODY_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 5;

/// Browser-like user agent; several publishers serve bots a stripped page.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Errors that can occur while fetching a feed or article page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Response status 400 or above
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded its deadline (15s for pages, 10s for redirect probes)
    #[error("Request timed out")]
    Timeout,
    /// Every hop redirected and the bound was reached
    #[error("Too many redirects (followed {0})")]
    TooManyRedirects(usize),
    /// URL (or a Location header) was not a fetchable http(s) URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Character encoding used to turn response bytes into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Latin1,
}

/// Decoded response body plus where it actually came from.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Final URL after following redirects.
    pub url: Url,
    pub text: String,
    pub charset: Charset,
}

/// Result of a single non-following request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// 3xx with a Location header, resolved to an absolute URL.
    Redirect(Url),
    /// Anything below 400 that is not a redirect.
    Final,
}

/// Timeouts, retry delay and identity for outbound requests.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    pub page_timeout: Duration,
    pub probe_timeout: Duration,
    pub max_redirects: usize,
    pub retry_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            page_timeout: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(10),
            max_redirects: MAX_REDIRECTS,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// HTTP client that follows redirects by hand.
///
/// reqwest's own redirect policy is disabled so the hop bound, relative
/// `Location` resolution and the final URL are all under our control. The
/// final URL matters: article extraction resolves relative image paths
/// against it.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl Fetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetches `url` and decodes the body, following up to 5 redirects.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - not an http(s) URL, or a bad Location
    /// - [`FetchError::TooManyRedirects`] - a redirect arrived after 5 hops
    /// - [`FetchError::HttpStatus`] - status 400 or above
    /// - [`FetchError::Timeout`] - redirects plus body took longer than the
    ///   page timeout (one deadline for the whole fetch)
    /// - [`FetchError::Network`] - transport failure
    /// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`]
    pub async fn fetch(&self, url: &str) -> Result<RawDocument, FetchError> {
        let start =
            validate_url(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

        // One deadline covers every hop and the body read.
        tokio::time::timeout(self.settings.page_timeout, self.follow(start))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    async fn follow(&self, start: Url) -> Result<RawDocument, FetchError> {
        let mut current = start;
        let mut hops = 0;

        loop {
            let response = self.send(&current, None).await?;
            let status = response.status();

            if status.is_redirection() {
                if let Some(location) = location_header(&response) {
                    if hops >= self.settings.max_redirects {
                        return Err(FetchError::TooManyRedirects(hops));
                    }
                    let next = resolve_against(&current, &location)
                        .ok_or_else(|| FetchError::InvalidUrl(location.clone()))?;
                    tracing::debug!(from = %current, to = %next, hop = hops + 1, "Following redirect");
                    current = next;
                    hops += 1;
                    continue;
                }
            }

            if status.as_u16() >= 400 {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            let charset = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(charset_from_content_type)
                .unwrap_or(Charset::Utf8);

            let bytes = read_limited_bytes(response, MAX_BODY_SIZE).await?;

            return Ok(RawDocument {
                url: current,
                text: decode_body(&bytes, charset),
                charset,
            });
        }
    }

    /// [`fetch`](Self::fetch) with exactly one retry after a flat delay.
    ///
    /// Any error triggers the retry; the second error is returned as-is.
    pub async fn fetch_with_retry(&self, url: &str) -> Result<RawDocument, FetchError> {
        match self.fetch(url).await {
            Ok(doc) => Ok(doc),
            Err(e) => {
                tracing::warn!(
                    url = %url,
                    error = %e,
                    delay_ms = self.settings.retry_delay.as_millis() as u64,
                    "Fetch failed, retrying once"
                );
                tokio::time::sleep(self.settings.retry_delay).await;
                self.fetch(url).await
            }
        }
    }

    /// Issues one request without following redirects.
    ///
    /// Uses the shorter probe timeout and the given user agent. The body is
    /// never read.
    pub async fn probe(&self, url: &Url, user_agent: &str) -> Result<Probe, FetchError> {
        let response = tokio::time::timeout(
            self.settings.probe_timeout,
            self.send(url, Some(user_agent)),
        )
        .await
        .map_err(|_| FetchError::Timeout)??;
        let status = response.status();

        if status.is_redirection() {
            if let Some(location) = location_header(&response) {
                return resolve_against(url, &location)
                    .map(Probe::Redirect)
                    .ok_or(FetchError::InvalidUrl(location));
            }
        }

        if status.as_u16() >= 400 {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        Ok(Probe::Final)
    }

    async fn send(&self, url: &Url, user_agent: Option<&str>) -> Result<reqwest::Response, FetchError> {
        let mut request = self.client.get(url.clone());
        if let Some(agent) = user_agent {
            request = request.header(reqwest::header::USER_AGENT, agent);
        }

        request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e)
            }
        })
    }
}

fn location_header(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
}

/// Picks the charset declared in a `Content-Type` header value.
///
/// Latin-1 aliases map to [`Charset::Latin1`]; anything else, including a
/// missing parameter, is treated as UTF-8.
pub fn charset_from_content_type(content_type: &str) -> Charset {
    let declared = content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase())
    });

    match declared.as_deref() {
        Some("iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "latin-1" | "l1") => {
            Charset::Latin1
        }
        _ => Charset::Utf8,
    }
}

/// Decodes response bytes. Invalid UTF-8 sequences become U+FFFD rather
/// than failing the whole document.
pub fn decode_body(bytes: &[u8], charset: Charset) -> String {
    match charset {
        Charset::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
