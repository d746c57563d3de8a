use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a URL string for use as a fetch target.
///
/// Only `http` and `https` URLs with a host are accepted. Feed and article
/// URLs come from configuration and from remote feed documents, so anything
/// else (`file://`, `javascript:`, `mailto:`) is rejected before a request
/// is built.
///
/// # Examples
///
/// ```
/// use feedshard::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("file:///etc/passwd").is_err());
/// assert!(validate_url("not a url").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlValidationError::MissingHost),
    }

    Ok(url)
}

/// Resolves a `Location` header (or any href) against the URL it was found on.
///
/// Absolute values replace the base entirely; relative ones are joined.
/// Returns `None` when the result is not a fetchable http(s) URL.
pub fn resolve_against(base: &Url, location: &str) -> Option<Url> {
    let joined = base.join(location.trim()).ok()?;
    match joined.scheme() {
        "http" | "https" => Some(joined),
        _ => None,
    }
}

/// Returns true when `url`'s host equals one of `domains` or is a subdomain of one.
pub fn host_matches(url: &Url, domains: &[String]) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    domains.iter().any(|domain| {
        let domain = domain.to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{domain}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        assert!(validate_url("https://example.com/feed.xml").is_ok());
        assert!(validate_url("http://news.example.org").is_ok());
        assert!(validate_url("  https://example.com/padded  ").is_ok());
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("javascript:alert(1)").is_err());
    }

    #[test]
    fn test_unparseable_rejected() {
        assert!(matches!(
            validate_url("/relative/path"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_resolve_relative_location() {
        let base = Url::parse("https://example.com/a/b/page.html").unwrap();
        assert_eq!(
            resolve_against(&base, "../other.html").unwrap().as_str(),
            "https://example.com/a/other.html"
        );
        assert_eq!(
            resolve_against(&base, "/root").unwrap().as_str(),
            "https://example.com/root"
        );
        assert_eq!(
            resolve_against(&base, "https://elsewhere.org/x").unwrap().as_str(),
            "https://elsewhere.org/x"
        );
    }

    #[test]
    fn test_resolve_rejects_non_http() {
        let base = Url::parse("https://example.com/").unwrap();
        assert!(resolve_against(&base, "mailto:someone@example.com").is_none());
        assert!(resolve_against(&base, "data:image/png;base64,AAAA").is_none());
    }

    #[test]
    fn test_host_matches_subdomains() {
        let domains = vec!["news.google.com".to_string()];
        let url = Url::parse("https://news.google.com/rss/articles/abc").unwrap();
        assert!(host_matches(&url, &domains));

        let sub = Url::parse("https://eu.news.google.com/x").unwrap();
        assert!(host_matches(&sub, &domains));

        let other = Url::parse("https://www.example.com/news.google.com").unwrap();
        assert!(!host_matches(&other, &domains));
    }
}
