use crate::{UrlError, UrlResult};
use url::Url;

/// Returns true if `link` is an absolute URL (it carries its own scheme)
pub fn is_absolute(link: &str) -> bool {
    Url::parse(link).is_ok()
}

/// Resolves a follow-up link yielded by a strategy into the URL to fetch
///
/// Absolute links are kept literally. Host-relative links (a leading `/`,
/// `?` or `#`) are appended to the crawl host as written, so `/page2` on
/// host `http://test.com` becomes `http://test.com/page2` and no dot
/// segment or character in the link is rewritten. A path-relative link
/// (`page2`) has no place to be appended to, so it is joined onto the
/// host root with URL semantics.
///
/// # Arguments
///
/// * `host` - Scheme and authority of the crawl, as returned by `crawl_host`
/// * `link` - The link the strategy yielded
///
/// # Returns
///
/// * `Ok(String)` - The URL to enqueue
/// * `Err(UrlError)` - The link is empty or cannot be joined onto the host
///
/// # Examples
///
/// ```
/// use skraper::url::resolve_follow_up;
///
/// let next = resolve_follow_up("http://test.com", "/page2").unwrap();
/// assert_eq!(next, "http://test.com/page2");
///
/// let next = resolve_follow_up("http://test.com", "/a/../b").unwrap();
/// assert_eq!(next, "http://test.com/a/../b");
///
/// let next = resolve_follow_up("http://test.com", "https://other.com/x").unwrap();
/// assert_eq!(next, "https://other.com/x");
/// ```
pub fn resolve_follow_up(host: &str, link: &str) -> UrlResult<String> {
    let link = link.trim();

    if link.is_empty() {
        return Err(UrlError::Parse("empty follow-up link".to_string()));
    }

    if is_absolute(link) {
        return Ok(link.to_string());
    }

    if link.starts_with(&['/', '?', '#'][..]) {
        return Ok(format!("{}{}", host.trim_end_matches('/'), link));
    }

    let base = Url::parse(host).map_err(|e| UrlError::Parse(format!("{}: {}", host, e)))?;
    base.join(link)
        .map(|url| url.to_string())
        .map_err(|e| UrlError::Parse(format!("{}: {}", link, e)))
}
