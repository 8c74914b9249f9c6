use crate::{UrlError, UrlResult};
use url::Url;

/// Extracts the crawl host (scheme and authority) from a seed URL
///
/// The host is fixed for a whole crawl run and is what relative follow-up
/// links are resolved against. A non-default port is kept so that local
/// servers keep working.
///
/// # Arguments
///
/// * `seed_url` - The URL the crawl starts from
///
/// # Returns
///
/// * `Ok(String)` - e.g. `https://example.com` or `http://127.0.0.1:8080`
/// * `Err(UrlError)` - The seed is malformed, not HTTP(S), or has no host
///
/// # Examples
///
/// ```
/// use skraper::url::crawl_host;
///
/// assert_eq!(crawl_host("http://test.com/list?page=1").unwrap(), "http://test.com");
/// assert_eq!(crawl_host("https://Example.COM:8443/").unwrap(), "https://example.com:8443");
/// ```
pub fn crawl_host(seed_url: &str) -> UrlResult<String> {
    let url = Url::parse(seed_url).map_err(|e| UrlError::Parse(format!("{}: {}", seed_url, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost(seed_url.to_string()));
    }

    Ok(url.origin().ascii_serialization())
}
