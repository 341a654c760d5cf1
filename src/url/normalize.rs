use crate::UrlError;
use url::Url;

/// Normalizes a URL into the form used for fetching and de-duplication
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything that is not HTTP or HTTPS
/// 3. Require a host
/// 4. Remove the fragment (everything after #)
/// 5. Remove an empty query string (trailing ?)
///
/// Host lowercasing, default-port removal and dot-segment resolution are
/// done by the `url` parser itself. The scheme, `www.` prefix, path and
/// query parameters are kept as-is: they are part of what the warehouse
/// records as the requested URL.
///
/// # Examples
///
/// ```
/// use crawl_ingest::url::normalize_url;
///
/// let url = normalize_url("https://WWW.Example.com:443/a/../page?#top").unwrap();
/// assert_eq!(url.as_str(), "https://www.example.com/page");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingDomain),
    }

    url.set_fragment(None);

    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}
