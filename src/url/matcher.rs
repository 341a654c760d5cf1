use crate::url::domain::strip_www;

/// Checks if a host belongs to the scope domain
///
/// Matching is exact on the whole host after a leading `www.` is ignored on
/// both sides. Subdomains other than `www` are different origins, and a
/// shared suffix or prefix never counts as a match.
///
/// Both arguments are expected to be lowercase already.
///
/// # Examples
///
/// ```
/// use crawl_ingest::url::matches_host;
///
/// assert!(matches_host("example.com", "example.com"));
/// assert!(matches_host("example.com", "www.example.com"));
/// assert!(matches_host("www.example.com", "example.com"));
/// assert!(!matches_host("example.com", "blog.example.com"));
/// assert!(!matches_host("example.com", "example.com.evil.com"));
/// ```
pub fn matches_host(scope_host: &str, candidate: &str) -> bool {
    let scope_host = strip_www(scope_host);
    !scope_host.is_empty() && scope_host == strip_www(candidate)
}
