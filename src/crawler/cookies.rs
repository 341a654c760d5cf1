//! `Set-Cookie` header parsing
//!
//! Converts response headers into the `Cookie` values the record mapper
//! expects: defaulted domain and path, absolute expiry in epoch seconds,
//! and the size as name length plus value length. Header syntax, including
//! the several `Expires` date formats servers send, is handled by the
//! `cookie` crate.

use crate::record::{Cookie, SameSitePolicy};
use chrono::{DateTime, Utc};
use url::Url;

/// Expiry reported for cookies that live only for the session
pub const SESSION_EXPIRY: f64 = -1.0;

/// Parses a single `Set-Cookie` header value
///
/// # Arguments
///
/// * `raw` - The header value
/// * `request_url` - URL of the response that set the cookie
/// * `now` - Reference time for `Max-Age`
///
/// # Returns
///
/// * `Some(Cookie)` - The parsed cookie
/// * `None` - The header has no `name=value` pair
pub fn parse_set_cookie(raw: &str, request_url: &Url, now: DateTime<Utc>) -> Option<Cookie> {
    let parsed = cookie::Cookie::parse(raw).ok()?;
    let name = parsed.name();
    let value = parsed.value().trim_matches('"');

    let domain = parsed
        .domain()
        .map(|d| d.trim_start_matches('.').to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .map(|d| format!(".{}", d));

    let path = parsed
        .path()
        .filter(|p| p.starts_with('/'))
        .map(str::to_string);

    // Max-Age wins over Expires
    let expires = match parsed.max_age() {
        Some(max_age) => {
            Some(now.timestamp_millis() as f64 / 1000.0 + max_age.whole_seconds() as f64)
        }
        None => parsed
            .expires_datetime()
            .map(|at| at.unix_timestamp() as f64),
    };

    let same_site = parsed
        .same_site()
        .and_then(|policy| SameSitePolicy::parse(&policy.to_string()));

    Some(Cookie {
        name: name.to_string(),
        value: value.to_string(),
        domain: domain.unwrap_or_else(|| request_url.host_str().unwrap_or_default().to_string()),
        path: path.unwrap_or_else(|| default_path(request_url)),
        expires: expires.unwrap_or(SESSION_EXPIRY),
        size: (name.len() + value.len()) as u64,
        http_only: parsed.http_only().unwrap_or(false),
        secure: parsed.secure().unwrap_or(false),
        session: expires.is_none(),
        same_site,
    })
}

/// Whether a captured cookie would be sent to `url`
pub(crate) fn applies_to(cookie: &Cookie, url: &Url) -> bool {
    let host = match url.host_str() {
        Some(host) => host.to_ascii_lowercase(),
        None => return false,
    };

    let domain_ok = match cookie.domain.strip_prefix('.') {
        Some(domain) => host == domain || host.ends_with(&format!(".{}", domain)),
        None => host == cookie.domain,
    };
    let path_ok = cookie.path == "/"
        || url.path() == cookie.path
        || url.path().starts_with(&format!("{}/", cookie.path.trim_end_matches('/')));

    domain_ok && path_ok && (!cookie.secure || url.scheme() == "https")
}

/// Adds `cookie`, replacing an earlier cookie with the same name, domain and path
pub(crate) fn store_cookie(cookies: &mut Vec<Cookie>, cookie: Cookie) {
    cookies.retain(|c| !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path));
    cookies.push(cookie);
}

/// Default cookie path: the request path up to its last `/`
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}
