//! Origin-exact crawl scope
//!
//! `ScopeRule::classify` is the single scope predicate of the crate: the
//! frontier uses it to decide what to expand and the record mapper uses it
//! to decide what to redact.

use crate::url::{extract_domain, matches_host, normalize_url};
use crate::UrlError;
use std::fmt;
use url::Url;

/// Where a URL sits relative to the crawl scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlScope {
    /// Same origin as the scope domain (and under the base path, if any)
    Internal,
    /// Any other origin or path
    External,
}

impl UrlScope {
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External)
    }
}

/// The set of URLs considered in scope
///
/// A URL is in scope when its scheme is HTTP or HTTPS, its host equals the
/// scope host (ignoring a leading `www.`), its port matches when the scope
/// names one, and its path lies under the base path when one is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRule {
    host: String,
    port: Option<u16>,
    base_path: Option<String>,
}

impl ScopeRule {
    /// Builds a scope rule from a domain (optionally `host:port`) and base path
    ///
    /// # Examples
    ///
    /// ```
    /// use crawl_ingest::url::{ScopeRule, UrlScope};
    /// use url::Url;
    ///
    /// let scope = ScopeRule::new("example.com", Some("/blog")).unwrap();
    /// let url = Url::parse("https://www.example.com/blog/post").unwrap();
    /// assert_eq!(scope.classify(&url), UrlScope::Internal);
    /// ```
    pub fn new(domain: &str, base_path: Option<&str>) -> Result<Self, UrlError> {
        let domain = domain.trim();
        let (host_part, port) = match domain.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| UrlError::Malformed(format!("Invalid port in '{}'", domain)))?;
                (host, Some(port))
            }
            None => (domain, None),
        };

        let probe = Url::parse(&format!("http://{}/", host_part))
            .map_err(|e| UrlError::Parse(format!("{}: {}", domain, e)))?;

        if probe.path() != "/" || probe.query().is_some() || !probe.username().is_empty() {
            return Err(UrlError::Malformed(format!(
                "Scope domain '{}' must be a bare host",
                domain
            )));
        }

        let host = extract_domain(&probe).ok_or(UrlError::MissingDomain)?;

        Ok(Self {
            host,
            port,
            base_path: base_path.map(normalize_base_path),
        })
    }

    /// The scope host as configured (lowercase)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The base path with a guaranteed trailing slash, if configured
    pub fn base_path(&self) -> Option<&str> {
        self.base_path.as_deref()
    }

    /// Classifies a parsed URL against the scope
    pub fn classify(&self, url: &Url) -> UrlScope {
        if url.scheme() != "http" && url.scheme() != "https" {
            return UrlScope::External;
        }

        let host = match extract_domain(url) {
            Some(host) => host,
            None => return UrlScope::External,
        };

        if !matches_host(&self.host, &host) {
            return UrlScope::External;
        }

        if let Some(port) = self.port {
            if url.port_or_known_default() != Some(port) {
                return UrlScope::External;
            }
        }

        if let Some(base) = &self.base_path {
            let path = url.path();
            let base_without_slash = &base[..base.len() - 1];
            if !path.starts_with(base.as_str()) && path != base_without_slash {
                return UrlScope::External;
            }
        }

        UrlScope::Internal
    }

    /// Normalizes a raw URL string and classifies it
    ///
    /// Fails only when the string is not a usable HTTP(S) URL.
    pub fn classify_str(&self, raw: &str) -> Result<(Url, UrlScope), UrlError> {
        let url = normalize_url(raw)?;
        let scope = self.classify(&url);
        Ok((url, scope))
    }

    /// Shorthand for `classify(url) == UrlScope::External`
    pub fn is_external(&self, url: &Url) -> bool {
        self.classify(url).is_external()
    }
}

impl fmt::Display for ScopeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if let Some(base) = &self.base_path {
            write!(f, "{}", base)?;
        }
        Ok(())
    }
}

/// Ensures a leading and a trailing slash
fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim();
    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}
